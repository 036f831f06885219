// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Event subjects backing the WAITFOR construct.
//!
//! A [`Subject`] owns one observable: a set of named event channels. Each
//! channel holds at most one pending emission (most recent wins, with an
//! expiry deadline) and a FIFO queue of waiters. `emit` is synchronous and
//! callable from any task or thread; `subscribe` suspends until an emission
//! arrives, the wait times out, or the execution context ends. Every
//! emission is consumed by at most one subscriber.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::RuntimeError;
use crate::exec::Context;
use crate::value::Value;

static NEXT_SUBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to an event source. Clones share the same observable.
#[derive(Clone)]
pub struct Subject {
    inner: Arc<Observable>,
}

struct Observable {
    id: u64,
    channels: Mutex<HashMap<String, Channel>>,
}

#[derive(Default)]
struct Channel {
    pending: Option<Pending>,
    waiters: VecDeque<oneshot::Sender<Emission>>,
}

struct Pending {
    emission: Emission,
    expires_at: Instant,
}

/// One delivered event: a payload, or an error raised at the source.
struct Emission {
    payload: Value,
    error: Option<anyhow::Error>,
}

impl Emission {
    fn into_result(self) -> Result<Value, RuntimeError> {
        match self.error {
            Some(err) => Err(RuntimeError::External(err)),
            None => Ok(self.payload),
        }
    }
}

impl Subject {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Observable {
                id: NEXT_SUBJECT_ID.fetch_add(1, Ordering::Relaxed),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Process-unique identity, stable across clones.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Publish an emission on `event`.
    ///
    /// The front live waiter receives it; waiters whose subscription has
    /// already been dropped (timed out or cancelled) are discarded in
    /// passing. With no live waiter the emission becomes the channel's
    /// pending slot, replacing any previous one, and stays consumable
    /// until `ttl` from now.
    pub fn emit(&self, event: &str, payload: Value, error: Option<anyhow::Error>, ttl: Duration) {
        let mut channels = match self.inner.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let channel = channels.entry(event.to_string()).or_default();

        let mut emission = Emission { payload, error };
        while let Some(waiter) = channel.waiters.pop_front() {
            match waiter.send(emission) {
                Ok(()) => {
                    debug!(subject = self.inner.id, event, "emission delivered to waiter");
                    return;
                }
                Err(returned) => emission = returned,
            }
        }

        debug!(subject = self.inner.id, event, ttl_ms = ttl.as_millis() as u64, "emission parked");
        channel.pending = Some(Pending {
            emission,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Wait for the next emission on `event`.
    ///
    /// An unexpired pending emission is consumed immediately. Otherwise the
    /// caller queues up and suspends until an emission arrives, `timeout`
    /// elapses (`EventTimeout`), or `ctx` ends. An emission carrying an
    /// error surfaces that error instead of a payload.
    pub async fn subscribe(
        &self,
        ctx: &Context,
        event: &str,
        timeout: Duration,
    ) -> Result<Value, RuntimeError> {
        let rx = {
            let mut channels = match self.inner.channels.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let channel = channels.entry(event.to_string()).or_default();

            if let Some(pending) = channel.pending.take() {
                if pending.expires_at > Instant::now() {
                    return pending.emission.into_result();
                }
                debug!(subject = self.inner.id, event, "discarded expired emission");
            }

            let (tx, rx) = oneshot::channel();
            channel.waiters.push_back(tx);
            rx
        };

        tokio::select! {
            delivered = rx => match delivered {
                Ok(emission) => emission.into_result(),
                // The sender only drops with the whole observable.
                Err(_) => Err(RuntimeError::EventTimeout { event: event.to_string() }),
            },
            _ = time::sleep(timeout) => {
                debug!(subject = self.inner.id, event, timeout_ms = timeout.as_millis() as u64, "wait timed out");
                Err(RuntimeError::EventTimeout { event: event.to_string() })
            }
            err = ctx.done() => Err(err),
        }
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subject").field(&self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_pending_emission_consumed() {
        let subject = Subject::new();
        subject.emit("load", Value::from("data"), None, TTL);

        let ctx = Context::new();
        let got = subject
            .subscribe(&ctx, "load", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got, Value::from("data"));

        // The slot was consumed; a second wait must time out.
        let err = subject
            .subscribe(&ctx, "load", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::EventTimeout { .. }));
    }

    #[tokio::test]
    async fn test_waiter_satisfied_by_later_emission() {
        let subject = Subject::new();
        let ctx = Context::new();

        let waiting = {
            let subject = subject.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                subject.subscribe(&ctx, "ready", Duration::from_secs(5)).await
            })
        };
        tokio::task::yield_now().await;

        subject.emit("ready", Value::Int(7), None, TTL);
        assert_eq!(waiting.await.unwrap().unwrap(), Value::Int(7));
    }

    #[tokio::test]
    async fn test_timeout_and_channel_isolation() {
        let subject = Subject::new();
        subject.emit("other", Value::Int(1), None, TTL);

        let err = subject
            .subscribe(&Context::new(), "wanted", Duration::from_millis(20))
            .await
            .unwrap_err();
        match err {
            RuntimeError::EventTimeout { event } => assert_eq!(event, "wanted"),
            other => panic!("expected EventTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_pending_not_observed() {
        let subject = Subject::new();
        subject.emit("load", Value::from("stale"), None, Duration::from_millis(10));

        time::advance(Duration::from_millis(20)).await;

        let err = subject
            .subscribe(&Context::new(), "load", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::EventTimeout { .. }));
    }

    #[tokio::test]
    async fn test_error_emission_surfaces() {
        let subject = Subject::new();
        subject.emit(
            "load",
            Value::None,
            Some(anyhow::anyhow!("source went away")),
            TTL,
        );

        let err = subject
            .subscribe(&Context::new(), "load", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("source went away"));
    }

    #[tokio::test]
    async fn test_waiters_are_fifo() {
        let subject = Subject::new();
        let ctx = Context::new();

        let first = {
            let (subject, ctx) = (subject.clone(), ctx.clone());
            tokio::spawn(async move {
                subject.subscribe(&ctx, "e", Duration::from_secs(5)).await
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let (subject, ctx) = (subject.clone(), ctx.clone());
            tokio::spawn(async move {
                subject.subscribe(&ctx, "e", Duration::from_secs(5)).await
            })
        };
        tokio::task::yield_now().await;

        subject.emit("e", Value::Int(1), None, TTL);
        subject.emit("e", Value::Int(2), None, TTL);

        assert_eq!(first.await.unwrap().unwrap(), Value::Int(1));
        assert_eq!(second.await.unwrap().unwrap(), Value::Int(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emission_after_waiter_timeout_parks_for_the_next() {
        let subject = Subject::new();
        let ctx = Context::new();

        let err = subject
            .subscribe(&ctx, "load", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::EventTimeout { .. }));

        // The timed-out waiter's sender is still queued; the emission must
        // step over it and park, not vanish with it.
        subject.emit("load", Value::from("late"), None, TTL);

        let got = subject
            .subscribe(&ctx, "load", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got, Value::from("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emission_skips_dead_waiter_for_the_live_one() {
        let subject = Subject::new();
        let ctx = Context::new();

        let doomed = {
            let (subject, ctx) = (subject.clone(), ctx.clone());
            tokio::spawn(async move {
                subject.subscribe(&ctx, "e", Duration::from_millis(10)).await
            })
        };
        tokio::task::yield_now().await;
        let patient = {
            let (subject, ctx) = (subject.clone(), ctx.clone());
            tokio::spawn(async move {
                subject.subscribe(&ctx, "e", Duration::from_secs(5)).await
            })
        };
        tokio::task::yield_now().await;

        time::advance(Duration::from_millis(20)).await;
        let err = doomed.await.unwrap().unwrap_err();
        assert!(matches!(err, RuntimeError::EventTimeout { .. }));

        // One emission: the dead front waiter is discarded and the live
        // one behind it is served.
        subject.emit("e", Value::Int(9), None, TTL);
        assert_eq!(patient.await.unwrap().unwrap(), Value::Int(9));
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts_wait() {
        let subject = Subject::new();
        let ctx = Context::new();

        let waiting = {
            let (subject, ctx) = (subject.clone(), ctx.clone());
            tokio::spawn(async move {
                subject.subscribe(&ctx, "never", Duration::from_secs(30)).await
            })
        };
        tokio::task::yield_now().await;
        ctx.cancel();

        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
    }
}
