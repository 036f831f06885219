//! WAITFOR integration: pending emissions, live waiters, timeouts,
//! cancellation and deadlines, plus isolation between concurrent runs.
//!
//! Time-sensitive paths run under tokio's paused clock so the default
//! five second timeout and the pending TTL are exercised without real
//! waiting.

use std::collections::HashMap;
use std::time::Duration;

use dredge::{validate_arity, Compiler, Context, NativeFunction, RuntimeError, Subject, Value};

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    let mut ns = compiler.namespace("X");
    ns.register(
        "CREATE",
        NativeFunction::new(|_ctx: Context, _args: Vec<Value>| async {
            Ok(Value::Subject(Subject::new()))
        }),
    )
    .unwrap();
    ns.register(
        "EMIT",
        NativeFunction::new(|_ctx: Context, mut args: Vec<Value>| async move {
            validate_arity("X::EMIT", &args, 3, 3)?;
            let payload = args.pop().unwrap_or_default();
            match (args.remove(0), args.remove(0)) {
                (Value::Subject(subject), Value::String(event)) => {
                    subject.emit(&event, payload, None, Duration::from_millis(500));
                    Ok(Value::None)
                }
                _ => Err(RuntimeError::type_mismatch(
                    "X::EMIT expects (observable, string, value)",
                )),
            }
        }),
    )
    .unwrap();
    ns.register(
        "FAIL",
        NativeFunction::new(|_ctx: Context, mut args: Vec<Value>| async move {
            validate_arity("X::FAIL", &args, 2, 2)?;
            match (args.remove(0), args.remove(0)) {
                (Value::Subject(subject), Value::String(event)) => {
                    subject.emit(
                        &event,
                        Value::None,
                        Some(anyhow::anyhow!("source went away")),
                        Duration::from_millis(500),
                    );
                    Ok(Value::None)
                }
                _ => Err(RuntimeError::type_mismatch(
                    "X::FAIL expects (observable, string)",
                )),
            }
        }),
    )
    .unwrap();
    compiler
}

fn subject_params(subject: &Subject) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    params.insert("obj".to_string(), Value::Subject(subject.clone()));
    params
}

#[tokio::test]
async fn test_waitfor_consumes_prior_emission() {
    let src = "LET obj = X::CREATE() \
               X::EMIT(obj, 'ready', 'data') \
               LET res = (WAITFOR EVENT 'ready' IN obj) \
               RETURN res";
    let out = compiler()
        .compile(src)
        .unwrap()
        .run(Context::new())
        .await
        .unwrap();
    assert_eq!(out, "\"data\"");
}

#[tokio::test]
async fn test_waitfor_statement_discards_the_payload() {
    let src = "LET obj = X::CREATE() \
               X::EMIT(obj, 'ready', 1) \
               WAITFOR EVENT 'ready' IN obj \
               RETURN TRUE";
    let out = compiler()
        .compile(src)
        .unwrap()
        .run(Context::new())
        .await
        .unwrap();
    assert_eq!(out, "true");
}

#[tokio::test(start_paused = true)]
async fn test_waitfor_blocks_until_emission_arrives() {
    let subject = Subject::new();
    let program = compiler()
        .compile("LET res = (WAITFOR EVENT 'ready' IN @obj) RETURN res")
        .unwrap();

    let emitter = subject.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        emitter.emit(
            "ready",
            Value::String("late".to_string()),
            None,
            Duration::from_millis(100),
        );
    });

    let out = program
        .run_with_params(Context::new(), subject_params(&subject))
        .await
        .unwrap();
    assert_eq!(out, "\"late\"");
}

#[tokio::test]
async fn test_waitfor_times_out() {
    let subject = Subject::new();
    let program = compiler()
        .compile("LET res = (WAITFOR EVENT 'never' IN @obj TIMEOUT 20) RETURN res")
        .unwrap();
    let err = program
        .run_with_params(Context::new(), subject_params(&subject))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        RuntimeError::EventTimeout { event } if event.as_str() == "never"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_waitfor_default_timeout_is_five_seconds() {
    let subject = Subject::new();
    let started = tokio::time::Instant::now();
    let program = compiler()
        .compile("LET res = (WAITFOR EVENT 'never' IN @obj) RETURN res")
        .unwrap();
    let err = program
        .run_with_params(Context::new(), subject_params(&subject))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::EventTimeout { .. }));
    assert_eq!(started.elapsed(), Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn test_expired_pending_emission_is_ignored() {
    let subject = Subject::new();
    subject.emit(
        "ready",
        Value::String("stale".to_string()),
        None,
        Duration::from_millis(50),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    let program = compiler()
        .compile("LET res = (WAITFOR EVENT 'ready' IN @obj TIMEOUT 30) RETURN res")
        .unwrap();
    let err = program
        .run_with_params(Context::new(), subject_params(&subject))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::EventTimeout { .. }));
}

#[tokio::test]
async fn test_emission_error_replaces_the_payload() {
    let src = "LET obj = X::CREATE() \
               X::FAIL(obj, 'ready') \
               LET res = (WAITFOR EVENT 'ready' IN obj) \
               RETURN res";
    let err = compiler()
        .compile(src)
        .unwrap()
        .run(Context::new())
        .await
        .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::External(_)));
    assert!(err.to_string().contains("source went away"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_a_blocked_waitfor() {
    let subject = Subject::new();
    let ctx = Context::new();
    let program = compiler()
        .compile("LET res = (WAITFOR EVENT 'never' IN @obj TIMEOUT 60000) RETURN res")
        .unwrap();

    let handle = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
    });

    let err = program
        .run_with_params(ctx, subject_params(&subject))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_context_deadline_cuts_the_wait_short() {
    let subject = Subject::new();
    let ctx = Context::with_timeout(Duration::from_millis(20));
    let program = compiler()
        .compile("LET res = (WAITFOR EVENT 'never' IN @obj TIMEOUT 60000) RETURN res")
        .unwrap();
    let err = program
        .run_with_params(ctx, subject_params(&subject))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_are_independent() {
    let program = compiler()
        .compile("LET res = (WAITFOR EVENT 'go' IN @obj TIMEOUT 60000) RETURN res")
        .unwrap();

    let subject_a = Subject::new();
    let subject_b = Subject::new();
    let ctx_a = Context::new();
    let ctx_b = Context::new();

    let cancel_a = ctx_a.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_a.cancel();
    });
    let emitter_b = subject_b.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        emitter_b.emit(
            "go",
            Value::String("ok".to_string()),
            None,
            Duration::from_millis(100),
        );
    });

    let (a, b) = tokio::join!(
        program.run_with_params(ctx_a, subject_params(&subject_a)),
        program.run_with_params(ctx_b, subject_params(&subject_b)),
    );
    assert!(matches!(a.unwrap_err().root(), RuntimeError::Cancelled));
    assert_eq!(b.unwrap(), "\"ok\"");
}

#[tokio::test]
async fn test_waitfor_source_must_be_an_observable() {
    let err = compiler()
        .compile("LET res = (WAITFOR EVENT 'e' IN 1) RETURN res")
        .unwrap()
        .run(Context::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("observable"));
}

#[tokio::test]
async fn test_waitfor_timeout_operand_is_validated() {
    let subject = Subject::new();
    let err = compiler()
        .compile("LET res = (WAITFOR EVENT 'e' IN @obj TIMEOUT 'soon') RETURN res")
        .unwrap()
        .run_with_params(Context::new(), subject_params(&subject))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("TIMEOUT"));
}
