// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime values: the tagged-variant type every DQL expression evaluates to.
//!
//! Values are cheap to clone: arrays, objects, and binaries are `Arc`-shared
//! and frozen once built, so aliases can never observe a mutation. Every
//! value has exactly one kind, a position in a cross-kind total order, a
//! truthiness, and a canonical JSON text form.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;

use crate::events::Subject;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Arc<Vec<Value>>),
    Object(Arc<ObjectMap>),
    DateTime(DateTime<Utc>),
    Binary(Arc<Vec<u8>>),
    /// Namespace-qualified name of a registered function.
    FunctionRef(String),
    /// Handle to an event source a WAITFOR expression can wait on.
    Subject(Subject),
}

/// The kind tag of a [`Value`], used in type errors and cross-kind ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    None,
    Boolean,
    Int,
    Float,
    String,
    DateTime,
    Array,
    Object,
    Binary,
    FunctionRef,
    Subject,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::None => "none",
            Kind::Boolean => "boolean",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::DateTime => "datetime",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Binary => "binary",
            Kind::FunctionRef => "function",
            Kind::Subject => "observable",
        }
    }

    /// Position in the ascending cross-kind order. Int and Float share a
    /// rank: numeric values compare by numeric value, not by kind.
    fn rank(self) -> u8 {
        match self {
            Kind::None => 0,
            Kind::Boolean => 1,
            Kind::Int | Kind::Float => 2,
            Kind::String => 3,
            Kind::DateTime => 4,
            Kind::Array => 5,
            Kind::Object => 6,
            Kind::Binary => 7,
            Kind::FunctionRef => 8,
            Kind::Subject => 9,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::None => Kind::None,
            Value::Bool(_) => Kind::Boolean,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
            Value::DateTime(_) => Kind::DateTime,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
            Value::Binary(_) => Kind::Binary,
            Value::FunctionRef(_) => Kind::FunctionRef,
            Value::Subject(_) => Kind::Subject,
        }
    }

    /// None, FALSE, numeric zero, and empty strings/arrays/objects/binaries
    /// are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Binary(b) => !b.is_empty(),
            Value::DateTime(_) | Value::FunctionRef(_) | Value::Subject(_) => true,
        }
    }

    /// Total order across all values. Kinds order as
    /// none < boolean < numeric < string < datetime < array < object <
    /// binary < function < observable; within numeric, Int and Float
    /// compare by numeric value (mixed pairs as Float, NaN via IEEE total
    /// order). Arrays compare element-wise with shorter-is-less on a common
    /// prefix; objects by sorted key set, then values in that key order.
    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (None, None) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Array(a), Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Ordering::Equal => continue,
                        non_eq => return non_eq,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Object(a), Object(b)) => {
                let mut ka: Vec<&str> = a.keys().collect();
                let mut kb: Vec<&str> = b.keys().collect();
                ka.sort_unstable();
                kb.sort_unstable();
                match ka.cmp(&kb) {
                    Ordering::Equal => {}
                    non_eq => return non_eq,
                }
                for key in ka {
                    // Key sets are identical here, so both lookups succeed.
                    let (va, vb) = match (a.get(key), b.get(key)) {
                        (Some(va), Some(vb)) => (va, vb),
                        _ => continue,
                    };
                    match va.compare(vb) {
                        Ordering::Equal => continue,
                        non_eq => return non_eq,
                    }
                }
                Ordering::Equal
            }
            (Binary(a), Binary(b)) => a.cmp(b),
            (FunctionRef(a), FunctionRef(b)) => a.cmp(b),
            (Subject(a), Subject(b)) => a.id().cmp(&b.id()),
            _ => self.kind().rank().cmp(&other.kind().rank()),
        }
    }

    /// Canonical JSON text form. Non-finite floats render as `null`
    /// (they have no JSON representation).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }

    /// Canonical string coercion: strings render raw, everything else
    /// renders as its JSON form. This is the explicit conversion used by
    /// string-typed operations; comparisons never coerce.
    pub fn coerce_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_json(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => f.write_str(&other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(d) => {
                serializer.serialize_str(&d.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Value::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for v in a.iter() {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Object(o) => {
                let mut map = serializer.serialize_map(Some(o.len()))?;
                for (k, v) in o.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Binary(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Value::FunctionRef(name) => serializer.serialize_str(name),
            Value::Subject(_) => serializer.serialize_str("[observable]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }
}

impl From<ObjectMap> for Value {
    fn from(map: ObjectMap) -> Self {
        Value::Object(Arc::new(map))
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(Arc::new(bytes))
    }
}

impl From<Subject> for Value {
    fn from(subject: Subject) -> Self {
        Value::Subject(subject)
    }
}

/// An insertion-ordered string → [`Value`] map.
///
/// Key order is part of the observable data model (serialization walks it),
/// so entries keep their first-insertion position; re-inserting a key
/// updates the value in place. Objects in this domain are small, so lookup
/// is a linear scan over the entry vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMap {
    entries: Vec<(String, Value)>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or update a key. A repeated key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for ObjectMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = ObjectMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(items: Vec<Value>) -> Value {
        Value::from(items)
    }

    #[test]
    fn test_kind_ranks_order_mixed_values() {
        let ordered = vec![
            Value::None,
            Value::Bool(false),
            Value::Int(0),
            Value::String("".into()),
            arr(vec![]),
            Value::Object(Arc::new(ObjectMap::new())),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(
                pair[0].compare(&pair[1]),
                Ordering::Less,
                "{:?} should order before {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_numeric_kinds_compare_by_value() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.0)), Ordering::Equal);
        assert_eq!(Value::Int(2).compare(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::Float(0.5).compare(&Value::Int(1)), Ordering::Less);
        assert_eq!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_array_prefix_ordering() {
        let shorter = arr(vec![Value::Int(1), Value::Int(2)]);
        let longer = arr(vec![Value::Int(1), Value::Int(2), Value::Int(0)]);
        assert_eq!(shorter.compare(&longer), Ordering::Less);

        let bigger_head = arr(vec![Value::Int(2)]);
        assert_eq!(bigger_head.compare(&longer), Ordering::Greater);
    }

    #[test]
    fn test_object_ordering_by_sorted_keys_then_values() {
        let mut a = ObjectMap::new();
        a.insert("b", Value::Int(1));
        a.insert("a", Value::Int(1));
        let mut b = ObjectMap::new();
        b.insert("a", Value::Int(1));
        b.insert("b", Value::Int(2));

        // Same key set {a, b}; first differing value decides.
        assert_eq!(Value::from(a).compare(&Value::from(b)), Ordering::Less);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!arr(vec![]).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn test_json_scalars() {
        assert_eq!(Value::None.to_json(), "null");
        assert_eq!(Value::Bool(true).to_json(), "true");
        assert_eq!(Value::Int(1).to_json(), "1");
        assert_eq!(Value::Float(1.1).to_json(), "1.1");
        // Floats always stay distinguishable from ints.
        assert_eq!(Value::Float(1.0).to_json(), "1.0");
        assert_eq!(Value::String("foo".into()).to_json(), "\"foo\"");
        assert_eq!(Value::Float(f64::NAN).to_json(), "null");
    }

    #[test]
    fn test_json_collections_preserve_order() {
        let mut obj = ObjectMap::new();
        obj.insert("a", Value::from("foo"));
        obj.insert("b", Value::Int(1));
        obj.insert("c", Value::Bool(true));
        obj.insert("d", arr(vec![]));
        obj.insert("e", Value::Object(Arc::new(ObjectMap::new())));

        assert_eq!(
            Value::from(obj).to_json(),
            r#"{"a":"foo","b":1,"c":true,"d":[],"e":{}}"#
        );
        assert_eq!(
            arr(vec![Value::Int(1), Value::Int(2), Value::Int(3)]).to_json(),
            "[1,2,3]"
        );
    }

    #[test]
    fn test_object_insert_keeps_first_position() {
        let mut obj = ObjectMap::new();
        obj.insert("x", Value::Int(1));
        obj.insert("y", Value::Int(2));
        obj.insert("x", Value::Int(3));

        let keys: Vec<&str> = obj.keys().collect();
        assert_eq!(keys, vec!["x", "y"]);
        assert_eq!(obj.get("x"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_coerce_string() {
        assert_eq!(Value::from("foo").coerce_string(), "foo");
        assert_eq!(Value::Int(3).coerce_string(), "3");
        assert_eq!(arr(vec![Value::Int(1)]).coerce_string(), "[1]");
    }

    #[test]
    fn test_binary_serializes_as_utf8_string() {
        let bin = Value::from(b"abc".to_vec());
        assert_eq!(bin.to_json(), "\"abc\"");
    }
}
