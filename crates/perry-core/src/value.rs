//! Opaque clause values.
//!
//! The relation engine never interprets clause payloads; it stores them as
//! JSON and hands them through to the fetch collaborator. A value is either
//! a literal or a deferred thunk that is evaluated exactly once, when the
//! relation materializes its `QuerySpec`. Thunks are fallible: a deferred
//! payload may itself depend on a fetch.

use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Opaque JSON payload used for clause values and record attributes.
pub type Json = serde_json::Value;

/// Raw attribute map for one record, as returned by a fetch collaborator.
pub type Attributes = serde_json::Map<String, Json>;

/// A deferred clause value: evaluated when a query is materialized, not
/// when it is declared.
#[derive(Clone)]
pub struct Deferred(Arc<dyn Fn() -> Result<Json>>);

impl Deferred {
    /// Wrap a thunk producing the clause payload on demand.
    pub fn new(f: impl Fn() -> Result<Json> + 'static) -> Self {
        Deferred(Arc::new(f))
    }

    /// Evaluate the thunk.
    pub fn resolve(&self) -> Result<Json> {
        (self.0)()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// A clause value: a literal JSON payload, or a deferred computation.
///
/// Cloning copies literals by value and deferred thunks by reference; the
/// opaque callable is shared, never duplicated.
#[derive(Debug, Clone)]
pub enum ClauseValue {
    /// A plain value, stored as-is.
    Literal(Json),
    /// A computation resolved once per query materialization.
    Deferred(Deferred),
}

impl ClauseValue {
    /// Build a deferred value from a fallible thunk.
    pub fn deferred(f: impl Fn() -> Result<Json> + 'static) -> Self {
        ClauseValue::Deferred(Deferred::new(f))
    }

    /// Resolve to a concrete JSON payload. Literals clone; deferred values
    /// run their thunk.
    pub fn resolve(&self) -> Result<Json> {
        match self {
            ClauseValue::Literal(v) => Ok(v.clone()),
            ClauseValue::Deferred(d) => d.resolve(),
        }
    }

    /// Whether this value is a deferred computation.
    pub fn is_deferred(&self) -> bool {
        matches!(self, ClauseValue::Deferred(_))
    }

    /// Borrow the literal payload, if this is one.
    pub fn as_literal(&self) -> Option<&Json> {
        match self {
            ClauseValue::Literal(v) => Some(v),
            ClauseValue::Deferred(_) => None,
        }
    }
}

impl PartialEq for ClauseValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ClauseValue::Literal(a), ClauseValue::Literal(b)) => a == b,
            (ClauseValue::Deferred(a), ClauseValue::Deferred(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl From<Json> for ClauseValue {
    fn from(value: Json) -> Self {
        ClauseValue::Literal(value)
    }
}

impl From<&str> for ClauseValue {
    fn from(value: &str) -> Self {
        ClauseValue::Literal(Json::String(value.to_string()))
    }
}

impl From<String> for ClauseValue {
    fn from(value: String) -> Self {
        ClauseValue::Literal(Json::String(value))
    }
}

impl From<i32> for ClauseValue {
    fn from(value: i32) -> Self {
        ClauseValue::Literal(Json::from(value))
    }
}

impl From<i64> for ClauseValue {
    fn from(value: i64) -> Self {
        ClauseValue::Literal(Json::from(value))
    }
}

impl From<u32> for ClauseValue {
    fn from(value: u32) -> Self {
        ClauseValue::Literal(Json::from(value))
    }
}

impl From<u64> for ClauseValue {
    fn from(value: u64) -> Self {
        ClauseValue::Literal(Json::from(value))
    }
}

impl From<usize> for ClauseValue {
    fn from(value: usize) -> Self {
        ClauseValue::Literal(Json::from(value))
    }
}

impl From<Deferred> for ClauseValue {
    fn from(value: Deferred) -> Self {
        ClauseValue::Deferred(value)
    }
}

impl Serialize for ClauseValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // Deferred values serialize through their resolved payload.
        match self.resolve() {
            Ok(json) => json.serialize(serializer),
            Err(err) => Err(serde::ser::Error::custom(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn test_literal_resolve_clones_payload() {
        let value = ClauseValue::from(json!({"id": 1}));
        assert_eq!(value.resolve().unwrap(), json!({"id": 1}));
        assert!(!value.is_deferred());
        assert_eq!(value.as_literal(), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_deferred_resolves_on_demand() {
        let value = ClauseValue::deferred(|| Ok(json!(42)));
        assert!(value.is_deferred());
        assert!(value.as_literal().is_none());
        assert_eq!(value.resolve().unwrap(), json!(42));
    }

    #[test]
    fn test_deferred_propagates_failure() {
        let value = ClauseValue::deferred(|| Err(Error::fetch("backend down")));
        assert!(value.resolve().is_err());
    }

    #[test]
    fn test_clone_shares_deferred_thunk() {
        let value = ClauseValue::deferred(|| Ok(json!("now")));
        let cloned = value.clone();
        // Shared thunk, so the clones compare equal by identity.
        assert_eq!(value, cloned);
    }

    #[test]
    fn test_distinct_deferred_thunks_are_not_equal() {
        let a = ClauseValue::deferred(|| Ok(json!(1)));
        let b = ClauseValue::deferred(|| Ok(json!(1)));
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_str_and_int() {
        assert_eq!(ClauseValue::from("name").resolve().unwrap(), json!("name"));
        assert_eq!(ClauseValue::from(7_i64).resolve().unwrap(), json!(7));
        // Untyped integer literals land on i32 and must convert too.
        assert_eq!(ClauseValue::from(1).resolve().unwrap(), json!(1));
        assert_eq!(ClauseValue::from(2_u32).resolve().unwrap(), json!(2));
        assert_eq!(ClauseValue::from(3_usize).resolve().unwrap(), json!(3));
    }

    #[test]
    fn test_serialize_resolves() {
        let value = ClauseValue::deferred(|| Ok(json!([1, 2])));
        let out = serde_json::to_value(&value).unwrap();
        assert_eq!(out, json!([1, 2]));
    }
}
