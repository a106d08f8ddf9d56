//! The fetch collaborator contract.
//!
//! Everything beneath the model layer — wire adapters, middleware stacks,
//! caching — is reduced to this one synchronous seam. One collaborator is
//! configured per model type; the engine hands it a materialized
//! [`QuerySpec`] and gets back raw attribute maps or an error.

use crate::query::QuerySpec;
use crate::value::Attributes;
use crate::Result;

/// Synchronous record source for one model type.
pub trait Fetch {
    /// Execute the query described by `spec`, returning raw records.
    fn fetch(&self, spec: &QuerySpec) -> Result<Vec<Attributes>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    struct Canned(Vec<Attributes>);

    impl Fetch for Canned {
        fn fetch(&self, _spec: &QuerySpec) -> Result<Vec<Attributes>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Fetch for Broken {
        fn fetch(&self, _spec: &QuerySpec) -> Result<Vec<Attributes>> {
            Err(Error::fetch("backend unavailable"))
        }
    }

    fn row(value: serde_json::Value) -> Attributes {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_fetch_returns_rows() {
        let adapter = Canned(vec![row(json!({"id": 1})), row(json!({"id": 2}))]);
        let rows = adapter.fetch(&QuerySpec::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
    }

    #[test]
    fn test_fetch_propagates_errors() {
        let err = Broken.fetch(&QuerySpec::new()).unwrap_err();
        assert!(err.to_string().contains("backend unavailable"));
    }
}
