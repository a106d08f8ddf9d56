//! The materialized query representation.
//!
//! A `QuerySpec` is the boundary artifact between the relation engine and a
//! fetch collaborator: a deterministic map of clause name to resolved JSON
//! value. Deferred clause values have already been evaluated by the time a
//! spec exists; adapters see plain data.

use crate::value::Json;
use serde::Serialize;
use std::collections::BTreeMap;

/// Reserved key under which the nested eager-load tree is attached.
pub const INCLUDES_KEY: &str = "includes";

/// Deterministic, materialized query map handed to [`crate::Fetch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QuerySpec {
    fields: BTreeMap<String, Json>,
}

impl QuerySpec {
    /// Create an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a clause value, replacing any previous value for the name.
    pub fn set(&mut self, name: impl Into<String>, value: Json) {
        self.fields.insert(name.into(), value);
    }

    /// Look up a clause value by name.
    pub fn get(&self, name: &str) -> Option<&Json> {
        self.fields.get(name)
    }

    /// The attached eager-load tree, if any.
    pub fn includes(&self) -> Option<&Json> {
        self.fields.get(INCLUDES_KEY)
    }

    /// Whether the spec carries no clauses at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of clauses present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterate clauses in deterministic (name) order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Json)> {
        self.fields.iter()
    }

    /// Render the spec as one JSON object.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
