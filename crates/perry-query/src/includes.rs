//! The nested eager-load tree.
//!
//! Every value ever passed to a relation's `includes` clause is deep-merged
//! into one tree: a bare string is a leaf, an array contributes each of its
//! elements, and an object merges key-by-key recursively. Repeated calls
//! compose rather than overwrite, so
//! `includes("a")` followed by `includes({"a": "b"})` yields `{a: {b: {}}}`.

use perry_core::{ClauseValue, Json, Result};
use std::collections::BTreeMap;

/// A nested map of association names to their own include subtrees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludesTree {
    children: BTreeMap<String, IncludesTree>,
}

impl IncludesTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree by deep-merging every accumulated `includes` value.
    /// Deferred values are resolved here, at tree-construction time.
    pub fn from_values(values: &[ClauseValue]) -> Result<Self> {
        let mut tree = Self::new();
        for value in values {
            tree.merge_json(&value.resolve()?);
        }
        Ok(tree)
    }

    /// Deep-merge one JSON value into the tree. Strings become leaves,
    /// arrays merge element-wise, objects merge key-by-key; anything else
    /// is ignored.
    pub fn merge_json(&mut self, value: &Json) {
        match value {
            Json::String(name) => {
                self.children.entry(name.clone()).or_default();
            }
            Json::Array(items) => {
                for item in items {
                    self.merge_json(item);
                }
            }
            Json::Object(map) => {
                for (name, subtree) in map {
                    self.children
                        .entry(name.clone())
                        .or_default()
                        .merge_json(subtree);
                }
            }
            _ => {}
        }
    }

    /// Merge another tree into this one, key-by-key recursively.
    pub fn merge(&mut self, other: &IncludesTree) {
        for (name, subtree) in &other.children {
            self.children
                .entry(name.clone())
                .or_default()
                .merge(subtree);
        }
    }

    /// Whether the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of names at this level.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// The subtree for a given association name.
    pub fn get(&self, name: &str) -> Option<&IncludesTree> {
        self.children.get(name)
    }

    /// Iterate (name, subtree) pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IncludesTree)> {
        self.children.iter()
    }

    /// Association names at this level, in deterministic order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.children.keys()
    }

    /// Render the tree as nested JSON objects with empty-object leaves.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.children
                .iter()
                .map(|(name, subtree)| (name.clone(), subtree.to_json()))
                .collect(),
        )
    }
}
