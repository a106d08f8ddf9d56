//! Named, reusable query fragments.
//!
//! A scope is registered on a model type and invoked through a relation;
//! the invocation is equivalent to merging the scope's result onto the
//! receiver, so scopes chain freely with ordinary clause calls.

use crate::relation::Relation;
use perry_core::{Error, Json, Result};
use std::fmt;
use std::sync::Arc;

/// Signature for dynamic scopes: given the model's base relation and the
/// caller's arguments, produce the relation to merge.
pub type ScopeFn = Arc<dyn Fn(Relation, &[Json]) -> Result<Relation>>;

/// A named query shortcut: either a static finder-options object or a
/// function building a relation at call time.
#[derive(Clone)]
pub enum Scope {
    /// Static finder options applied via `apply_finder_options`.
    Options(Json),
    /// A builder invoked with the model's scoped relation and any
    /// call-site arguments.
    Build(ScopeFn),
}

impl Scope {
    /// Create a static scope from a finder-options object.
    ///
    /// Anything other than a JSON object is rejected: scopes carry query
    /// options, not bare values.
    pub fn options(options: Json) -> Result<Self> {
        if options.is_object() {
            Ok(Scope::Options(options))
        } else {
            Err(Error::argument(format!(
                "invalid scope parameter {options}: must be an options object or a builder"
            )))
        }
    }

    /// Create a dynamic scope from a builder function.
    pub fn build(f: impl Fn(Relation, &[Json]) -> Result<Relation> + 'static) -> Self {
        Scope::Build(Arc::new(f))
    }

    /// Normalize positional-vs-keyword scope arguments; the entry point
    /// scope declarations (`ModelTypeBuilder::scope_options`) run through.
    ///
    /// A declaration takes either one literal options object *or*
    /// keyword-style options: supplying both at once is ambiguous, and
    /// supplying neither is meaningless. Returns the single options object
    /// to use.
    pub fn from_args(positional: Option<Json>, keyword: Option<Json>) -> Result<Json> {
        match (positional, keyword) {
            (Some(positional), None) if positional.is_object() => Ok(positional),
            (None, Some(keyword)) if keyword.is_object() => Ok(keyword),
            (Some(positional), Some(keyword)) => Err(Error::argument(format!(
                "ambiguous scoping arguments ({positional}, {keyword}): pass an options object or keywords, not both"
            ))),
            (positional, keyword) => Err(Error::argument(format!(
                "invalid scoping arguments ({}, {})",
                positional.unwrap_or(Json::Null),
                keyword.unwrap_or(Json::Null)
            ))),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Options(options) => f.debug_tuple("Options").field(options).finish(),
            Scope::Build(_) => f.write_str("Build(..)"),
        }
    }
}
