//! Boundary types and traits for the Perry object mapper.
//!
//! This crate holds the artifacts that cross the line between the relation
//! engine and the outside world:
//!
//! - [`Error`] / [`Result`] — the error taxonomy raised at points of misuse
//! - [`ClauseValue`] — opaque literal-or-deferred clause payloads
//! - [`QuerySpec`] — the deterministic, materialized query map
//! - [`Fetch`] — the single synchronous contract an adapter stack provides
//!
//! The engine itself (relations, scopes, associations, preloading) lives in
//! `perry-query`; most users depend on the `perry` facade crate.

pub mod error;
pub mod fetch;
pub mod query;
pub mod value;

pub use error::{
    AmbiguousClassName, ArgumentError, AssociationNotFound, AssociationPreloadNotSupported,
    ConfigurationError, Error, FetchError, ModelNotDefined, Result,
};
pub use fetch::Fetch;
pub use query::{INCLUDES_KEY, QuerySpec};
pub use value::{Attributes, ClauseValue, Deferred, Json};
