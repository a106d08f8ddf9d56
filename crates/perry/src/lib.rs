//! Perry - an adapter-agnostic object mapper core.
//!
//! Perry keeps query construction, association resolution, and batch eager
//! loading completely separate from any storage backend. Models are
//! described at runtime, queries accumulate as opaque JSON clauses on
//! immutable lazy relations, and a single [`Fetch`] trait is the only
//! thing an adapter has to implement.
//!
//! # Quick Start
//!
//! ```ignore
//! use perry::prelude::*;
//! use serde_json::json;
//!
//! let registry = ModelRegistry::new();
//! let site = registry.register(
//!     ModelType::builder("Site")
//!         .adapter(my_adapter.clone())
//!         .association(AssociationDescriptor::has_many("articles").class_name("Article"))
//!         .association(
//!             AssociationDescriptor::has_many("comments")
//!                 .through("articles")
//!                 .source("comments"),
//!         ),
//! )?;
//! registry.register(
//!     ModelType::builder("Article")
//!         .adapter(my_adapter.clone())
//!         .association(AssociationDescriptor::belongs_to("site").class_name("Site"))
//!         .association(AssociationDescriptor::has_many("comments").class_name("Comment")),
//! )?;
//! registry.register(ModelType::builder("Comment").adapter(my_adapter))?;
//!
//! // Relations are immutable and lazy: nothing is fetched until read.
//! let recent = site
//!     .scoped()?
//!     .where_(json!({"published": true}))
//!     .order(json!("created_at"))
//!     .limit(10);
//! for record in recent.includes(json!({"articles": "comments"})).all()? {
//!     let articles = record.many("articles")?;
//!     // ...
//! }
//! # Ok::<(), perry::Error>(())
//! ```
//!
//! # Crates
//!
//! - `perry-core`: boundary types shared with adapters ([`Fetch`],
//!   [`QuerySpec`], [`ClauseValue`], the error taxonomy).
//! - `perry-query`: the engine (model types, relations, records,
//!   associations, preloading).
//! - `perry`: this facade.

pub use perry_core::{
    AmbiguousClassName, ArgumentError, AssociationNotFound, AssociationPreloadNotSupported,
    Attributes, ClauseValue, ConfigurationError, Deferred, Error, Fetch, FetchError, Json,
    ModelNotDefined, QuerySpec, Result, INCLUDES_KEY,
};
pub use perry_query::{
    polymorphic_type_name, AssociationDescriptor, AssociationKind, AssociationValue, IncludesTree,
    ModelRegistry, ModelType, ModelTypeBuilder, Preloader, Record, Relation, Scope, ScopeFn,
};

/// One-stop imports for application code.
pub mod prelude {
    pub use crate::{
        AssociationDescriptor, AssociationKind, ClauseValue, Error, Fetch, ModelRegistry,
        ModelType, QuerySpec, Record, Relation, Result, Scope,
    };
}
