//! The Perry query engine.
//!
//! Builds on the `perry-core` boundary types: model types and their
//! registry, lazy immutable relations, hydrated records, association
//! resolution, and batch eager loading. Nothing here interprets query
//! payloads; everything user-shaped stays opaque JSON until the fetch
//! adapter sees it.

pub mod association;
pub mod includes;
pub mod model;
pub mod preload;
pub mod record;
pub mod registry;
pub mod relation;
pub mod scope;

pub use association::{polymorphic_type_name, AssociationDescriptor, AssociationKind};
pub use includes::IncludesTree;
pub use model::{ModelType, ModelTypeBuilder};
pub use preload::Preloader;
pub use record::{AssociationValue, Record};
pub use registry::ModelRegistry;
pub use relation::Relation;
pub use scope::{Scope, ScopeFn};
