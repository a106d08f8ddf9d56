//! The model registry.
//!
//! Associations refer to their target types by class name, and polymorphic
//! associations only learn the target name from row data at resolution
//! time. The registry is the lookup that turns those names back into model
//! types. Every type is registered under its namespace-qualified name;
//! resolution accepts either the qualified name or a bare name, and a bare
//! name that matches types in several namespaces is an error rather than a
//! guess.

use crate::model::{ModelType, ModelTypeBuilder};
use perry_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

pub(crate) struct RegistryInner {
    models: RwLock<BTreeMap<String, Arc<ModelType>>>,
}

/// A shared name-to-model-type lookup.
///
/// Cloning is cheap and every clone views the same table.
#[derive(Clone)]
pub struct ModelRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                models: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    /// Build and register a model type.
    ///
    /// Fails if a type is already registered under the same qualified
    /// name; shadowing an existing type silently is never what the caller
    /// meant.
    pub fn register(&self, builder: ModelTypeBuilder) -> Result<Arc<ModelType>> {
        let model = Arc::new(builder.build()?);
        let qualified = model.qualified_name();
        let mut models = self
            .inner
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(&qualified) {
            return Err(Error::configuration(format!(
                "model '{qualified}' is already registered"
            )));
        }
        model.attach_registry(&self.inner);
        models.insert(qualified, model.clone());
        Ok(model)
    }

    /// Resolve a class name to a model type.
    ///
    /// The trailing segment is the bare type name; anything before the
    /// last dot narrows candidates to namespaces ending with that suffix.
    /// Every registered type sharing the bare name is a candidate first
    /// (a namespace-less registration included), so two same-named types
    /// make a bare-name lookup ambiguous rather than quietly picking one.
    pub fn resolve(&self, name: &str) -> Result<Arc<ModelType>> {
        let models = self
            .inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let (hint, bare) = match name.rsplit_once('.') {
            Some((namespace, bare)) => (Some(namespace), bare),
            None => (None, name),
        };

        let candidates: Vec<&Arc<ModelType>> = models
            .values()
            .filter(|model| model.name() == bare)
            .filter(|model| match hint {
                None => true,
                Some(hint) => model
                    .namespace()
                    .is_some_and(|ns| ns == hint || ns.ends_with(&format!(".{hint}"))),
            })
            .collect();

        match candidates.as_slice() {
            [] => Err(Error::model_not_defined(name)),
            [model] => Ok((*model).clone()),
            many => Err(Error::ambiguous_class_name(
                name,
                many.iter().map(|m| m.qualified_name()).collect(),
            )),
        }
    }

    /// Qualified names of every registered type, in order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
