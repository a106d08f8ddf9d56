//! Runtime model type descriptors.
//!
//! A `ModelType` is the per-type metadata the engine works from: name and
//! namespace, primary key, the association and scope tables, default
//! scopes, and the fetch adapter serving this type. All of it is assembled
//! once through [`ModelTypeBuilder`] and then read as plain map lookups —
//! there is no reflection and no runtime hierarchy walk. A builder may
//! extend an already-built parent type, in which case the parent's tables
//! are copied and same-named child entries override them at build time.

use crate::association::AssociationDescriptor;
use crate::record::Record;
use crate::registry::{ModelRegistry, RegistryInner};
use crate::relation::Relation;
use crate::scope::Scope;
use perry_core::{Attributes, Error, Fetch, Json, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Immutable metadata for one model type.
pub struct ModelType {
    name: String,
    namespace: Option<String>,
    primary_key: String,
    associations: BTreeMap<String, AssociationDescriptor>,
    scopes: BTreeMap<String, Scope>,
    default_scopes: Vec<Scope>,
    adapter: Arc<dyn Fetch>,
    registry: OnceLock<Weak<RegistryInner>>,
}

impl ModelType {
    /// Start building a model type with the given name.
    pub fn builder(name: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            name: name.into(),
            namespace: None,
            primary_key: "id".to_string(),
            associations: BTreeMap::new(),
            scopes: BTreeMap::new(),
            default_scopes: Vec::new(),
            adapter: None,
        }
    }

    /// Start a builder pre-seeded from a parent type: primary key,
    /// adapter, associations, scopes, and default scopes are copied, and
    /// any entry the child declares under the same name overrides the
    /// parent's.
    pub fn extending(name: impl Into<String>, parent: &Arc<ModelType>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            name: name.into(),
            namespace: parent.namespace.clone(),
            primary_key: parent.primary_key.clone(),
            associations: parent.associations.clone(),
            scopes: parent.scopes.clone(),
            default_scopes: parent.default_scopes.clone(),
            adapter: Some(parent.adapter.clone()),
        }
    }

    /// The bare type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dotted namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Namespace-qualified name (`ns.Name`), or the bare name.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The primary key attribute name.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Look up an association descriptor by name.
    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.associations.get(name)
    }

    /// Iterate all declared associations in name order.
    pub fn associations(&self) -> impl Iterator<Item = (&String, &AssociationDescriptor)> {
        self.associations.iter()
    }

    /// Look up a registered scope by name.
    pub fn scope(&self, name: &str) -> Option<&Scope> {
        self.scopes.get(name)
    }

    /// The fetch adapter serving this type.
    pub fn adapter(&self) -> &Arc<dyn Fetch> {
        &self.adapter
    }

    /// The registry this type was registered with.
    ///
    /// Fails for unregistered types; registration is what makes
    /// string-declared and polymorphic associations resolvable.
    pub fn registry(&self) -> Result<ModelRegistry> {
        self.registry
            .get()
            .and_then(Weak::upgrade)
            .map(ModelRegistry::from_inner)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "model '{}' is not registered with a model registry",
                    self.qualified_name()
                ))
            })
    }

    pub(crate) fn attach_registry(&self, inner: &Arc<RegistryInner>) {
        let _ = self.registry.set(Arc::downgrade(inner));
    }

    /// Base relation for this type, without default scopes.
    pub fn unscoped(self: &Arc<Self>) -> Relation {
        Relation::new(self.clone())
    }

    /// Base relation with the type's default scopes merged on.
    ///
    /// Default scope builders receive the unscoped base relation, so a
    /// default scope can never recurse into itself.
    pub fn scoped(self: &Arc<Self>) -> Result<Relation> {
        let mut relation = self.unscoped();
        for scope in &self.default_scopes {
            relation = relation.merge_scope_body(scope, &[], self.unscoped())?;
        }
        Ok(relation)
    }

    /// Hydrate one raw row into a record of this type.
    pub fn hydrate(self: &Arc<Self>, attributes: Attributes) -> Record {
        Record::new(self.clone(), attributes)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("primary_key", &self.primary_key)
            .field("associations", &self.associations.keys())
            .field("scopes", &self.scopes.keys())
            .field("default_scopes", &self.default_scopes.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ModelTypeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelTypeBuilder")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("primary_key", &self.primary_key)
            .field("associations", &self.associations.keys())
            .field("scopes", &self.scopes.keys())
            .field("default_scopes", &self.default_scopes.len())
            .finish_non_exhaustive()
    }
}

/// Builder assembling a [`ModelType`].
pub struct ModelTypeBuilder {
    name: String,
    namespace: Option<String>,
    primary_key: String,
    associations: BTreeMap<String, AssociationDescriptor>,
    scopes: BTreeMap<String, Scope>,
    default_scopes: Vec<Scope>,
    adapter: Option<Arc<dyn Fetch>>,
}

impl ModelTypeBuilder {
    /// Set the dotted namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the primary key attribute (default `id`).
    #[must_use]
    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Set the fetch adapter for this type.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn Fetch>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Declare an association; a same-named earlier entry is replaced.
    #[must_use]
    pub fn association(mut self, descriptor: AssociationDescriptor) -> Self {
        self.associations
            .insert(descriptor.name().to_string(), descriptor);
        self
    }

    /// Register a named scope; a same-named earlier entry is replaced.
    #[must_use]
    pub fn scope(mut self, name: impl Into<String>, scope: Scope) -> Self {
        self.scopes.insert(name.into(), scope);
        self
    }

    /// Register static finder options as a named scope. Declarations take
    /// either one literal options object or keyword-style options; passing
    /// both at once, or neither, is an error.
    pub fn scope_options(
        self,
        name: impl Into<String>,
        positional: Option<Json>,
        keyword: Option<Json>,
    ) -> Result<Self> {
        let options = Scope::from_args(positional, keyword)?;
        let scope = Scope::options(options)?;
        Ok(self.scope(name, scope))
    }

    /// Append a default scope; default scopes aggregate in call order.
    #[must_use]
    pub fn default_scope(mut self, scope: Scope) -> Self {
        self.default_scopes.push(scope);
        self
    }

    /// Finalize the type. Fails when no fetch adapter was configured;
    /// stamps the declaring type name and primary key into every
    /// association descriptor.
    pub fn build(self) -> Result<ModelType> {
        let adapter = self.adapter.ok_or_else(|| {
            Error::configuration(format!(
                "model '{}' has no fetch adapter configured",
                self.name
            ))
        })?;

        let associations = self
            .associations
            .into_iter()
            .map(|(name, descriptor)| {
                (name, descriptor.declared_on(&self.name, &self.primary_key))
            })
            .collect();

        Ok(ModelType {
            name: self.name,
            namespace: self.namespace,
            primary_key: self.primary_key,
            associations,
            scopes: self.scopes,
            default_scopes: self.default_scopes,
            adapter,
            registry: OnceLock::new(),
        })
    }
}
