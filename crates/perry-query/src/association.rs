//! Association descriptors and resolution.
//!
//! A descriptor is pure declaration: kind, target class name, and optional
//! key overrides. Resolution turns a descriptor plus an owner record into a
//! relation on the target type, deriving any keys the declaration left out
//! from naming conventions. Through associations resolve in two steps — a
//! proxy fetch supplies the join keys for the source query — and the lazy
//! single-owner form defers the proxy fetch until the outer relation
//! materializes.

use crate::model::ModelType;
use crate::record::Record;
use crate::relation::Relation;
use perry_core::{Attributes, ClauseValue, Error, Json, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// The shape of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// The owner carries the foreign key pointing at one target record.
    BelongsTo,
    /// One target record carries a foreign key pointing back at the owner.
    HasOne,
    /// Many target records carry a foreign key pointing back at the owner.
    HasMany,
}

/// Declarative metadata for one association on a model type.
///
/// Built with consuming setters and stamped with the declaring type's name
/// and primary key when the model type is built.
#[derive(Debug, Clone)]
pub struct AssociationDescriptor {
    name: String,
    kind: AssociationKind,
    class_name: Option<String>,
    foreign_key: Option<String>,
    primary_key: Option<String>,
    polymorphic: bool,
    polymorphic_tag: Option<String>,
    polymorphic_namespace: Option<String>,
    through: Option<String>,
    source: Option<String>,
    source_type: Option<String>,
    options: Option<ClauseValue>,
    declaring_type: String,
    declaring_primary_key: String,
}

impl AssociationDescriptor {
    fn new(name: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            class_name: None,
            foreign_key: None,
            primary_key: None,
            polymorphic: false,
            polymorphic_tag: None,
            polymorphic_namespace: None,
            through: None,
            source: None,
            source_type: None,
            options: None,
            declaring_type: String::new(),
            declaring_primary_key: "id".to_string(),
        }
    }

    /// Declare a belongs-to association.
    pub fn belongs_to(name: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::BelongsTo)
    }

    /// Declare a has-one association.
    pub fn has_one(name: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::HasOne)
    }

    /// Declare a has-many association.
    pub fn has_many(name: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::HasMany)
    }

    /// Set the target class name.
    #[must_use]
    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Override the foreign key attribute.
    #[must_use]
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Override the primary key attribute. On a belongs-to this names the
    /// target attribute the foreign key points at; on a has-side it names
    /// the owner attribute the target's foreign key holds.
    #[must_use]
    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    /// Mark a belongs-to as polymorphic: the target type is read from the
    /// owner's `{name}_type` attribute at resolution time.
    #[must_use]
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    /// On a has-side association, name the polymorphic interface on the
    /// target (`as` in the declaration). Keys default to `{tag}_id` and a
    /// `{tag}_type` condition carrying the declaring type's name is added.
    #[must_use]
    pub fn as_interface(mut self, tag: impl Into<String>) -> Self {
        self.polymorphic_tag = Some(tag.into());
        self
    }

    /// Namespace prepended when resolving polymorphic type names.
    #[must_use]
    pub fn polymorphic_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.polymorphic_namespace = Some(namespace.into());
        self
    }

    /// Resolve through another association on the declaring type.
    #[must_use]
    pub fn through(mut self, association: impl Into<String>) -> Self {
        self.through = Some(association.into());
        self
    }

    /// Source association on the proxy type for a through association;
    /// defaults to this association's own name.
    #[must_use]
    pub fn source(mut self, association: impl Into<String>) -> Self {
        self.source = Some(association.into());
        self
    }

    /// Concrete target class for a through association whose source is a
    /// polymorphic belongs-to; without it that source cannot be resolved
    /// statically.
    #[must_use]
    pub fn source_type(mut self, class_name: impl Into<String>) -> Self {
        self.source_type = Some(class_name.into());
        self
    }

    /// Extra finder options merged onto every resolved scope. May be a
    /// deferred value, which makes the association unpreloadable.
    #[must_use]
    pub fn options(mut self, options: impl Into<ClauseValue>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub(crate) fn declared_on(mut self, type_name: &str, primary_key: &str) -> Self {
        self.declaring_type = type_name.to_string();
        self.declaring_primary_key = primary_key.to_string();
        self
    }

    /// The association name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The association kind.
    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// Whether resolution yields a collection.
    pub fn is_collection(&self) -> bool {
        self.kind == AssociationKind::HasMany
    }

    /// The declared target class name, if any.
    pub fn target_class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// The through association name, if any.
    pub fn through_name(&self) -> Option<&str> {
        self.through.as_deref()
    }

    /// Name of the type this association was declared on.
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Primary key of the declaring type.
    pub fn declaring_primary_key(&self) -> &str {
        &self.declaring_primary_key
    }

    /// Whether this is a polymorphic belongs-to.
    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    /// Why this association cannot be batch eager-loaded, if it cannot.
    /// A polymorphic belongs-to resolves a different type per owner row,
    /// and deferred finder options are per-instance by construction.
    pub fn preload_block_reason(&self) -> Option<&'static str> {
        if self.kind == AssociationKind::BelongsTo && self.polymorphic {
            Some("polymorphic associations resolve a different type per record")
        } else if self.options.as_ref().is_some_and(ClauseValue::is_deferred) {
            Some("deferred finder options cannot be resolved for a batch")
        } else {
            None
        }
    }

    /// Whether this association can be batch eager-loaded.
    pub fn eager_loadable(&self) -> bool {
        self.preload_block_reason().is_none()
    }

    /// The foreign key attribute in effect, after convention defaults.
    pub fn effective_foreign_key(&self) -> String {
        if let Some(key) = &self.foreign_key {
            return key.clone();
        }
        match self.kind {
            AssociationKind::BelongsTo => format!("{}_id", self.name),
            AssociationKind::HasOne | AssociationKind::HasMany => match &self.polymorphic_tag {
                Some(tag) => format!("{tag}_id"),
                None => format!("{}_id", underscore(&self.declaring_type)),
            },
        }
    }

    /// The owner attribute a has-side association joins on.
    pub fn owner_primary_key(&self) -> &str {
        self.primary_key
            .as_deref()
            .unwrap_or(&self.declaring_primary_key)
    }

    /// The owner attribute naming a polymorphic belongs-to's target type.
    pub fn polymorphic_type_key(&self) -> String {
        format!("{}_type", self.name)
    }

    /// Resolve the statically-declared target type through the declaring
    /// type's registry.
    pub fn target_type(&self, declaring: &ModelType) -> Result<Arc<ModelType>> {
        if self.polymorphic {
            return Err(Error::configuration(format!(
                "association '{}' on model '{}' is polymorphic; its target type depends on a record",
                self.name, self.declaring_type
            )));
        }
        let class_name = self.class_name.as_ref().ok_or_else(|| {
            Error::configuration(format!(
                "association '{}' on model '{}' has no target class name",
                self.name, self.declaring_type
            ))
        })?;
        declaring.registry()?.resolve(class_name)
    }

    /// The type this association ultimately resolves to, following the
    /// through hop if there is one.
    pub fn resolved_target(&self, declaring: &Arc<ModelType>) -> Result<Arc<ModelType>> {
        match &self.through {
            Some(through) => {
                let (_, proxy_target) = self.proxy_step(declaring, through)?;
                Ok(self.source_step(&proxy_target)?.target)
            }
            None => self.target_type(declaring),
        }
    }

    /// Resolve the target type for one owner record, honoring polymorphic
    /// type attributes. Returns `None` when the polymorphic type attribute
    /// is absent or null.
    pub fn target_type_for(&self, owner: &Record) -> Result<Option<Arc<ModelType>>> {
        if !self.polymorphic {
            return self.target_type(owner.model()).map(Some);
        }
        let type_key = self.polymorphic_type_key();
        let Some(raw) = owner.attribute(&type_key).and_then(Json::as_str) else {
            return Ok(None);
        };
        let mut name = polymorphic_type_name(raw);
        if let Some(namespace) = &self.polymorphic_namespace {
            name = format!("{namespace}.{name}");
        }
        owner.model().registry()?.resolve(&name).map(Some)
    }

    /// Build the relation resolving this association for one owner.
    ///
    /// Returns `None` when the owner is missing a key the join needs; the
    /// association is then empty without any fetch.
    pub fn scope_for(&self, owner: &Record) -> Result<Option<Relation>> {
        if let Some(through) = self.through.clone() {
            return self.through_scope(owner, &through);
        }
        match self.kind {
            AssociationKind::BelongsTo => {
                let foreign_key = self.effective_foreign_key();
                let Some(value) = present(owner.attribute(&foreign_key)) else {
                    return Ok(None);
                };
                let Some(target) = self.target_type_for(owner)? else {
                    return Ok(None);
                };
                let target_key = self
                    .primary_key
                    .clone()
                    .unwrap_or_else(|| target.primary_key().to_string());
                let relation = target
                    .scoped()?
                    .where_(condition(&target_key, value.clone()));
                self.apply_options(relation).map(Some)
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let owner_key = self.owner_primary_key();
                let Some(value) = present(owner.attribute(owner_key)) else {
                    return Ok(None);
                };
                let target = self.target_type(owner.model())?;
                let foreign_key = self.effective_foreign_key();
                let mut relation = target
                    .scoped()?
                    .where_(condition(&foreign_key, value.clone()));
                if let Some(tag) = &self.polymorphic_tag {
                    relation = relation.where_(condition(
                        &format!("{tag}_type"),
                        Json::String(owner.model().name().to_string()),
                    ));
                }
                self.apply_options(relation).map(Some)
            }
        }
    }

    /// Lazy two-step resolution: the source relation's condition is a
    /// deferred thunk that fetches the proxy when the outer query
    /// materializes.
    fn through_scope(&self, owner: &Record, through: &str) -> Result<Option<Relation>> {
        let (proxy, proxy_target) = self.proxy_step(owner.model(), through)?;
        let Some(proxy_relation) = proxy.scope_for(owner)? else {
            return Ok(None);
        };
        let step = self.source_step(&proxy_target)?;

        let key_attribute = step.proxy_key.clone();
        let condition_key = step.condition_key.clone();
        let keys = move || -> Result<Json> {
            let values = distinct_attribute_values(&proxy_relation.fetch()?, &key_attribute);
            Ok(condition(&condition_key, Json::Array(values)))
        };

        let mut relation = step.target.scoped()?.where_(ClauseValue::deferred(keys));
        if let Some(extra) = step.extra_condition {
            relation = relation.where_(extra);
        }
        self.apply_options(relation).map(Some)
    }

    /// Build the batched relation (and join bookkeeping) resolving this
    /// association for a whole set of owners at once.
    pub(crate) fn preload_plan(&self, owners: &[Record]) -> Result<Option<PreloadPlan>> {
        if let Some(reason) = self.preload_block_reason() {
            return Err(Error::preload_not_supported(
                &self.declaring_type,
                &self.name,
                reason,
            ));
        }
        if owners.is_empty() {
            return Ok(None);
        }
        if let Some(through) = self.through.clone() {
            return self.through_preload_plan(owners, &through);
        }
        let declaring = owners[0].model().clone();
        match self.kind {
            AssociationKind::BelongsTo => {
                let foreign_key = self.effective_foreign_key();
                let keys = distinct_attribute_values(owners, &foreign_key);
                if keys.is_empty() {
                    return Ok(None);
                }
                let target = self.target_type(&declaring)?;
                let target_key = self
                    .primary_key
                    .clone()
                    .unwrap_or_else(|| target.primary_key().to_string());
                let relation = self.apply_options(
                    target
                        .scoped()?
                        .where_(condition(&target_key, Json::Array(keys))),
                )?;
                Ok(Some(PreloadPlan::Direct {
                    relation,
                    owner_key: foreign_key,
                    row_key: target_key,
                    type_guard: None,
                }))
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let owner_key = self.owner_primary_key().to_string();
                let keys = distinct_attribute_values(owners, &owner_key);
                if keys.is_empty() {
                    return Ok(None);
                }
                let target = self.target_type(&declaring)?;
                let foreign_key = self.effective_foreign_key();
                let mut relation = target
                    .scoped()?
                    .where_(condition(&foreign_key, Json::Array(keys)));
                let type_guard = self
                    .polymorphic_tag
                    .as_ref()
                    .map(|tag| (format!("{tag}_type"), self.declaring_type.clone()));
                if let Some((key, value)) = &type_guard {
                    relation = relation.where_(condition(key, Json::String(value.clone())));
                }
                let relation = self.apply_options(relation)?;
                Ok(Some(PreloadPlan::Direct {
                    relation,
                    owner_key,
                    row_key: foreign_key,
                    type_guard,
                }))
            }
        }
    }

    /// Batched two-step resolution: fetch the proxy rows eagerly, then
    /// build the source relation over the collected join keys, keeping a
    /// per-owner link table for attachment.
    fn through_preload_plan(
        &self,
        owners: &[Record],
        through: &str,
    ) -> Result<Option<PreloadPlan>> {
        let declaring = owners[0].model().clone();
        let (proxy, proxy_target) = self.proxy_step(&declaring, through)?;
        let Some(proxy_plan) = proxy.preload_plan(owners)? else {
            return Ok(None);
        };
        let PreloadPlan::Direct {
            relation: proxy_relation,
            owner_key,
            row_key: proxy_row_key,
            ..
        } = proxy_plan
        else {
            return Err(Error::configuration(format!(
                "through association chains longer than one hop are not supported \
                 ('{}' through '{through}')",
                self.name
            )));
        };
        let step = self.source_step(&proxy_target)?;

        let proxy_rows = proxy_relation.fetch()?;
        let mut keys: Vec<Json> = Vec::new();
        let mut links: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in &proxy_rows {
            let Some(key) = present(row.attribute(&step.proxy_key)) else {
                continue;
            };
            let Some(owner_value) = present(row.attribute(&proxy_row_key)) else {
                continue;
            };
            let entry = links.entry(canonical_key(owner_value)).or_default();
            let rendered = canonical_key(key);
            if !entry.contains(&rendered) {
                entry.push(rendered);
            }
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        if keys.is_empty() {
            return Ok(None);
        }

        let mut relation = step
            .target
            .scoped()?
            .where_(condition(&step.condition_key, Json::Array(keys)));
        if let Some(extra) = step.extra_condition {
            relation = relation.where_(extra);
        }
        let relation = self.apply_options(relation)?;
        Ok(Some(PreloadPlan::Through {
            relation,
            row_key: step.condition_key,
            owner_key,
            links,
            type_guard: step.type_guard,
        }))
    }

    fn proxy_step(
        &self,
        declaring: &Arc<ModelType>,
        through: &str,
    ) -> Result<(AssociationDescriptor, Arc<ModelType>)> {
        let proxy = declaring
            .association(through)
            .cloned()
            .ok_or_else(|| Error::association_not_found(&self.declaring_type, through))?;
        if proxy.through.is_some() {
            return Err(Error::configuration(format!(
                "through association chains longer than one hop are not supported \
                 ('{}' through '{through}')",
                self.name
            )));
        }
        let proxy_target = proxy.target_type(declaring)?;
        Ok((proxy, proxy_target))
    }

    fn source_step(&self, proxy_target: &Arc<ModelType>) -> Result<SourceStep> {
        let source_name = self.source.clone().unwrap_or_else(|| self.name.clone());
        let source = proxy_target
            .association(&source_name)
            .cloned()
            .ok_or_else(|| Error::association_not_found(proxy_target.name(), &source_name))?;
        if source.through.is_some() {
            return Err(Error::configuration(format!(
                "through association chains longer than one hop are not supported \
                 ('{}' via source '{source_name}')",
                self.name
            )));
        }
        match source.kind {
            AssociationKind::BelongsTo => {
                let target = if source.polymorphic {
                    let class_name = self.source_type.as_ref().ok_or_else(|| {
                        Error::configuration(format!(
                            "source association '{source_name}' for '{}' is polymorphic; \
                             declare a source type to resolve it",
                            self.name
                        ))
                    })?;
                    proxy_target.registry()?.resolve(class_name)?
                } else {
                    source.target_type(proxy_target)?
                };
                let condition_key = source
                    .primary_key
                    .clone()
                    .unwrap_or_else(|| target.primary_key().to_string());
                Ok(SourceStep {
                    proxy_key: source.effective_foreign_key(),
                    condition_key,
                    extra_condition: None,
                    type_guard: None,
                    target,
                })
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let target = source.target_type(proxy_target)?;
                let type_guard = source
                    .polymorphic_tag
                    .as_ref()
                    .map(|tag| (format!("{tag}_type"), proxy_target.name().to_string()));
                let extra_condition = type_guard
                    .as_ref()
                    .map(|(key, value)| condition(key, Json::String(value.clone())));
                Ok(SourceStep {
                    proxy_key: source.owner_primary_key().to_string(),
                    condition_key: source.effective_foreign_key(),
                    extra_condition,
                    type_guard,
                    target,
                })
            }
        }
    }

    fn apply_options(&self, relation: Relation) -> Result<Relation> {
        match &self.options {
            Some(options) => relation.apply_finder_options(&options.resolve()?),
            None => Ok(relation),
        }
    }
}

/// One resolved source hop of a through association.
struct SourceStep {
    /// Attribute on proxy rows supplying the join keys.
    proxy_key: String,
    /// Condition key on the source query, also the match key on its rows.
    condition_key: String,
    extra_condition: Option<Json>,
    /// Type-tag attribute and expected value a fetched row must carry to
    /// attach, when the source hangs off a polymorphic interface.
    type_guard: Option<(String, String)>,
    target: Arc<ModelType>,
}

/// A batched association query plus the bookkeeping needed to hand each
/// fetched row back to its owner.
pub(crate) enum PreloadPlan {
    Direct {
        relation: Relation,
        /// Attribute on each owner whose value joins to `row_key`.
        owner_key: String,
        /// Attribute on each fetched row whose value joins to `owner_key`.
        row_key: String,
        /// Type-tag attribute and expected value a fetched row must also
        /// carry, for associations on a polymorphic interface.
        type_guard: Option<(String, String)>,
    },
    Through {
        relation: Relation,
        /// Attribute on each fetched row to match against `links`.
        row_key: String,
        /// Attribute on each owner keying into `links`.
        owner_key: String,
        /// Canonical owner-key value to the canonical row-key values that
        /// belong to it, built from the proxy rows.
        links: BTreeMap<String, Vec<String>>,
        type_guard: Option<(String, String)>,
    },
}

impl PreloadPlan {
    pub(crate) fn relation(&self) -> &Relation {
        match self {
            PreloadPlan::Direct { relation, .. } | PreloadPlan::Through { relation, .. } => {
                relation
            }
        }
    }

    pub(crate) fn with_relation(self, relation: Relation) -> Self {
        match self {
            PreloadPlan::Direct {
                owner_key,
                row_key,
                type_guard,
                ..
            } => PreloadPlan::Direct {
                relation,
                owner_key,
                row_key,
                type_guard,
            },
            PreloadPlan::Through {
                row_key,
                owner_key,
                links,
                type_guard,
                ..
            } => PreloadPlan::Through {
                relation,
                row_key,
                owner_key,
                links,
                type_guard,
            },
        }
    }
}

/// Normalize a raw polymorphic type value into a class name: strip
/// anything from a non-letter (keeping underscores), then camelize
/// underscored segments.
pub fn polymorphic_type_name(raw: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z_]\w*").expect("literal pattern compiles"));
    camelize(&pattern.replace_all(raw, ""))
}

fn camelize(name: &str) -> String {
    name.split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (index, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Build a one-key condition object without going through a JSON literal.
pub(crate) fn condition(key: &str, value: Json) -> Json {
    let mut map = Attributes::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

/// Render a join-key value in a stable, hashable form.
pub(crate) fn canonical_key(value: &Json) -> String {
    value.to_string()
}

fn present(value: Option<&Json>) -> Option<&Json> {
    value.filter(|v| !v.is_null())
}

/// Distinct non-null values of one attribute across records, in first-seen
/// order.
pub(crate) fn distinct_attribute_values(records: &[Record], attribute: &str) -> Vec<Json> {
    let mut values = Vec::new();
    for record in records {
        if let Some(value) = present(record.attribute(attribute)) {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }
    values
}
