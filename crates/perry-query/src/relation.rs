//! Lazy, immutable query relations.
//!
//! A relation accumulates query clauses without interpreting them and only
//! talks to the fetch adapter when results are first read. Every clause
//! method returns a new relation; the receiver is never mutated. Results
//! are memoized per instance, and cloning deliberately drops the memo, so
//! a derived relation always re-resolves against the adapter.

use crate::includes::IncludesTree;
use crate::model::ModelType;
use crate::preload::Preloader;
use crate::record::Record;
use crate::scope::Scope;
use perry_core::{Attributes, ClauseValue, Error, Json, QuerySpec, Result};
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Singular clause names: a later call replaces the earlier value.
const SINGULAR_FIELDS: [&str; 4] = ["limit", "offset", "from", "sql"];

/// Plural clause names: every call appends.
const PLURAL_FIELDS: [&str; 8] = [
    "select", "group", "order", "joins", "includes", "where", "having", "modifiers",
];

#[derive(Clone, Default)]
struct Clauses {
    limit: Option<ClauseValue>,
    offset: Option<ClauseValue>,
    from: Option<ClauseValue>,
    sql: Option<ClauseValue>,
    select: Vec<ClauseValue>,
    group: Vec<ClauseValue>,
    order: Vec<ClauseValue>,
    joins: Vec<ClauseValue>,
    includes: Vec<ClauseValue>,
    wheres: Vec<ClauseValue>,
    having: Vec<ClauseValue>,
    modifiers: Vec<ClauseValue>,
}

/// A lazy query against one model type.
pub struct Relation {
    model: Arc<ModelType>,
    clauses: Clauses,
    spec: OnceCell<QuerySpec>,
    tree: OnceCell<IncludesTree>,
    modifier_map: OnceCell<Json>,
    records: OnceCell<Vec<Record>>,
}

impl Clone for Relation {
    /// Clauses are carried over; the spec, tree, modifier, and result
    /// memos are not. Deferred clause values are shared by reference,
    /// never re-wrapped.
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            clauses: self.clauses.clone(),
            spec: OnceCell::new(),
            tree: OnceCell::new(),
            modifier_map: OnceCell::new(),
            records: OnceCell::new(),
        }
    }
}

impl Relation {
    pub(crate) fn new(model: Arc<ModelType>) -> Self {
        Self {
            model,
            clauses: Clauses::default(),
            spec: OnceCell::new(),
            tree: OnceCell::new(),
            modifier_map: OnceCell::new(),
            records: OnceCell::new(),
        }
    }

    /// Build a relation whose results are already known; reading it never
    /// touches the adapter.
    pub(crate) fn preloaded(model: Arc<ModelType>, records: Vec<Record>) -> Self {
        let relation = Self::new(model);
        let _ = relation.records.set(records);
        relation
    }

    /// The model type this relation queries.
    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    fn derive(&self, build: impl FnOnce(&mut Clauses)) -> Relation {
        let mut next = self.clone();
        build(&mut next.clauses);
        next
    }

    /// Replace the row limit.
    #[must_use]
    pub fn limit(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| clauses.limit = Some(value))
    }

    /// Replace the row offset.
    #[must_use]
    pub fn offset(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| clauses.offset = Some(value))
    }

    /// Replace the data source.
    #[must_use]
    pub fn from_(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| clauses.from = Some(value))
    }

    /// Replace the raw query override.
    #[must_use]
    pub fn sql(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| clauses.sql = Some(value))
    }

    /// Append projection clauses.
    #[must_use]
    pub fn select(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.select, value))
    }

    /// Append grouping clauses.
    #[must_use]
    pub fn group(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.group, value))
    }

    /// Append ordering clauses.
    #[must_use]
    pub fn order(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.order, value))
    }

    /// Append join clauses.
    #[must_use]
    pub fn joins(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.joins, value))
    }

    /// Append eager-load declarations; all accumulated values deep-merge
    /// into one tree at materialization time.
    #[must_use]
    pub fn includes(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.includes, value))
    }

    /// Append condition clauses.
    #[must_use]
    pub fn where_(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.wheres, value))
    }

    /// Alias for [`Relation::where_`].
    #[must_use]
    pub fn conditions(&self, value: impl Into<ClauseValue>) -> Relation {
        self.where_(value)
    }

    /// Append having clauses.
    #[must_use]
    pub fn having(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.having, value))
    }

    /// Append a modifiers object: out-of-band data the query engine never
    /// interprets, visible to adapters and middleware.
    #[must_use]
    pub fn modifiers(&self, value: impl Into<ClauseValue>) -> Relation {
        let value = value.into();
        self.derive(|clauses| push(&mut clauses.modifiers, value))
    }

    /// Derive a relation that bypasses any adapter-side caching: a
    /// `{"fresh": true}` modifier is appended, and since derivation drops
    /// the result memo, reading the result re-runs the query.
    #[must_use]
    pub fn fresh(&self) -> Relation {
        self.modifiers(serde_json::json!({"fresh": true}))
    }

    /// Apply one clause by name. `conditions` is accepted as an alias for
    /// `where`; unknown names are argument errors.
    pub fn apply(&self, field: &str, value: impl Into<ClauseValue>) -> Result<Relation> {
        let value = value.into();
        Ok(match field {
            "limit" => self.limit(value),
            "offset" => self.offset(value),
            "from" => self.from_(value),
            "sql" => self.sql(value),
            "select" => self.select(value),
            "group" => self.group(value),
            "order" => self.order(value),
            "joins" => self.joins(value),
            "includes" => self.includes(value),
            "where" | "conditions" => self.where_(value),
            "having" => self.having(value),
            "modifiers" => self.modifiers(value),
            other => {
                return Err(Error::argument(format!(
                    "unknown query option '{other}' (expected one of {SINGULAR_FIELDS:?} or {PLURAL_FIELDS:?})"
                )));
            }
        })
    }

    /// Apply a finder-options object, one clause per recognized key.
    /// Unrecognized keys and null values are skipped, so option objects
    /// can carry data aimed at other layers.
    pub fn apply_finder_options(&self, options: &Json) -> Result<Relation> {
        let Json::Object(map) = options else {
            return Err(Error::argument(format!(
                "finder options must be an object, got {options}"
            )));
        };
        let mut relation = self.clone();
        for (field, value) in map {
            if value.is_null() || !is_query_option(field) {
                continue;
            }
            relation = relation.apply(field, value.clone())?;
        }
        Ok(relation)
    }

    /// Merge another relation's clauses onto this one. Singular clauses
    /// from `other` replace, plural clauses append. Relations over
    /// different model types never merge.
    pub fn merge(&self, other: &Relation) -> Result<Relation> {
        if self.model.qualified_name() != other.model.qualified_name() {
            return Err(Error::argument(format!(
                "cannot merge a relation on '{}' into a relation on '{}'",
                other.model.qualified_name(),
                self.model.qualified_name()
            )));
        }
        Ok(self.derive(|clauses| {
            let theirs = &other.clauses;
            if theirs.limit.is_some() {
                clauses.limit = theirs.limit.clone();
            }
            if theirs.offset.is_some() {
                clauses.offset = theirs.offset.clone();
            }
            if theirs.from.is_some() {
                clauses.from = theirs.from.clone();
            }
            if theirs.sql.is_some() {
                clauses.sql = theirs.sql.clone();
            }
            clauses.select.extend(theirs.select.iter().cloned());
            clauses.group.extend(theirs.group.iter().cloned());
            clauses.order.extend(theirs.order.iter().cloned());
            clauses.joins.extend(theirs.joins.iter().cloned());
            clauses.includes.extend(theirs.includes.iter().cloned());
            clauses.wheres.extend(theirs.wheres.iter().cloned());
            clauses.having.extend(theirs.having.iter().cloned());
            clauses.modifiers.extend(theirs.modifiers.iter().cloned());
        }))
    }

    /// Invoke a named scope registered on the model type and merge its
    /// result onto this relation.
    pub fn scope(&self, name: &str, args: &[Json]) -> Result<Relation> {
        let scope = self.model.scope(name).cloned().ok_or_else(|| {
            Error::argument(format!(
                "unknown scope '{name}' on model '{}'",
                self.model.name()
            ))
        })?;
        self.merge_scope_body(&scope, args, self.model.unscoped())
    }

    /// Merge one scope body onto this relation. Builder scopes run against
    /// the supplied base relation, then merge their result here.
    pub(crate) fn merge_scope_body(
        &self,
        scope: &Scope,
        args: &[Json],
        base: Relation,
    ) -> Result<Relation> {
        match scope {
            Scope::Options(options) => self.apply_finder_options(options),
            Scope::Build(build) => {
                let built = build(base, args)?;
                self.merge(&built)
            }
        }
    }

    /// The merged eager-load tree across every accumulated `includes`
    /// value, memoized per instance: the spec build and the preload pass
    /// both read it, and its deferred values must resolve only once.
    pub fn includes_tree(&self) -> Result<IncludesTree> {
        if let Some(tree) = self.tree.get() {
            return Ok(tree.clone());
        }
        let tree = IncludesTree::from_values(&self.clauses.includes)?;
        Ok(self.tree.get_or_init(|| tree).clone())
    }

    /// The shallow merge of every accumulated modifiers object; later
    /// entries win per key. Memoized per instance like the includes tree.
    pub fn modifiers_value(&self) -> Result<Json> {
        if let Some(map) = self.modifier_map.get() {
            return Ok(map.clone());
        }
        let merged = self.merge_modifiers()?;
        Ok(self.modifier_map.get_or_init(|| merged).clone())
    }

    fn merge_modifiers(&self) -> Result<Json> {
        let mut merged = Attributes::new();
        for value in &self.clauses.modifiers {
            match value.resolve()? {
                Json::Object(map) => {
                    for (key, entry) in map {
                        merged.insert(key, entry);
                    }
                }
                other => {
                    return Err(Error::argument(format!(
                        "modifiers must be objects, got {other}"
                    )));
                }
            }
        }
        Ok(Json::Object(merged))
    }

    /// Materialize the accumulated clauses, memoized per instance, so
    /// deferred values resolve at most once per relation.
    pub fn query_spec(&self) -> Result<QuerySpec> {
        if let Some(spec) = self.spec.get() {
            return Ok(spec.clone());
        }
        let spec = self.build_spec()?;
        Ok(self.spec.get_or_init(|| spec).clone())
    }

    fn build_spec(&self) -> Result<QuerySpec> {
        let mut spec = QuerySpec::new();
        let clauses = &self.clauses;
        for (field, value) in [
            ("limit", &clauses.limit),
            ("offset", &clauses.offset),
            ("from", &clauses.from),
            ("sql", &clauses.sql),
        ] {
            if let Some(value) = value {
                spec.set(field, value.resolve()?);
            }
        }
        for (field, values) in [
            ("select", &clauses.select),
            ("group", &clauses.group),
            ("order", &clauses.order),
            ("joins", &clauses.joins),
            ("where", &clauses.wheres),
            ("having", &clauses.having),
        ] {
            if !values.is_empty() {
                let resolved = values
                    .iter()
                    .map(ClauseValue::resolve)
                    .collect::<Result<Vec<Json>>>()?;
                spec.set(field, Json::Array(resolved));
            }
        }
        let tree = self.includes_tree()?;
        if !tree.is_empty() {
            spec.set(perry_core::INCLUDES_KEY, tree.to_json());
        }
        let modifiers = self.modifiers_value()?;
        if modifiers.as_object().is_some_and(|map| !map.is_empty()) {
            spec.set("modifiers", modifiers);
        }
        Ok(spec)
    }

    /// Run the query if this instance has not already, returning the
    /// memoized records. Eager-load declarations are resolved right after
    /// the primary fetch, before results are handed back.
    pub fn fetch(&self) -> Result<Vec<Record>> {
        if let Some(records) = self.records.get() {
            return Ok(records.clone());
        }
        let records = self.run_query()?;
        Ok(self.records.get_or_init(|| records).clone())
    }

    fn run_query(&self) -> Result<Vec<Record>> {
        let spec = self.query_spec()?;
        tracing::debug!(model = %self.model.qualified_name(), spec = %spec.to_json(), "running query");
        let rows = self.model.adapter().fetch(&spec)?;
        tracing::trace!(model = %self.model.qualified_name(), rows = rows.len(), "query returned");
        let records: Vec<Record> = rows
            .into_iter()
            .map(|row| self.model.hydrate(row))
            .collect();
        let tree = self.includes_tree()?;
        if !tree.is_empty() {
            Preloader::new(self.modifiers_value()?).preload(&records, &tree)?;
        }
        Ok(records)
    }

    /// All matching records.
    pub fn all(&self) -> Result<Vec<Record>> {
        self.fetch()
    }

    /// All matching records after applying extra finder options.
    pub fn all_with(&self, options: &Json) -> Result<Vec<Record>> {
        self.apply_finder_options(options)?.fetch()
    }

    /// The first matching record, fetched with a limit of one.
    pub fn first(&self) -> Result<Option<Record>> {
        Ok(self.limit(1).fetch()?.into_iter().next())
    }

    /// The first matching record after applying extra finder options.
    pub fn first_with(&self, options: &Json) -> Result<Option<Record>> {
        self.apply_finder_options(options)?.first()
    }

    /// Whether this instance has already materialized its results.
    pub fn loaded(&self) -> bool {
        self.records.get().is_some()
    }
}

fn is_query_option(field: &str) -> bool {
    field == "conditions"
        || SINGULAR_FIELDS.contains(&field)
        || PLURAL_FIELDS.contains(&field)
}

/// Append a clause value; a literal array spreads one level so callers
/// can pass several clauses in one call.
fn push(list: &mut Vec<ClauseValue>, value: ClauseValue) {
    match value {
        ClauseValue::Literal(Json::Array(items)) => {
            list.extend(items.into_iter().map(ClauseValue::Literal));
        }
        other => list.push(other),
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("model", &self.model.qualified_name())
            .field("loaded", &self.loaded())
            .finish_non_exhaustive()
    }
}
