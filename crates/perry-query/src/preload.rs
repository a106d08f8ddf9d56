//! Batch eager loading.
//!
//! Given one level of fetched records and an eager-load tree, the
//! preloader runs one batched query per named association (two for a
//! through association, counting its proxy fetch), partitions the results
//! back to their owners, and stores them in each record's association
//! cache. Nested tree levels ride along on the batched relation's own
//! `includes` clause, so recursion happens inside the inner fetch.
//!
//! The whole level is validated before anything is fetched: an unknown
//! name or an association that cannot be batched fails the preload without
//! issuing a single query.

use crate::association::{canonical_key, AssociationDescriptor, PreloadPlan};
use crate::includes::IncludesTree;
use crate::model::ModelType;
use crate::record::{AssociationValue, Record};
use crate::relation::Relation;
use perry_core::{Error, Json, Result};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

/// One batch-preloading pass over a set of same-typed records.
pub struct Preloader {
    /// Modifiers propagated from the originating relation onto every
    /// association query.
    modifiers: Json,
}

impl Preloader {
    /// Create a preloader carrying the originating relation's modifiers.
    pub fn new(modifiers: Json) -> Self {
        Self { modifiers }
    }

    /// Resolve every association named at this tree level for all records
    /// at once.
    pub fn preload(&self, records: &[Record], tree: &IncludesTree) -> Result<()> {
        if records.is_empty() || tree.is_empty() {
            return Ok(());
        }
        let model = records[0].model().clone();

        for name in tree.names() {
            let descriptor = model
                .association(name)
                .ok_or_else(|| Error::association_not_found(model.name(), name))?;
            if let Some(reason) = descriptor.preload_block_reason() {
                return Err(Error::preload_not_supported(model.name(), name, reason));
            }
        }

        for (name, subtree) in tree.iter() {
            let descriptor = model
                .association(name)
                .cloned()
                .ok_or_else(|| Error::association_not_found(model.name(), name))?;
            self.preload_one(records, &descriptor, subtree)?;
        }
        Ok(())
    }

    fn preload_one(
        &self,
        records: &[Record],
        descriptor: &AssociationDescriptor,
        subtree: &IncludesTree,
    ) -> Result<()> {
        tracing::debug!(
            association = descriptor.name(),
            owners = records.len(),
            "preloading association"
        );
        let Some(plan) = descriptor.preload_plan(records)? else {
            // No usable owner keys: everything resolves empty, no query.
            return self.attach_empty(records, descriptor);
        };

        let mut relation = plan.relation().clone();
        if !subtree.is_empty() {
            relation = relation.includes(subtree.to_json());
        }
        if self.modifiers.as_object().is_some_and(|map| !map.is_empty()) {
            relation = relation.modifiers(self.modifiers.clone());
        }
        let plan = plan.with_relation(relation);

        let rows = plan.relation().fetch()?;
        attach(records, descriptor, &plan, &rows);
        Ok(())
    }

    fn attach_empty(&self, records: &[Record], descriptor: &AssociationDescriptor) -> Result<()> {
        let model = records[0].model().clone();
        let target = descriptor.resolved_target(&model)?;
        for owner in records {
            store(owner, descriptor, &target, Vec::new());
        }
        Ok(())
    }
}

fn attach(
    records: &[Record],
    descriptor: &AssociationDescriptor,
    plan: &PreloadPlan,
    rows: &[Record],
) {
    let target = plan.relation().model().clone();
    match plan {
        PreloadPlan::Direct {
            owner_key,
            row_key,
            type_guard,
            ..
        } => {
            let index = index_rows(rows, row_key, type_guard.as_ref());
            for owner in records {
                let matched = owner
                    .attribute(owner_key)
                    .filter(|value| !value.is_null())
                    .and_then(|value| index.get(&canonical_key(value)))
                    .cloned()
                    .unwrap_or_default();
                store(owner, descriptor, &target, matched);
            }
        }
        PreloadPlan::Through {
            row_key,
            owner_key,
            links,
            type_guard,
            ..
        } => {
            let index = index_rows(rows, row_key, type_guard.as_ref());
            for owner in records {
                let mut matched = Vec::new();
                if let Some(value) = owner.attribute(owner_key).filter(|value| !value.is_null()) {
                    if let Some(keys) = links.get(&canonical_key(value)) {
                        for key in keys {
                            if let Some(found) = index.get(key) {
                                matched.extend(found.iter().cloned());
                            }
                        }
                    }
                }
                store(owner, descriptor, &target, matched);
            }
        }
    }
}

fn store(
    owner: &Record,
    descriptor: &AssociationDescriptor,
    target: &Arc<ModelType>,
    matched: Vec<Record>,
) {
    let value = if descriptor.is_collection() {
        AssociationValue::Many(Rc::new(Relation::preloaded(target.clone(), matched)))
    } else {
        AssociationValue::One(matched.into_iter().next())
    };
    owner.store_association(descriptor.name(), value);
}

fn index_rows(
    rows: &[Record],
    key: &str,
    type_guard: Option<&(String, String)>,
) -> BTreeMap<String, Vec<Record>> {
    let mut index: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for row in rows {
        // Rows on a polymorphic interface attach only when their type tag
        // names the owning type; adapters are not trusted to filter.
        if let Some((tag_key, expected)) = type_guard {
            if row.attribute(tag_key).and_then(Json::as_str) != Some(expected.as_str()) {
                continue;
            }
        }
        if let Some(value) = row.attribute(key).filter(|value| !value.is_null()) {
            index.entry(canonical_key(value)).or_default().push(row.clone());
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;
    use perry_core::{Attributes, Fetch, QuerySpec};
    use serde_json::json;
    use std::cell::RefCell;

    struct CannedAdapter {
        rows: Vec<Json>,
        log: Rc<RefCell<Vec<Json>>>,
    }

    impl Fetch for CannedAdapter {
        fn fetch(&self, spec: &QuerySpec) -> Result<Vec<Attributes>> {
            self.log.borrow_mut().push(spec.to_json());
            Ok(self
                .rows
                .iter()
                .filter_map(|row| row.as_object().cloned())
                .collect())
        }
    }

    fn canned(rows: Vec<Json>, log: &Rc<RefCell<Vec<Json>>>) -> Arc<dyn Fetch> {
        Arc::new(CannedAdapter {
            rows,
            log: log.clone(),
        })
    }

    fn hydrate_all(model: &Arc<ModelType>, rows: &[Json]) -> Vec<Record> {
        rows.iter()
            .filter_map(|row| row.as_object().cloned())
            .map(|row| model.hydrate(row))
            .collect()
    }

    #[test]
    fn test_has_many_level_uses_one_query() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = ModelRegistry::new();
        let site = registry
            .register(
                ModelType::builder("Site")
                    .adapter(canned(vec![], &log))
                    .association(
                        AssociationDescriptor::has_many("articles").class_name("Article"),
                    ),
            )
            .unwrap();
        registry
            .register(
                ModelType::builder("Article").adapter(canned(
                    vec![
                        json!({"id": 10, "site_id": 1}),
                        json!({"id": 11, "site_id": 2}),
                        json!({"id": 12, "site_id": 1}),
                    ],
                    &log,
                )),
            )
            .unwrap();

        let owners = hydrate_all(&site, &[json!({"id": 1}), json!({"id": 2})]);
        let mut tree = IncludesTree::new();
        tree.merge_json(&json!("articles"));
        Preloader::new(json!({}))
            .preload(&owners, &tree)
            .unwrap();

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(
            log.borrow()[0].get("where"),
            Some(&json!([{"site_id": [1, 2]}]))
        );

        let first = owners[0].many("articles").unwrap().fetch().unwrap();
        let ids: Vec<_> = first
            .iter()
            .map(|record| record.attribute("id").cloned())
            .collect();
        assert_eq!(ids, vec![Some(json!(10)), Some(json!(12))]);
        // Reading the preloaded relation never touched the adapter again.
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_missing_owner_keys_attach_empty_without_query() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = ModelRegistry::new();
        let site = registry
            .register(
                ModelType::builder("Site")
                    .adapter(canned(vec![], &log))
                    .association(
                        AssociationDescriptor::has_many("articles").class_name("Article"),
                    ),
            )
            .unwrap();
        registry
            .register(ModelType::builder("Article").adapter(canned(vec![], &log)))
            .unwrap();

        let owners = hydrate_all(&site, &[json!({"name": "keyless"})]);
        let mut tree = IncludesTree::new();
        tree.merge_json(&json!("articles"));
        Preloader::new(json!({})).preload(&owners, &tree).unwrap();

        assert!(log.borrow().is_empty());
        assert!(owners[0].association_loaded("articles"));
        assert!(owners[0].many("articles").unwrap().fetch().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_name_fails_before_any_fetch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = ModelRegistry::new();
        let site = registry
            .register(
                ModelType::builder("Site")
                    .adapter(canned(vec![], &log))
                    .association(
                        AssociationDescriptor::has_many("articles").class_name("Article"),
                    ),
            )
            .unwrap();
        registry
            .register(ModelType::builder("Article").adapter(canned(vec![], &log)))
            .unwrap();

        let owners = hydrate_all(&site, &[json!({"id": 1})]);
        let mut tree = IncludesTree::new();
        tree.merge_json(&json!(["articles", "ghosts"]));
        let err = Preloader::new(json!({})).preload(&owners, &tree).unwrap_err();
        assert!(err.is_association_not_found());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_polymorphic_belongs_to_is_rejected() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = ModelRegistry::new();
        let comment = registry
            .register(
                ModelType::builder("Comment")
                    .adapter(canned(vec![], &log))
                    .association(AssociationDescriptor::belongs_to("parent").polymorphic()),
            )
            .unwrap();

        let owners = hydrate_all(&comment, &[json!({"id": 1, "parent_id": 2})]);
        let mut tree = IncludesTree::new();
        tree.merge_json(&json!("parent"));
        let err = Preloader::new(json!({})).preload(&owners, &tree).unwrap_err();
        assert!(err.is_preload_not_supported());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_modifiers_ride_along_on_association_queries() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = ModelRegistry::new();
        let site = registry
            .register(
                ModelType::builder("Site")
                    .adapter(canned(vec![], &log))
                    .association(
                        AssociationDescriptor::has_many("articles").class_name("Article"),
                    ),
            )
            .unwrap();
        registry
            .register(ModelType::builder("Article").adapter(canned(vec![], &log)))
            .unwrap();

        let owners = hydrate_all(&site, &[json!({"id": 1})]);
        let mut tree = IncludesTree::new();
        tree.merge_json(&json!("articles"));
        Preloader::new(json!({"fresh": true}))
            .preload(&owners, &tree)
            .unwrap();

        assert_eq!(
            log.borrow()[0].get("modifiers"),
            Some(&json!({"fresh": true}))
        );
    }
}
