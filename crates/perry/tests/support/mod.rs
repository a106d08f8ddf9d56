//! Shared fixtures: an in-memory adapter that logs every query it
//! receives, and a small blog schema exercising every association shape.
//!
//! The adapter answers each query with its full canned table; all
//! filtering assertions therefore check the specs the engine *sent*, and
//! partitioning assertions check what the engine did with the rows.

// Not every test binary touches every helper here.
#![allow(dead_code)]

use perry::AssociationDescriptor;
use perry::{Attributes, Fetch, Json, ModelRegistry, ModelType, QuerySpec, Result};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Every query issued during a test: (model name, materialized spec).
pub type CallLog = Rc<RefCell<Vec<(String, Json)>>>;

pub struct TestAdapter {
    model: String,
    rows: Vec<Json>,
    log: CallLog,
}

impl Fetch for TestAdapter {
    fn fetch(&self, spec: &QuerySpec) -> Result<Vec<Attributes>> {
        self.log
            .borrow_mut()
            .push((self.model.clone(), spec.to_json()));
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.as_object().cloned())
            .collect())
    }
}

pub fn adapter(model: &str, rows: Vec<Json>, log: &CallLog) -> Arc<dyn Fetch> {
    Arc::new(TestAdapter {
        model: model.to_string(),
        rows,
        log: log.clone(),
    })
}

/// Specs sent to one model's adapter, in order.
pub fn specs_for(log: &CallLog, model: &str) -> Vec<Json> {
    log.borrow()
        .iter()
        .filter(|(name, _)| name == model)
        .map(|(_, spec)| spec.clone())
        .collect()
}

pub fn total_queries(log: &CallLog) -> usize {
    log.borrow().len()
}

pub struct Blog {
    pub registry: ModelRegistry,
    pub log: CallLog,
    pub site: Arc<ModelType>,
    pub article: Arc<ModelType>,
    pub comment: Arc<ModelType>,
    pub person: Arc<ModelType>,
}

/// Three sites, three articles, three comments, two people.
///
/// - `Site` has many `articles`, plus `comments` and `authors` resolved
///   through them.
/// - `Article.comments` hangs off the polymorphic `parent` interface.
/// - `Comment.parent` is a polymorphic belongs-to.
/// - `Person.commented_articles` goes through `comments` with the
///   polymorphic `parent` source pinned to `Article`; `commented_things`
///   is the same chain with no source type pinned.
pub fn blog() -> Blog {
    let log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let registry = ModelRegistry::new();

    let site = registry
        .register(
            ModelType::builder("Site")
                .adapter(adapter(
                    "Site",
                    vec![
                        json!({"id": 1, "name": "main"}),
                        json!({"id": 2, "name": "alt"}),
                        json!({"id": 3, "name": "empty"}),
                    ],
                    &log,
                ))
                .association(AssociationDescriptor::has_many("articles").class_name("Article"))
                .association(
                    AssociationDescriptor::has_many("comments")
                        .through("articles")
                        .source("comments"),
                )
                .association(
                    AssociationDescriptor::has_many("authors")
                        .through("articles")
                        .source("author"),
                ),
        )
        .expect("register Site");

    let article = registry
        .register(
            ModelType::builder("Article")
                .adapter(adapter(
                    "Article",
                    vec![
                        json!({"id": 10, "site_id": 1, "author_id": 100}),
                        json!({"id": 11, "site_id": 2, "author_id": 101}),
                        json!({"id": 12, "site_id": 1, "author_id": 100}),
                    ],
                    &log,
                ))
                .association(AssociationDescriptor::belongs_to("site").class_name("Site"))
                .association(AssociationDescriptor::belongs_to("author").class_name("Person"))
                .association(
                    AssociationDescriptor::has_many("comments")
                        .class_name("Comment")
                        .as_interface("parent"),
                ),
        )
        .expect("register Article");

    let comment = registry
        .register(
            ModelType::builder("Comment")
                .adapter(adapter(
                    "Comment",
                    vec![
                        json!({"id": 20, "parent_id": 10, "parent_type": "Article", "person_id": 100}),
                        json!({"id": 21, "parent_id": 10, "parent_type": "Article", "person_id": 101}),
                        json!({"id": 22, "parent_id": 11, "parent_type": "Article", "person_id": 100}),
                    ],
                    &log,
                ))
                .association(AssociationDescriptor::belongs_to("parent").polymorphic())
                .association(
                    AssociationDescriptor::belongs_to("author")
                        .class_name("Person")
                        .foreign_key("person_id"),
                ),
        )
        .expect("register Comment");

    let person = registry
        .register(
            ModelType::builder("Person")
                .adapter(adapter(
                    "Person",
                    vec![
                        json!({"id": 100, "name": "ann"}),
                        json!({"id": 101, "name": "bo"}),
                    ],
                    &log,
                ))
                .association(
                    AssociationDescriptor::has_many("comments")
                        .class_name("Comment")
                        .foreign_key("person_id"),
                )
                .association(
                    AssociationDescriptor::has_many("commented_articles")
                        .through("comments")
                        .source("parent")
                        .source_type("Article"),
                )
                .association(
                    AssociationDescriptor::has_many("commented_things")
                        .through("comments")
                        .source("parent"),
                ),
        )
        .expect("register Person");

    Blog {
        registry,
        log,
        site,
        article,
        comment,
        person,
    }
}
