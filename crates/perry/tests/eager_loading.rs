//! Batch eager loading through a relation's `includes` clause.

mod support;

use perry::{AssociationDescriptor, ClauseValue, ModelRegistry, ModelType};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use support::{adapter, blog, specs_for, total_queries, CallLog};

#[test]
fn test_one_extra_query_per_included_association() {
    let fixture = blog();
    let sites = fixture
        .site
        .scoped()
        .unwrap()
        .includes(json!("articles"))
        .all()
        .unwrap();

    assert_eq!(total_queries(&fixture.log), 2);
    let article_specs = specs_for(&fixture.log, "Article");
    assert_eq!(
        article_specs[0].get("where"),
        Some(&json!([{"site_id": [1, 2, 3]}]))
    );

    // Results are partitioned back to their owners; reading them is free.
    let ids = |records: Vec<perry::Record>| -> Vec<serde_json::Value> {
        records
            .iter()
            .filter_map(|record| record.attribute("id").cloned())
            .collect()
    };
    assert_eq!(
        ids(sites[0].many("articles").unwrap().fetch().unwrap()),
        vec![json!(10), json!(12)]
    );
    assert_eq!(
        ids(sites[1].many("articles").unwrap().fetch().unwrap()),
        vec![json!(11)]
    );
    assert!(sites[2].many("articles").unwrap().fetch().unwrap().is_empty());
    assert_eq!(total_queries(&fixture.log), 2);
}

#[test]
fn test_nested_and_through_includes_query_counts() {
    let fixture = blog();
    let sites = fixture
        .site
        .scoped()
        .unwrap()
        .includes(json!(["comments", {"articles": "comments"}]))
        .all()
        .unwrap();

    // One query for the sites, one for the batched articles, one for the
    // articles' nested comments, and two (proxy plus source) for the
    // sites' through comments.
    assert_eq!(total_queries(&fixture.log), 5);
    assert_eq!(specs_for(&fixture.log, "Site").len(), 1);
    assert_eq!(specs_for(&fixture.log, "Article").len(), 2);
    assert_eq!(specs_for(&fixture.log, "Comment").len(), 2);

    // Every level is attached: nothing below issues further queries.
    let articles = sites[0].many("articles").unwrap().fetch().unwrap();
    let nested = articles[0].many("comments").unwrap().fetch().unwrap();
    assert_eq!(nested.len(), 2);
    let through = sites[0].many("comments").unwrap().fetch().unwrap();
    assert_eq!(
        through
            .iter()
            .filter_map(|record| record.attribute("id").cloned())
            .collect::<Vec<_>>(),
        vec![json!(20), json!(21)]
    );
    assert_eq!(total_queries(&fixture.log), 5);
}

#[test]
fn test_through_preload_partitions_by_proxy_links() {
    let fixture = blog();
    let sites = fixture
        .site
        .scoped()
        .unwrap()
        .includes(json!("comments"))
        .all()
        .unwrap();

    let comment_specs = specs_for(&fixture.log, "Comment");
    assert_eq!(
        comment_specs[0].get("where"),
        Some(&json!([{"parent_id": [10, 11, 12]}, {"parent_type": "Article"}]))
    );

    let ids = |index: usize| -> Vec<serde_json::Value> {
        sites[index]
            .many("comments")
            .unwrap()
            .fetch()
            .unwrap()
            .iter()
            .filter_map(|record| record.attribute("id").cloned())
            .collect()
    };
    assert_eq!(ids(0), vec![json!(20), json!(21)]);
    assert_eq!(ids(1), vec![json!(22)]);
    assert!(ids(2).is_empty());
}

#[test]
fn test_modifiers_propagate_to_association_queries() {
    let fixture = blog();
    fixture
        .site
        .scoped()
        .unwrap()
        .includes(json!("articles"))
        .modifiers(json!({"tenant": "acme"}))
        .all()
        .unwrap();

    let article_specs = specs_for(&fixture.log, "Article");
    assert_eq!(
        article_specs[0].get("modifiers"),
        Some(&json!({"tenant": "acme"}))
    );
}

#[test]
fn test_deferred_includes_resolve_once_and_still_preload() {
    let fixture = blog();
    let calls = Rc::new(RefCell::new(0));
    let counter = calls.clone();
    let sites = fixture
        .site
        .scoped()
        .unwrap()
        .includes(ClauseValue::deferred(move || {
            *counter.borrow_mut() += 1;
            Ok(json!("articles"))
        }))
        .all()
        .unwrap();

    assert_eq!(*calls.borrow(), 1);
    assert_eq!(total_queries(&fixture.log), 2);
    assert!(sites[0].association_loaded("articles"));
}

#[test]
fn test_repeated_includes_deep_merge() {
    let fixture = blog();
    let relation = fixture
        .site
        .scoped()
        .unwrap()
        .includes(json!("articles"))
        .includes(json!({"articles": "comments"}));
    let spec = relation.query_spec().unwrap();
    assert_eq!(
        spec.get("includes"),
        Some(&json!({"articles": {"comments": {}}}))
    );
}

#[test]
fn test_including_an_unknown_association_fails() {
    let fixture = blog();
    let err = fixture
        .site
        .scoped()
        .unwrap()
        .includes(json!("ghosts"))
        .all()
        .unwrap_err();
    assert!(err.is_association_not_found());
    // Only the primary fetch ran; the preload level never queried.
    assert_eq!(total_queries(&fixture.log), 1);
}

#[test]
fn test_including_a_polymorphic_belongs_to_fails() {
    let fixture = blog();
    let err = fixture
        .comment
        .scoped()
        .unwrap()
        .includes(json!("parent"))
        .all()
        .unwrap_err();
    assert!(err.is_preload_not_supported());
    assert_eq!(total_queries(&fixture.log), 1);
}

#[test]
fn test_empty_batch_preloads_nothing() {
    let log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let registry = ModelRegistry::new();
    let site = registry
        .register(
            ModelType::builder("Site")
                .adapter(adapter("Site", vec![], &log))
                .association(AssociationDescriptor::has_many("articles").class_name("Article")),
        )
        .unwrap();
    registry
        .register(ModelType::builder("Article").adapter(adapter("Article", vec![], &log)))
        .unwrap();

    let sites = site
        .scoped()
        .unwrap()
        .includes(json!("articles"))
        .all()
        .unwrap();
    assert!(sites.is_empty());
    // Only the primary fetch ran.
    assert_eq!(total_queries(&log), 1);
}

#[test]
fn test_partitioning_checks_the_polymorphic_type_tag() {
    let log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let registry = ModelRegistry::new();
    let article = registry
        .register(
            ModelType::builder("Article")
                .adapter(adapter("Article", vec![json!({"id": 10})], &log))
                .association(
                    AssociationDescriptor::has_many("comments")
                        .class_name("Comment")
                        .as_interface("parent"),
                ),
        )
        .unwrap();
    // The adapter answers with a row for a different interface type too;
    // it must not attach even though its parent_id matches.
    registry
        .register(ModelType::builder("Comment").adapter(adapter(
            "Comment",
            vec![
                json!({"id": 20, "parent_id": 10, "parent_type": "Article"}),
                json!({"id": 21, "parent_id": 10, "parent_type": "Site"}),
            ],
            &log,
        )))
        .unwrap();

    let articles = article
        .scoped()
        .unwrap()
        .includes(json!("comments"))
        .all()
        .unwrap();
    let comments = articles[0].many("comments").unwrap().fetch().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].attribute("id"), Some(&json!(20)));
}

#[test]
fn test_deferred_finder_options_block_preloading_only() {
    let log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let registry = ModelRegistry::new();
    let site = registry
        .register(
            ModelType::builder("Site")
                .adapter(adapter("Site", vec![json!({"id": 1})], &log))
                .association(
                    AssociationDescriptor::has_many("articles")
                        .class_name("Article")
                        .options(ClauseValue::deferred(|| Ok(json!({"limit": 1})))),
                ),
        )
        .unwrap();
    registry
        .register(ModelType::builder("Article").adapter(adapter(
            "Article",
            vec![json!({"id": 10, "site_id": 1})],
            &log,
        )))
        .unwrap();

    let err = site
        .scoped()
        .unwrap()
        .includes(json!("articles"))
        .all()
        .unwrap_err();
    assert!(err.is_preload_not_supported());
    assert_eq!(total_queries(&log), 1);

    // Per-record resolution still works: the options resolve one owner at
    // a time.
    let record = site.scoped().unwrap().first().unwrap().unwrap();
    log.borrow_mut().clear();
    record.many("articles").unwrap().fetch().unwrap();
    let specs = specs_for(&log, "Article");
    assert_eq!(specs[0].get("limit"), Some(&json!(1)));
    assert_eq!(specs[0].get("where"), Some(&json!([{"site_id": 1}])));
}

#[test]
fn test_singular_associations_preload_too() {
    let fixture = blog();
    let comments = fixture
        .comment
        .scoped()
        .unwrap()
        .includes(json!("author"))
        .all()
        .unwrap();

    assert_eq!(total_queries(&fixture.log), 2);
    let person_specs = specs_for(&fixture.log, "Person");
    assert_eq!(
        person_specs[0].get("where"),
        Some(&json!([{"id": [100, 101]}]))
    );
    let author = comments[0].one("author").unwrap().unwrap();
    assert_eq!(author.attribute("name"), Some(&json!("ann")));
    assert_eq!(total_queries(&fixture.log), 2);
}
