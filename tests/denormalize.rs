//! End-to-end denormalization: extraction, filtering, transforms and walks

mod common;

use common::{
    group, media_registry, poms, program, segment, start, target_of, test_config, FlakySink, PROGRAM_TARGET,
    SEGMENT_TARGET,
};
use degraph::{
    Direction, MemoryIndexSink, NodeId, ReduceSpec, RuleDescriptor, RuleError, RuleRegistry, TypeKey, WalkSpec,
};
use serde_json::{json, Value};
use std::sync::Arc;

// === Scenario: program with series ===

#[tokio::test]
async fn program_is_transformed_and_indexed() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = program(1, "Tegenlicht", &[]);
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;

    let indexed = sink.get(&target_of(&id, PROGRAM_TARGET)).expect("program indexed");
    assert_eq!(indexed["title"], json!("Tegenlicht"));
    assert_eq!(indexed["subTitle"], json!("Tegenlicht"));
    assert_eq!(indexed["description"], json!(""));
    assert_eq!(indexed["programId"], json!("urn:vpro:media:program:1"));
    assert_eq!(indexed["publishDate"], json!(50));
    assert_eq!(indexed["duration"], json!(1800));
    assert_eq!(indexed["programTitles"], json!([]));
    assert!(!sink.contains(&target_of(&id, SEGMENT_TARGET)));
}

#[tokio::test]
async fn published_series_titles_skip_dangling_and_unpublished_groups() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (foo, foo_doc) = group("series-foo", "SERIES", "PUBLISHED", "Foo");
    let (bar, bar_doc) = group("series-bar", "SERIES", "DELETED", "Bar");
    engine.upsert(foo, foo_doc).unwrap();
    engine.upsert(bar, bar_doc).unwrap();
    engine.drain().await;

    let (id, doc) = program(2, "Zomergasten", &["series-missing", "series-foo", "series-bar"]);
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;

    let indexed = sink.get(&target_of(&id, PROGRAM_TARGET)).unwrap();
    assert_eq!(indexed["programTitles"], json!(["Foo"]));
    assert_eq!(engine.stats().dangling, 1);
}

#[tokio::test]
async fn series_arriving_later_fills_in_titles() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = program(3, "Argos", &["series-late"]);
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;
    assert_eq!(sink.get(&target_of(&id, PROGRAM_TARGET)).unwrap()["programTitles"], json!([]));

    let (series, series_doc) = group("series-late", "SERIES", "PUBLISHED", "Late");
    engine.upsert(series, series_doc).unwrap();
    engine.drain().await;

    assert_eq!(sink.get(&target_of(&id, PROGRAM_TARGET)).unwrap()["programTitles"], json!(["Late"]));
}

// === Scenario: filter ===

#[tokio::test]
async fn filtered_document_never_reaches_the_sink() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, mut doc) = program(4, "Offline", &[]);
    doc["locations"] = json!([]);
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;

    assert!(!sink.contains(&target_of(&id, PROGRAM_TARGET)));
    assert!(engine.documents().contains(&id));
}

#[tokio::test]
async fn document_failing_filter_after_update_is_retracted() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = program(5, "Online", &[]);
    engine.upsert(id.clone(), doc.clone()).unwrap();
    engine.drain().await;
    assert!(sink.contains(&target_of(&id, PROGRAM_TARGET)));

    let mut offline = doc;
    offline["locations"] = json!([]);
    engine.upsert(id.clone(), offline).unwrap();
    engine.drain().await;
    assert!(!sink.contains(&target_of(&id, PROGRAM_TARGET)));
}

// === Scenario: idempotent re-extraction ===

#[tokio::test]
async fn re_extracting_unchanged_document_keeps_edge_set() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = program(6, "Twice", &["series-a", "series-b"]);
    engine.upsert(id.clone(), doc.clone()).unwrap();
    engine.drain().await;
    let first = engine.graph().owned_edges(&id).unwrap();
    let edge_count = engine.graph().edge_count().unwrap();

    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;
    let second = engine.graph().owned_edges(&id).unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.graph().edge_count().unwrap(), edge_count);
    assert_eq!(edge_count, 2);
}

#[tokio::test]
async fn re_extraction_replaces_stale_edges() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = program(7, "Moves", &["series-a"]);
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;

    let (_, moved) = program(7, "Moves", &["series-b"]);
    engine.upsert(id.clone(), moved).unwrap();
    engine.drain().await;

    let edges = engine.graph().owned_edges(&id).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, poms("series-b"));
    assert!(engine.graph().edges(&poms("series-a"), Direction::In).unwrap().is_empty());
}

// === Scenario: cyclic groups ===

fn ancestry_rule() -> RuleDescriptor {
    RuleDescriptor::new(TypeKey::new("groups", "group"), TypeKey::new("groups-target", "group"))
        .with_extract(|doc, builder| {
            for parent in doc["parents"].as_array().into_iter().flatten() {
                if let Some(parent) = parent.as_str() {
                    builder.add_edge_to("descendantOf", parent, None);
                }
            }
            Ok(())
        })
        .with_walk(
            "ancestors",
            WalkSpec::new(Direction::Out).with_property("tree", ReduceSpec::new(|t| Ok(t.to_json())).nested()),
        )
}

#[tokio::test]
async fn mutually_descendant_groups_terminate() {
    let sink = Arc::new(MemoryIndexSink::new());
    let registry = RuleRegistry::from_rules([ancestry_rule()]).unwrap();
    let engine = start(registry, sink.clone(), test_config());

    let a = NodeId::new("groups", "group", "a");
    let b = NodeId::new("groups", "group", "b");
    engine.upsert(a.clone(), json!({"name": "a", "parents": ["b"]})).unwrap();
    engine.drain().await;
    engine.upsert(b.clone(), json!({"name": "b", "parents": ["a"]})).unwrap();
    engine.drain().await;

    let target = a.retarget(&TypeKey::new("groups-target", "group"));
    let indexed = sink.get(&target).unwrap();
    let tree = &indexed["tree"];
    assert_eq!(tree["_children"][0]["_id"], json!("b"));
    assert_eq!(tree["_children"][0]["_children"][0]["_id"], json!("a"));
    assert_eq!(tree["_children"][0]["_children"][0]["_children"], json!([]));
    assert!(engine.stats().cycles_truncated >= 1);
}

// === Scenario: rule failures ===

fn fragile_rule() -> RuleDescriptor {
    RuleDescriptor::new(TypeKey::new("poms", "poms"), TypeKey::new("fragile-target", "poms"))
        .with_extract(|doc, builder| {
            if let Some(other) = doc["link"].as_str() {
                builder.add_edge_to("linksTo", other, None);
            }
            Ok(())
        })
        .with_transform(|doc| {
            if doc["explode"] == json!(true) {
                return Err(RuleError::failed("transform exploded"));
            }
            Ok(json!({"link": doc["link"].clone()}))
        })
}

#[tokio::test]
async fn failing_transform_leaves_graph_unchanged() {
    let sink = Arc::new(MemoryIndexSink::new());
    let registry = RuleRegistry::from_rules([fragile_rule()]).unwrap();
    let engine = start(registry, sink.clone(), test_config());

    let id = poms("fragile");
    engine.upsert(id.clone(), json!({"link": "x"})).unwrap();
    engine.drain().await;

    engine.upsert(id.clone(), json!({"link": "y", "explode": true})).unwrap();
    engine.drain().await;

    let edges = engine.graph().owned_edges(&id).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, poms("x"));

    let target = id.retarget(&TypeKey::new("fragile-target", "poms"));
    assert_eq!(sink.get(&target).unwrap()["link"], json!("x"));

    let dead = engine.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
    assert_eq!(dead[0].attempts, 3);
    assert!(dead[0].reason.contains("transform exploded"));
    assert_eq!(engine.stats().retries, 2);
}

#[tokio::test]
async fn failing_reduce_omits_only_that_property() {
    let rule = RuleDescriptor::new(TypeKey::new("poms", "poms"), TypeKey::new("partial-target", "poms")).with_walk(
        "w",
        WalkSpec::new(Direction::In)
            .with_property("ok", ReduceSpec::new(|t| Ok(Value::from(t.children().len()))))
            .with_property("broken", ReduceSpec::new(|_| Err(RuleError::failed("bad reduce")))),
    );
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(RuleRegistry::from_rules([rule]).unwrap(), sink.clone(), test_config());

    let id = poms("partial");
    engine.upsert(id.clone(), json!({"title": "t"})).unwrap();
    engine.drain().await;

    let doc = sink.get(&id.retarget(&TypeKey::new("partial-target", "poms"))).unwrap();
    assert_eq!(doc["ok"], json!(0));
    assert_eq!(doc["title"], json!("t"));
    assert!(doc.get("broken").is_none());
    assert_eq!(engine.stats().reduce_failures, 1);
    assert!(engine.dead_letters().is_empty());
}

// === Scenario: sink failures ===

#[tokio::test]
async fn sink_failures_are_retried_until_success() {
    let sink = Arc::new(FlakySink::failing(2));
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = program(8, "Retry", &[]);
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;

    assert!(sink.inner.contains(&target_of(&id, PROGRAM_TARGET)));
    assert_eq!(sink.attempts(), 3);
    assert_eq!(engine.stats().retries, 2);
    assert!(engine.dead_letters().is_empty());
}

#[tokio::test]
async fn persistent_sink_failure_is_dead_lettered() {
    let sink = Arc::new(FlakySink::always_failing());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = program(9, "Down", &[]);
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;

    assert!(sink.inner.is_empty());
    let dead = engine.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job, "upsert");
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(engine.stats().dead_lettered, 1);
}

#[tokio::test]
async fn segment_rule_targets_its_own_index() {
    let sink = Arc::new(MemoryIndexSink::new());
    let engine = start(media_registry(), sink.clone(), test_config());

    let (id, doc) = segment(1, "urn:vpro:media:program:404");
    engine.upsert(id.clone(), doc).unwrap();
    engine.drain().await;

    let indexed = sink.get(&target_of(&id, SEGMENT_TARGET)).unwrap();
    assert_eq!(indexed["segmentId"], json!("urn:vpro:media:segment:1"));
    assert_eq!(indexed["program"], json!({}));
    assert_eq!(indexed["publishDate"], Value::Null);
}
