//! Program and segment rules for a `poms/poms` media index

use degraph::rules::resolve::{best_value, publish_date};
use degraph::{Direction, NodeId, ReduceSpec, RuleDescriptor, RuleRegistry, TypeKey, WalkSpec};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const PROGRAM_TARGET: (&str, &str) = ("woord-target", "program");
pub const SEGMENT_TARGET: (&str, &str) = ("woord-target", "segment");

const PROGRAM_PREFIX: &str = "urn:vpro:media:program:";
const SEGMENT_PREFIX: &str = "urn:vpro:media:segment:";

fn urn_has_prefix(doc: &Value, prefix: &str) -> bool {
    doc["urn"].as_str().is_some_and(|urn| urn.starts_with(prefix))
}

fn copy_fields(doc: &Value, fields: &[&str], out: &mut Map<String, Value>) {
    for field in fields {
        if let Some(value) = doc.get(*field).filter(|v| !v.is_null()) {
            out.insert(field.to_string(), value.clone());
        }
    }
}

pub fn program_rule() -> RuleDescriptor {
    RuleDescriptor::new(TypeKey::new("poms", "poms"), TypeKey::new(PROGRAM_TARGET.0, PROGRAM_TARGET.1))
        .with_filter(|doc| {
            urn_has_prefix(doc, PROGRAM_PREFIX) && doc["locations"].as_array().is_some_and(|l| !l.is_empty())
        })
        .with_extract(|doc, builder| {
            if !urn_has_prefix(doc, PROGRAM_PREFIX) {
                return Ok(());
            }
            for group in doc["episodeOf"].as_array().into_iter().flatten() {
                if let Some(series) = group["urnRef"].as_str() {
                    builder.add_edge("episodeOf", "poms", "poms", series, false, Map::new());
                }
            }
            Ok(())
        })
        .with_transform(|doc| {
            let mut out = Map::new();
            copy_fields(doc, &["tags", "genres", "broadcasters", "duration"], &mut out);
            out.insert("title".into(), best_value(doc, "titles", "MAIN"));
            out.insert("subTitle".into(), best_value(doc, "titles", "SUB"));
            out.insert("description".into(), best_value(doc, "descriptions", "MAIN"));
            out.insert("programId".into(), doc["urn"].clone());
            out.insert("publishDate".into(), publish_date(doc));
            Ok(Value::Object(out))
        })
        .with_walk(
            "published-series-titles",
            WalkSpec::new(Direction::Out).with_property(
                "programTitles",
                ReduceSpec::new(|tree| {
                    let titles = tree
                        .existing_children()
                        .iter()
                        .filter_map(|child| child.value())
                        .filter(|group| group["type"] == "SERIES" && group["workflow"] == "PUBLISHED")
                        .map(|group| best_value(group, "titles", "MAIN"))
                        .collect();
                    Ok(Value::Array(titles))
                }),
            ),
        )
}

pub fn segment_rule() -> RuleDescriptor {
    RuleDescriptor::new(TypeKey::new("poms", "poms"), TypeKey::new(SEGMENT_TARGET.0, SEGMENT_TARGET.1))
        .with_filter(|doc| urn_has_prefix(doc, SEGMENT_PREFIX))
        .with_extract(|doc, builder| {
            if urn_has_prefix(doc, SEGMENT_PREFIX) {
                if let Some(program) = doc["urnRef"].as_str() {
                    builder.add_edge_to("segmentOf", program, None);
                }
            }
            Ok(())
        })
        .with_transform(|doc| {
            let mut out = Map::new();
            copy_fields(doc, &["tags", "genres", "broadcasters", "duration", "start"], &mut out);
            out.insert("title".into(), best_value(doc, "titles", "MAIN"));
            out.insert("segmentId".into(), doc["urn"].clone());
            Ok(Value::Object(out))
        })
        .with_walk(
            "program-info",
            WalkSpec::new(Direction::Out)
                .with_property(
                    "program",
                    ReduceSpec::new(|tree| {
                        let mut info = Map::new();
                        if let Some(program) = tree.existing_children().first().and_then(|c| c.value()) {
                            info.insert("title".into(), best_value(program, "titles", "MAIN"));
                            info.insert("subTitle".into(), best_value(program, "titles", "SUB"));
                            info.insert("id".into(), program["urn"].clone());
                            info.insert("duration".into(), program["duration"].clone());
                            info.insert("publishDate".into(), publish_date(program));
                        }
                        Ok(Value::Object(info))
                    }),
                )
                .with_property(
                    "publishDate",
                    ReduceSpec::new(|tree| {
                        Ok(tree
                            .existing_children()
                            .first()
                            .and_then(|c| c.value())
                            .map(publish_date)
                            .unwrap_or(Value::Null))
                    }),
                ),
        )
}

/// Segment rule whose program reducer blocks for `delay`, keeping a run
/// inside its reduce step long enough for other changes to land.
pub fn slow_segment_rule(delay: Duration) -> RuleDescriptor {
    RuleDescriptor::new(TypeKey::new("poms", "poms"), TypeKey::new(SEGMENT_TARGET.0, SEGMENT_TARGET.1))
        .with_filter(|doc| urn_has_prefix(doc, SEGMENT_PREFIX))
        .with_extract(|doc, builder| {
            if let Some(program) = doc["urnRef"].as_str() {
                builder.add_edge_to("segmentOf", program, None);
            }
            Ok(())
        })
        .with_transform(|doc| {
            let mut out = Map::new();
            out.insert("title".into(), best_value(doc, "titles", "MAIN"));
            Ok(Value::Object(out))
        })
        .with_walk(
            "program-info",
            WalkSpec::new(Direction::Out).with_property(
                "program",
                ReduceSpec::new(move |tree| {
                    std::thread::sleep(delay);
                    let mut info = Map::new();
                    if let Some(program) = tree.existing_children().first().and_then(|c| c.value()) {
                        info.insert("title".into(), best_value(program, "titles", "MAIN"));
                    }
                    Ok(Value::Object(info))
                }),
            ),
        )
}

pub fn slow_segment_registry(delay: Duration) -> RuleRegistry {
    RuleRegistry::from_rules([slow_segment_rule(delay)]).expect("single rule")
}

pub fn media_registry() -> RuleRegistry {
    RuleRegistry::from_rules([program_rule(), segment_rule()]).expect("media rules are distinct")
}

/// A program that passes the program filter
pub fn program(number: u32, title: &str, series: &[&str]) -> (NodeId, Value) {
    let urn = format!("{}{}", PROGRAM_PREFIX, number);
    let episode_of: Vec<Value> = series.iter().map(|s| json!({"urnRef": s})).collect();
    let doc = json!({
        "urn": urn,
        "locations": [{"programUrl": "http://example.org/stream"}],
        "titles": [{"owner": "BROADCASTER", "type": "MAIN", "value": title}],
        "episodeOf": episode_of,
        "duration": 1800,
        "publishStart": 50
    });
    (NodeId::new("poms", "poms", urn), doc)
}

pub fn segment(number: u32, program_urn: &str) -> (NodeId, Value) {
    let urn = format!("{}{}", SEGMENT_PREFIX, number);
    let doc = json!({
        "urn": urn,
        "urnRef": program_urn,
        "titles": [{"type": "MAIN", "value": format!("segment {}", number)}],
        "start": 0
    });
    (NodeId::new("poms", "poms", urn), doc)
}

/// A segment with its own main title
pub fn titled_segment(number: u32, program_urn: &str, title: &str) -> (NodeId, Value) {
    let (id, mut doc) = segment(number, program_urn);
    doc["titles"] = json!([{"type": "MAIN", "value": title}]);
    (id, doc)
}

pub fn group(id: &str, kind: &str, workflow: &str, title: &str) -> (NodeId, Value) {
    let doc = json!({
        "urn": id,
        "type": kind,
        "workflow": workflow,
        "titles": [{"type": "MAIN", "value": title}]
    });
    (NodeId::new("poms", "poms", id), doc)
}

/// Target id of a source document under `target`
pub fn target_of(id: &NodeId, target: (&str, &str)) -> NodeId {
    id.retarget(&TypeKey::new(target.0, target.1))
}
