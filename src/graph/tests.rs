//! Graph store behaviour: ownership, replacement and direction lookups

use super::*;
use serde_json::json;

fn poms(id: &str) -> NodeId {
    NodeId::new("poms", "poms", id)
}

fn episode_subgraph(program: &str, series: &[&str]) -> Subgraph {
    let owner = poms(program);
    let mut sg = Subgraph::empty(owner.clone());
    for s in series {
        sg.edges.push(EdgeSpec::new("episodeOf", owner.clone(), poms(s)));
    }
    sg
}

#[test]
fn commit_creates_endpoint_nodes() {
    let store = GraphStore::new();
    store.commit(episode_subgraph("p1", &["s1", "s2"])).unwrap();

    assert_eq!(store.node_count().unwrap(), 3);
    assert_eq!(store.edge_count().unwrap(), 2);
    assert!(store.contains_node(&poms("s2")).unwrap());
}

#[test]
fn recommitting_the_same_subgraph_is_idempotent() {
    let store = GraphStore::new();
    let first = store.commit(episode_subgraph("p1", &["s1", "s2"])).unwrap();
    assert_eq!(first.len(), 1);
    let before: Vec<EdgeId> = store.owned_edges(&poms("p1")).unwrap().iter().map(|e| e.id).collect();

    let second = store.commit(episode_subgraph("p1", &["s1", "s2"])).unwrap();
    assert!(second.is_empty(), "unchanged extraction must not emit events");

    let after: Vec<EdgeId> = store.owned_edges(&poms("p1")).unwrap().iter().map(|e| e.id).collect();
    assert_eq!(before, after);
    assert_eq!(store.edge_count().unwrap(), 2);
}

#[test]
fn recommit_replaces_only_the_owners_edges() {
    let store = GraphStore::new();
    store.commit(episode_subgraph("p1", &["s1", "s2"])).unwrap();
    store.commit(episode_subgraph("p2", &["s1"])).unwrap();

    let events = store.commit(episode_subgraph("p1", &["s3"])).unwrap();

    assert!(events.iter().any(|e| matches!(e, GraphEvent::EdgesAdded { edges, .. } if edges.len() == 1)));
    assert!(events.iter().any(|e| matches!(
        e,
        GraphEvent::EdgesRemoved { edges, reason: RemovalReason::Replaced, .. } if edges.len() == 2
    )));

    // p2's edge into s1 survives
    let into_s1 = store.edges(&poms("s1"), Direction::In).unwrap();
    assert_eq!(into_s1.len(), 1);
    assert_eq!(into_s1[0].owner, poms("p2"));
}

#[test]
fn parallel_edges_with_distinct_properties_are_kept() {
    let store = GraphStore::new();
    let owner = poms("p1");
    let mut sg = Subgraph::empty(owner.clone());
    for position in [1, 2] {
        let mut props = Properties::new();
        props.insert("position".to_string(), json!(position));
        sg.edges.push(EdgeSpec::new("episodeOf", owner.clone(), poms("s1")).with_properties(props));
    }
    store.commit(sg.clone()).unwrap();
    assert_eq!(store.edge_count().unwrap(), 2);

    assert!(store.commit(sg).unwrap().is_empty());
    assert_eq!(store.edge_count().unwrap(), 2);
}

#[test]
fn direction_selects_edge_side() {
    let store = GraphStore::new();
    store.commit(episode_subgraph("p1", &["s1"])).unwrap();

    let out = store.edges(&poms("p1"), Direction::Out).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].endpoint(Direction::Out), &poms("s1"));

    let incoming = store.edges(&poms("s1"), Direction::In).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].endpoint(Direction::In), &poms("p1"));

    assert!(store.edges(&poms("p1"), Direction::In).unwrap().is_empty());
}

#[test]
fn properties_are_last_write_wins_per_key() {
    let store = GraphStore::new();
    let mut sg = Subgraph::empty(poms("p1"));
    sg.properties.insert("test".to_string(), json!([1, 2, 3]));
    sg.properties.insert("kind".to_string(), json!("program"));
    store.commit(sg).unwrap();

    let mut sg = Subgraph::empty(poms("p1"));
    sg.properties.insert("test".to_string(), json!([4]));
    let events = store.commit(sg).unwrap();

    assert_eq!(
        events,
        vec![GraphEvent::PropertiesChanged {
            node: poms("p1"),
            keys: vec!["test".to_string()],
        }]
    );
    let node = store.node(&poms("p1")).unwrap().unwrap();
    assert_eq!(node.properties["test"], json!([4]));
    assert_eq!(node.properties["kind"], json!("program"));
}

#[test]
fn delete_owned_keeps_nodes() {
    let store = GraphStore::new();
    store.commit(episode_subgraph("p1", &["s1"])).unwrap();

    let events = store.delete_owned(&poms("p1")).unwrap();
    assert!(matches!(
        events.as_slice(),
        [GraphEvent::EdgesRemoved { reason: RemovalReason::Deleted, .. }]
    ));
    assert_eq!(store.edge_count().unwrap(), 0);
    assert!(store.contains_node(&poms("p1")).unwrap());
    assert!(store.contains_node(&poms("s1")).unwrap());
}

#[test]
fn node_id_serializes_with_type_field() {
    let id = poms("urn:vpro:media:program:1");
    let json = serde_json::to_value(&id).unwrap();
    assert_eq!(json, json!({"index": "poms", "type": "poms", "id": "urn:vpro:media:program:1"}));
}

#[test]
fn reordered_declaration_reorders_walk_children() {
    let store = GraphStore::new();
    store.commit(episode_subgraph("p1", &["s1", "s2"])).unwrap();
    let events = store.commit(episode_subgraph("p1", &["s2", "s1"])).unwrap();
    assert!(events.is_empty());

    let order: Vec<String> = store
        .edges(&poms("p1"), Direction::Out)
        .unwrap()
        .iter()
        .map(|e| e.to.id.clone())
        .collect();
    assert_eq!(order, vec!["s2", "s1"]);
    assert_eq!(store.edge_count().unwrap(), 2);
}

fn positioned(from: &str, to: &str, position: i64) -> EdgeSpec {
    let mut props = Properties::new();
    props.insert("position".to_string(), json!(position));
    EdgeSpec::new("episodeOf", poms(from), poms(to)).with_properties(props)
}

#[test]
fn reordering_keeps_other_owners_in_place() {
    let store = GraphStore::new();
    let mut first = Subgraph::empty(poms("p1"));
    for position in [1, 2] {
        first.edges.push(positioned("p1", "s1", position));
    }
    store.commit(first).unwrap();
    store.commit(episode_subgraph("p2", &["s1"])).unwrap();

    let mut reordered = Subgraph::empty(poms("p1"));
    for position in [2, 1] {
        reordered.edges.push(positioned("p1", "s1", position));
    }
    store.commit(reordered).unwrap();

    let incoming: Vec<(String, Option<serde_json::Value>)> = store
        .edges(&poms("s1"), Direction::In)
        .unwrap()
        .iter()
        .map(|e| (e.from.id.clone(), e.properties.get("position").cloned()))
        .collect();
    assert_eq!(
        incoming,
        vec![
            ("p1".to_string(), Some(json!(2))),
            ("p1".to_string(), Some(json!(1))),
            ("p2".to_string(), None),
        ]
    );
}
