use grc_core::graph::*;
use grc_core::schema::SchemaRegistry;
use grc_core::validate::{ErrorKind, validate};

fn make_framework_graph() -> GraphStore {
    let mut store = GraphStore::new();
    store.merge_nodes([
        Node::framework("F1", "Framework One"),
        Node::family("FAM1", "Family One", "F1"),
        Node::control("C1", "Control One", "FAM1"),
        Node::control("C2", "Control Two", "FAM1"),
    ]);
    store.merge_edges([
        Edge::new(Plane::Compliance, "F1", predicates::CONTAINS, "FAM1", 1.0),
        Edge::new(Plane::Compliance, "FAM1", predicates::CONTAINS, "C1", 1.0),
        Edge::new(Plane::Compliance, "FAM1", predicates::CONTAINS, "C2", 1.0),
    ]);
    store
}

#[test]
fn test_valid_graph_has_no_errors() {
    let schema = SchemaRegistry::builtin().unwrap();
    let store = make_framework_graph();

    let report = validate(&store, &schema);
    assert_eq!(report.node_count, 4);
    assert_eq!(report.edge_count, 3);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
}

#[test]
fn test_dangling_edge_reports_single_error() {
    let schema = SchemaRegistry::builtin().unwrap();
    let mut store = make_framework_graph();
    store.merge_edges([Edge::new(Plane::Mapping, "C1", predicates::MAPS_TO, "K2", 0.9)]);

    let report = validate(&store, &schema);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].kind, ErrorKind::DanglingObject);
    assert_eq!(report.errors[0].ids, vec!["K2".to_string()]);
}

#[test]
fn test_plane_violation() {
    let schema = SchemaRegistry::builtin().unwrap();
    let mut store = make_framework_graph();
    store.merge_nodes([Node::new("EV-LOGS", "Audit logs", NodeKind::EvidenceType)]);
    store.merge_edges([Edge::new(
        Plane::Compliance,
        "C1",
        predicates::REQUIRES_EVIDENCE,
        "EV-LOGS",
        1.0,
    )]);

    let report = validate(&store, &schema);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].kind, ErrorKind::PlaneViolation);
    assert_eq!(report.errors[0].ids, vec!["C1", "EV-LOGS"]);
}

#[test]
fn test_merge_is_idempotent() {
    let mut store = make_framework_graph();
    let before_nodes = store.nodes().to_vec();
    let before_edges = store.all_edges().to_vec();

    let nodes = store.nodes().to_vec();
    let edges = store.all_edges().to_vec();
    let node_outcome = store.merge_nodes(nodes);
    let edge_outcome = store.merge_edges(edges);

    assert_eq!(node_outcome, MergeOutcome { accepted: 0, skipped: 4 });
    assert_eq!(edge_outcome, MergeOutcome { accepted: 0, skipped: 3 });
    assert_eq!(store.nodes(), before_nodes.as_slice());
    assert_eq!(store.all_edges(), before_edges.as_slice());
}

#[test]
fn test_merge_preserves_insertion_order() {
    let mut store = make_framework_graph();
    store.merge_nodes([Node::control("C3", "Control Three", "FAM1")]);

    let ids: Vec<&str> = store.nodes().iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["F1", "FAM1", "C1", "C2", "C3"]);
    assert_eq!(store.node("C3").unwrap().section.as_deref(), Some("f1"));
}

#[test]
fn test_merge_keeps_explicit_section() {
    let mut store = make_framework_graph();
    store.merge_nodes([Node::control("C9", "Control Nine", "FAM1").with_section("legacy")]);
    store.merge_edges([
        Edge::new(Plane::Compliance, "FAM1", predicates::CONTAINS, "C9", 1.0)
            .with_section("family_to_control"),
    ]);

    assert_eq!(store.node("C9").unwrap().section.as_deref(), Some("legacy"));
    assert_eq!(store.incoming("C9")[0].section, "family_to_control");
    assert_eq!(
        store.incoming("C1")[0].section,
        "contains",
        "default section is the lower-cased predicate"
    );
}

#[test]
fn test_all_node_ids() {
    let store = make_framework_graph();
    let ids = store.all_node_ids();
    assert_eq!(ids.len(), 4);
    assert!(ids.contains("C2"));
}

#[test]
fn test_edges_in_plane() {
    let mut store = make_framework_graph();
    store.merge_nodes([Node::framework("NIST-800-53", "NIST")]);
    store.merge_edges([Edge::new(Plane::Mapping, "C1", predicates::MAPS_TO, "NIST-800-53", 0.7)]);

    assert_eq!(store.edges_in(Plane::Compliance).count(), 3);
    assert_eq!(store.edges_in(Plane::Mapping).count(), 1);
    assert_eq!(store.edges_in(Plane::Evidence).count(), 0);
    assert!(store.contains_triple(Plane::Mapping, "C1", "MAPS_TO", "NIST-800-53"));
    assert!(!store.contains_triple(Plane::Compliance, "C1", "MAPS_TO", "NIST-800-53"));
}

#[test]
fn test_stamp_refreshes_meta() {
    let mut store = make_framework_graph();
    store.stamp("grc-kg-rev-004");
    assert_eq!(store.meta().revision_id.as_deref(), Some("grc-kg-rev-004"));
    assert_eq!(store.meta().node_count, 4);
    assert_eq!(store.meta().edge_count, 3);
}
