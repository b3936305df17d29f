use grc_core::graph::*;
use grc_core::revision::*;
use grc_core::schema::{SchemaDocument, SchemaRegistry};
use std::sync::{Arc, Barrier};
use std::thread;

/// One framework, one family, `n` controls, one CONTAINS edge per control.
fn make_store(n: usize) -> GraphStore {
    let mut store = GraphStore::new();
    store.merge_nodes([
        Node::framework("NIST-800-53", "NIST"),
        Node::family("NIST-AC", "Access Control", "NIST-800-53"),
    ]);
    store.merge_nodes((0..n).map(|i| Node::control(format!("NIST-AC-{}", i), "control", "NIST-AC")));
    store.merge_edges(
        (0..n).map(|i| Edge::new(Plane::Compliance, "NIST-AC", "CONTAINS", format!("NIST-AC-{}", i), 1.0)),
    );
    store
}

fn schema_with_gate(gate: PublishGate) -> SchemaRegistry {
    let mut doc: SchemaDocument = SchemaRegistry::builtin().unwrap().into_document();
    doc.revision_layer.gates.publish_gate = gate;
    SchemaRegistry::from_document(doc).unwrap()
}

#[test]
fn test_publish_gate_failure_keeps_draft() {
    let schema = schema_with_gate(PublishGate {
        min_edges: 100,
        ..PublishGate::default()
    });
    let manager = RevisionManager::default();
    let draft = manager.create_draft(make_store(50), Some("seed".to_string()));
    let draft_id = draft.id.clone();

    let outcome = manager.publish(draft, &schema).unwrap();
    let PublishOutcome::Rejected { draft, gate } = outcome else {
        panic!("gate should fail");
    };
    assert!(!gate.passed);
    assert_eq!(gate.gate, "publish_gate");
    assert_eq!(gate.failures, vec!["edge count 50 below minimum 100".to_string()]);
    assert_eq!(draft.status, RevisionStatus::Draft);
    assert_eq!(draft.id, draft_id);
    assert!(manager.current().is_none());

    let history = manager.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RevisionStatus::Draft);
}

#[test]
fn test_gate_counts_validation_errors() {
    let schema = schema_with_gate(PublishGate::default());
    let mut store = make_store(3);
    store.merge_edges([Edge::new(Plane::Mapping, "NIST-AC-0", "MAPS_TO", "GHOST", 0.9)]);

    let outcome = publish_gate(&store, &schema);
    assert!(!outcome.passed);
    assert_eq!(outcome.report.errors.len(), 1);
    assert!(outcome.failures[0].contains("1 validation error(s)"));
}

#[test]
fn test_gate_plane_and_predicate_minimums() {
    let mut gate = PublishGate::default();
    gate.min_plane_edges.insert("MAPPING".to_string(), 1);
    gate.min_plane_edges.insert("PLANE-COMPLIANCE".to_string(), 2);
    gate.min_predicate_edges.insert("CONTAINS".to_string(), 10);
    let schema = schema_with_gate(gate);

    let outcome = publish_gate(&make_store(5), &schema);
    assert!(!outcome.passed);
    assert_eq!(outcome.failures.len(), 2, "{:?}", outcome.failures);
    assert!(outcome.failures.iter().any(|f| f.starts_with("plane MAPPING")));
    assert!(outcome.failures.iter().any(|f| f.starts_with("predicate CONTAINS")));
}

#[test]
fn test_publish_swaps_and_archives() {
    let schema = schema_with_gate(PublishGate {
        min_nodes: 1,
        min_edges: 1,
        ..PublishGate::default()
    });
    let manager = RevisionManager::new("grc-kg-rev");

    let first = manager.create_draft(make_store(2), None);
    let PublishOutcome::Published(first) = manager.publish(first, &schema).unwrap() else {
        panic!("first publish should pass");
    };
    assert_eq!(first.status, RevisionStatus::Published);
    assert_eq!(first.id.to_string(), "grc-kg-rev-001");
    assert_eq!(first.store().meta().revision_id.as_deref(), Some("grc-kg-rev-001"));

    // A reader holding the first revision keeps a complete snapshot
    let reader_view: Arc<GraphStore> = first.shared_store();

    let second = manager.create_draft(make_store(4), Some("more controls".to_string()));
    let PublishOutcome::Published(second) = manager.publish(second, &schema).unwrap() else {
        panic!("second publish should pass");
    };

    assert_eq!(manager.current().unwrap().id, second.id);
    assert!(manager.is_stale(&first.id));
    assert!(!manager.is_stale(&second.id));
    assert_eq!(reader_view.edge_count(), 2);

    let archived = manager.revision(&first.id).unwrap();
    assert_eq!(archived.status, RevisionStatus::Archived);

    let statuses: Vec<RevisionStatus> = manager.history().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![RevisionStatus::Archived, RevisionStatus::Published]);
}

#[test]
fn test_older_draft_cannot_replace_newer_publication() {
    let schema = schema_with_gate(PublishGate::default());
    let manager = RevisionManager::default();

    let older = manager.create_draft(make_store(1), None);
    let newer = manager.create_draft(make_store(2), None);
    assert!(matches!(
        manager.publish(newer, &schema).unwrap(),
        PublishOutcome::Published(_)
    ));

    let err = manager.publish(older, &schema).unwrap_err();
    assert!(matches!(err, RevisionError::Superseded { .. }));
}

#[test]
fn test_concurrent_publish_never_moves_backwards() {
    let schema = schema_with_gate(PublishGate::default());

    for _ in 0..100 {
        let manager = RevisionManager::default();
        let older = manager.create_draft(make_store(1), None);
        let newer = manager.create_draft(make_store(2), None);
        let newer_id = newer.id.clone();
        let barrier = Barrier::new(2);

        let (older_result, newer_result) = thread::scope(|s| {
            let a = s.spawn(|| {
                barrier.wait();
                manager.publish(older, &schema)
            });
            let b = s.spawn(|| {
                barrier.wait();
                manager.publish(newer, &schema)
            });
            (a.join().unwrap(), b.join().unwrap())
        });

        assert!(matches!(newer_result, Ok(PublishOutcome::Published(_))));
        match older_result {
            Ok(PublishOutcome::Published(_)) | Err(RevisionError::Superseded { .. }) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(manager.current().unwrap().id, newer_id);
        assert!(!manager.is_stale(&newer_id));
    }
}

#[test]
fn test_unknown_revision_lookup() {
    let manager = RevisionManager::default();
    let missing = RevisionId::new("grc-kg-rev", 42);
    assert_eq!(
        manager.revision(&missing).unwrap_err(),
        RevisionError::NotFound("grc-kg-rev-042".to_string())
    );
}

#[test]
fn test_manager_resumes_from_schema_revision() {
    let mut doc = SchemaRegistry::builtin().unwrap().into_document();
    doc.revision_layer.current_revision = Some(grc_core::schema::RevisionInfo {
        revision_id: "grc-kg-rev-002".to_string(),
        status: "published".to_string(),
        created_at: None,
        summary: None,
    });
    let schema = SchemaRegistry::from_document(doc).unwrap();

    let manager = RevisionManager::for_schema(&schema, DEFAULT_REVISION_PREFIX);
    assert_eq!(manager.next_id().to_string(), "grc-kg-rev-003");
}

#[test]
fn test_configured_prefix_wins_over_schema_revision() {
    let mut doc = SchemaRegistry::builtin().unwrap().into_document();
    doc.revision_layer.current_revision = Some(grc_core::schema::RevisionInfo {
        revision_id: "grc-kg-rev-007".to_string(),
        status: "published".to_string(),
        created_at: None,
        summary: None,
    });
    let schema = SchemaRegistry::from_document(doc).unwrap();

    let manager = RevisionManager::for_schema(&schema, "soc2-rev");
    assert_eq!(manager.next_id().to_string(), "soc2-rev-008");
}

#[test]
fn test_content_hash_ignores_order_and_meta() {
    let a = make_store(5);

    let mut b = GraphStore::new();
    let mut nodes = a.nodes().to_vec();
    nodes.reverse();
    b.merge_nodes(nodes);
    let mut edges = a.all_edges().to_vec();
    edges.reverse();
    b.merge_edges(edges.into_iter().map(|e| e.with_section("elsewhere")));
    b.stamp("grc-kg-rev-999");

    assert_eq!(content_hash(&a), content_hash(&b));
}

#[test]
fn test_content_hash_detects_changes() {
    let a = make_store(5);
    let base = content_hash(&a);

    let mut changed_conf = GraphStore::new();
    changed_conf.merge_nodes(a.nodes().to_vec());
    changed_conf.merge_edges(a.all_edges().iter().cloned().map(|mut e| {
        if e.object == "NIST-AC-3" {
            e.confidence = 0.99;
        }
        e
    }));
    let h = content_hash(&changed_conf);
    assert_eq!(h.nodes, base.nodes);
    assert_ne!(h.edges, base.edges);

    let mut relabeled = GraphStore::new();
    relabeled.merge_nodes(a.nodes().iter().cloned().map(|mut n| {
        if n.id == "NIST-AC" {
            n.label = "Access Control (rev5)".to_string();
        }
        n
    }));
    relabeled.merge_edges(a.all_edges().to_vec());
    let h = content_hash(&relabeled);
    assert_ne!(h.nodes, base.nodes);
    assert_eq!(h.edges, base.edges);
    assert_ne!(h.combined(), base.combined());
}

#[test]
fn test_snapshot_hash_matches_store_hash() {
    let store = make_store(3);
    let snapshot = store.to_snapshot();
    assert_eq!(snapshot_hash(&snapshot).unwrap(), content_hash(&store));
    assert_eq!(content_hash(&store).nodes.len(), 64);
}
