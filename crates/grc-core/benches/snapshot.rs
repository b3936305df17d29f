use criterion::{Criterion, criterion_group, criterion_main};
use grc_core::graph::{Edge, GraphStore, Node, Plane};
use grc_core::revision::content_hash;
use grc_core::schema::SchemaRegistry;
use grc_core::validate::validate;
use std::hint::black_box;

fn build_store(controls_per_family: usize) -> GraphStore {
    let mut store = GraphStore::new();
    let mut nodes = vec![
        Node::framework("NIST-800-53", "NIST SP 800-53"),
        Node::framework("ISO-27001", "ISO/IEC 27001"),
    ];
    let mut edges = Vec::new();

    for f in 0..10 {
        let nist_family = format!("NIST-F{}", f);
        let iso_family = format!("ISO-F{}", f);
        nodes.push(Node::family(&nist_family, "family", "NIST-800-53"));
        nodes.push(Node::family(&iso_family, "family", "ISO-27001"));
        edges.push(Edge::new(Plane::Compliance, "NIST-800-53", "CONTAINS", &nist_family, 1.0));
        edges.push(Edge::new(Plane::Compliance, "ISO-27001", "CONTAINS", &iso_family, 1.0));

        for c in 0..controls_per_family {
            let nist = format!("{}-{}", nist_family, c);
            let iso = format!("{}-{}", iso_family, c);
            nodes.push(Node::control(&nist, "control", &nist_family));
            nodes.push(Node::control(&iso, "control", &iso_family));
            edges.push(Edge::new(Plane::Compliance, &nist_family, "CONTAINS", &nist, 1.0));
            edges.push(Edge::new(Plane::Compliance, &iso_family, "CONTAINS", &iso, 1.0));
            edges.push(Edge::new(Plane::Mapping, &nist, "MAPS_TO", &iso, 0.8));
        }
    }

    store.merge_nodes(nodes);
    store.merge_edges(edges);
    store
}

fn bench_load(c: &mut Criterion) {
    let snapshot = build_store(50).to_snapshot();

    c.bench_function("load_snapshot_1000_controls", |b| {
        b.iter(|| GraphStore::load(black_box(&snapshot)).unwrap())
    });
}

fn bench_to_snapshot(c: &mut Criterion) {
    let store = build_store(50);

    c.bench_function("to_snapshot_1000_controls", |b| {
        b.iter(|| black_box(&store).to_snapshot())
    });
}

fn bench_content_hash(c: &mut Criterion) {
    let store = build_store(50);

    c.bench_function("content_hash_1000_controls", |b| {
        b.iter(|| content_hash(black_box(&store)))
    });
}

fn bench_validate(c: &mut Criterion) {
    let store = build_store(50);
    let schema = SchemaRegistry::builtin().unwrap();

    c.bench_function("validate_1000_controls", |b| {
        b.iter(|| validate(black_box(&store), black_box(&schema)))
    });
}

criterion_group!(
    benches,
    bench_load,
    bench_to_snapshot,
    bench_content_hash,
    bench_validate
);
criterion_main!(benches);
