//! Export the graph as the flat viewer payload (JSON) or as DOT (Graphviz).

use crate::stats::GraphStats;
use grc_core::graph::{GraphStore, Node, NodeType, Plane, predicates};
use grc_core::schema::SchemaRegistry;
use grc_core::snapshot::node_record;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::fmt::Write;
use std::str::FromStr;

/// Export format for `grc-graph export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Dot,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "dot" | "graphviz" => Ok(Self::Dot),
            other => Err(format!("unknown export format '{}' (expected json or dot)", other)),
        }
    }
}

fn node_entry(node: &Node) -> Value {
    let mut props = match node_record(node) {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    for key in ["id", "type", "label"] {
        props.remove(key);
    }
    json!({
        "id": node.id,
        "type": node.node_type().as_str(),
        "label": node.label,
        "props": props,
    })
}

/// Flat `{nodes, edges, planes, stats}` document consumed by the graph viewer.
pub fn export_payload(store: &GraphStore, schema: &SchemaRegistry) -> Value {
    let nodes: Vec<Value> = store.nodes().iter().map(node_entry).collect();

    let edges: Vec<Value> = store
        .all_edges()
        .iter()
        .map(|e| {
            json!({
                "source": e.subject,
                "target": e.object,
                "predicate": e.predicate,
                "plane": e.plane.as_str(),
                "confidence": e.confidence,
                "meta": e.meta,
            })
        })
        .collect();

    let by_plane = store.edge_counts_by_plane();
    let planes: Map<String, Value> = Plane::ALL
        .into_iter()
        .map(|plane| {
            let def = schema.document().planes.get(&plane.schema_key());
            (
                plane.schema_key(),
                json!({
                    "description": def.map_or("", |d| d.description.as_str()),
                    "predicates_allowed": schema.allowed_predicates(plane).collect::<Vec<_>>(),
                    "edge_count": by_plane.get(&plane).copied().unwrap_or(0),
                }),
            )
        })
        .collect();

    let stats = serde_json::to_value(GraphStats::compute(store)).unwrap_or(Value::Null);

    json!({
        "nodes": nodes,
        "edges": edges,
        "planes": planes,
        "stats": stats,
    })
}

fn node_style(ty: NodeType) -> (&'static str, &'static str) {
    match ty {
        NodeType::Framework => ("diamond", "#3b82f6"),
        NodeType::ControlFamily => ("box", "#8b5cf6"),
        NodeType::Control => ("ellipse", "#10b981"),
        NodeType::Baseline => ("pentagon", "#f59e0b"),
        NodeType::ServiceModel => ("hexagon", "#ef4444"),
        NodeType::EvidenceType => ("rectangle", "#06b6d4"),
        NodeType::DocumentType => ("rectangle", "#6b7280"),
    }
}

fn edge_style(predicate: &str) -> (&'static str, &'static str) {
    match predicate {
        predicates::CONTAINS => ("solid", "#6b7280"),
        predicates::ASSIGNED_TO => ("solid", "#f59e0b"),
        predicates::MAPS_TO => ("dashed", "#3b82f6"),
        predicates::REQUIRES_EVIDENCE => ("dotted", "#06b6d4"),
        predicates::RESPONSIBILITY_OF => ("solid", "#ef4444"),
        predicates::DOCUMENTED_IN => ("dotted", "#a78bfa"),
        predicates::INHERITS_FROM => ("solid", "#f97316"),
        _ => ("solid", "#9ca3af"),
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Export the graph as a DOT string, optionally restricted to one plane.
///
/// With a plane filter only nodes touched by that plane's edges are emitted.
pub fn export_dot(store: &GraphStore, plane: Option<Plane>) -> String {
    let edges: Vec<_> = store
        .all_edges()
        .iter()
        .filter(|e| plane.is_none_or(|p| p == e.plane))
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "digraph GRC {{");
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  node [style=filled, fontsize=10, fontcolor=white];");
    let _ = writeln!(out);

    let touched: HashSet<&str> = edges
        .iter()
        .flat_map(|e| [e.subject.as_str(), e.object.as_str()])
        .collect();

    for node in store.nodes() {
        if plane.is_some() && !touched.contains(node.id.as_str()) {
            continue;
        }
        let (shape, color) = node_style(node.node_type());
        let _ = writeln!(
            out,
            "  \"{}\" [shape={}, fillcolor=\"{}\", label=\"{}\"];",
            escape(&node.id),
            shape,
            color,
            escape(&node.label)
        );
    }

    let _ = writeln!(out);

    for edge in &edges {
        let (style, color) = edge_style(&edge.predicate);
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\" [label=\"{}\", style={}, color=\"{}\"];",
            escape(&edge.subject),
            escape(&edge.object),
            edge.predicate,
            style,
            color
        );
    }

    let _ = writeln!(out, "}}");
    out
}
