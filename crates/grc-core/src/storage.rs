//! Read/write graph snapshot files from disk.
//!
//! A graph directory holds `nodes.json`, `edges.json` and optionally
//! `schema.json`. Without a schema file the embedded default schema is used.

use crate::graph::GraphStore;
use crate::schema::{SchemaDocument, SchemaRegistry};
use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const NODES_FILE: &str = "nodes.json";
const EDGES_FILE: &str = "edges.json";
const SCHEMA_FILE: &str = "schema.json";

pub fn nodes_file(graph_dir: &Path) -> PathBuf {
    graph_dir.join(NODES_FILE)
}

pub fn edges_file(graph_dir: &Path) -> PathBuf {
    graph_dir.join(EDGES_FILE)
}

pub fn schema_file(graph_dir: &Path) -> PathBuf {
    graph_dir.join(SCHEMA_FILE)
}

/// Check if both snapshot documents exist in `graph_dir`.
pub fn graph_exists(graph_dir: &Path) -> bool {
    nodes_file(graph_dir).exists() && edges_file(graph_dir).exists()
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Load the raw snapshot documents.
pub fn load_snapshot(graph_dir: &Path) -> Result<Snapshot> {
    let nodes_path = nodes_file(graph_dir);
    let edges_path = edges_file(graph_dir);
    let nodes = serde_json::from_str(&read(&nodes_path)?)
        .with_context(|| format!("failed to parse {}", nodes_path.display()))?;
    let edges = serde_json::from_str(&read(&edges_path)?)
        .with_context(|| format!("failed to parse {}", edges_path.display()))?;
    Ok(Snapshot { nodes, edges })
}

pub fn load_store(graph_dir: &Path) -> Result<GraphStore> {
    let snapshot = load_snapshot(graph_dir)?;
    GraphStore::load(&snapshot)
        .with_context(|| format!("failed to load graph from {}", graph_dir.display()))
}

/// Load `schema.json`, or the embedded default schema if the file is absent.
pub fn load_schema(graph_dir: &Path) -> Result<SchemaRegistry> {
    let path = schema_file(graph_dir);
    if !path.exists() {
        tracing::info!("no schema at {}, using built-in schema", path.display());
        return SchemaRegistry::builtin().context("built-in schema is invalid");
    }
    SchemaRegistry::from_json(&read(&path)?)
        .with_context(|| format!("invalid schema in {}", path.display()))
}

/// Load the store and its schema together.
pub fn load_graph(graph_dir: &Path) -> Result<(GraphStore, SchemaRegistry)> {
    Ok((load_store(graph_dir)?, load_schema(graph_dir)?))
}

fn render_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    json.push('\n');
    Ok(json)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_text(path, &render_json(path, value)?)
}

/// Save the store's snapshot documents, creating the directory if needed.
pub fn save_snapshot(graph_dir: &Path, store: &GraphStore) -> Result<()> {
    fs::create_dir_all(graph_dir)
        .with_context(|| format!("failed to create graph directory {}", graph_dir.display()))?;
    let snapshot = store.to_snapshot();
    write_json(&nodes_file(graph_dir), &snapshot.nodes)?;
    write_json(&edges_file(graph_dir), &snapshot.edges)?;
    tracing::debug!(
        "saved {} nodes, {} edges to {}",
        store.node_count(),
        store.edge_count(),
        graph_dir.display()
    );
    Ok(())
}

pub fn save_schema(graph_dir: &Path, doc: &SchemaDocument) -> Result<()> {
    fs::create_dir_all(graph_dir)
        .with_context(|| format!("failed to create graph directory {}", graph_dir.display()))?;
    write_json(&schema_file(graph_dir), doc)
}

/// Save a published revision: the stamped snapshot plus the schema naming it
/// as `current_revision`.
///
/// All three documents are serialized before anything is written, and the
/// schema is written first. A failed schema write leaves the old snapshot on
/// disk untouched.
pub fn save_revision(graph_dir: &Path, store: &GraphStore, doc: &SchemaDocument) -> Result<()> {
    fs::create_dir_all(graph_dir)
        .with_context(|| format!("failed to create graph directory {}", graph_dir.display()))?;
    let snapshot = store.to_snapshot();
    let schema_path = schema_file(graph_dir);
    let nodes_path = nodes_file(graph_dir);
    let edges_path = edges_file(graph_dir);
    let schema_json = render_json(&schema_path, doc)?;
    let nodes_json = render_json(&nodes_path, &snapshot.nodes)?;
    let edges_json = render_json(&edges_path, &snapshot.edges)?;

    write_text(&schema_path, &schema_json)?;
    write_text(&nodes_path, &nodes_json)?;
    write_text(&edges_path, &edges_json)?;
    tracing::debug!(
        "saved revision {} to {}",
        store.meta().revision_id.as_deref().unwrap_or("-"),
        graph_dir.display()
    );
    Ok(())
}
