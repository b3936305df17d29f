//! Snapshot codec: the persisted nodes/edges documents to and from [`GraphStore`].
//!
//! Loading is strict. Every record is checked and all problems are collected
//! before failing, so a broken snapshot is reported in one pass.

use crate::coverage::coverage_to_confidence;
use crate::graph::{Edge, GraphStore, MetaValue, Node, NodeKind, NodeType, Plane, SnapshotMeta};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Errors raised while decoding snapshot or candidate documents.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed snapshot ({} problem(s)): {}", .problems.len(), .problems.join("; "))]
    Malformed { problems: Vec<String> },
}

/// Flat node collections: `"frameworks": [ ... ]`.
const LIST_COLLECTIONS: [(&str, NodeType); 5] = [
    ("frameworks", NodeType::Framework),
    ("baselines", NodeType::Baseline),
    ("service_models", NodeType::ServiceModel),
    ("evidence_types", NodeType::EvidenceType),
    ("document_types", NodeType::DocumentType),
];

/// Sectioned node collections: `"controls": { "<section>": [ ... ] }`.
const GROUPED_COLLECTIONS: [(&str, NodeType); 2] = [
    ("control_families", NodeType::ControlFamily),
    ("controls", NodeType::Control),
];

/// Section used for a sectioned node that has none.
const UNASSIGNED_SECTION: &str = "unassigned";

/// Collection key a node type is filed under in the nodes document.
pub fn collection_for(node_type: NodeType) -> &'static str {
    LIST_COLLECTIONS
        .iter()
        .chain(GROUPED_COLLECTIONS.iter())
        .find(|(_, t)| *t == node_type)
        .map_or("frameworks", |(key, _)| *key)
}

fn is_grouped(node_type: NodeType) -> bool {
    GROUPED_COLLECTIONS.iter().any(|(_, t)| *t == node_type)
}

/// The two persisted documents of a graph snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub nodes: Value,
    pub edges: Value,
}

impl Snapshot {
    pub fn from_json(nodes: &str, edges: &str) -> Result<Self, SnapshotError> {
        Ok(Self {
            nodes: serde_json::from_str(nodes)?,
            edges: serde_json::from_str(edges)?,
        })
    }
}

impl GraphStore {
    /// Parse a snapshot into a new store.
    ///
    /// Fails with [`SnapshotError::Malformed`] listing every missing field,
    /// unrecognised type tag, unrecognised plane key or unreadable edge record.
    pub fn load(snapshot: &Snapshot) -> Result<Self, SnapshotError> {
        let mut store = GraphStore::new();
        let mut meta = SnapshotMeta::default();
        let mut problems = Vec::new();

        read_nodes(&snapshot.nodes, &mut store, &mut meta, &mut problems);
        read_edges(&snapshot.edges, &mut store, &mut meta, &mut problems);

        if !problems.is_empty() {
            return Err(SnapshotError::Malformed { problems });
        }
        store.set_meta(meta);
        tracing::debug!(
            "loaded snapshot: {} nodes, {} edges",
            store.node_count(),
            store.edge_count()
        );
        Ok(store)
    }

    /// Serialize the store back into snapshot documents. `_meta` counts always
    /// reflect the current contents.
    pub fn to_snapshot(&self) -> Snapshot {
        let meta = self.meta();

        let mut lists: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        let mut grouped: BTreeMap<&str, BTreeMap<String, Vec<Value>>> = BTreeMap::new();
        for node in self.nodes() {
            let node_type = node.node_type();
            let collection = collection_for(node_type);
            if is_grouped(node_type) {
                let section = node
                    .section
                    .clone()
                    .unwrap_or_else(|| UNASSIGNED_SECTION.to_string());
                grouped
                    .entry(collection)
                    .or_default()
                    .entry(section)
                    .or_default()
                    .push(node_record(node));
            } else {
                lists.entry(collection).or_default().push(node_record(node));
            }
        }

        let mut nodes = Map::new();
        nodes.insert(
            "_meta".to_string(),
            meta_record(
                &meta.nodes_extra,
                "node_count",
                self.node_count(),
                meta.revision_id.as_deref(),
            ),
        );
        for (collection, records) in lists {
            nodes.insert(collection.to_string(), Value::Array(records));
        }
        for (collection, sections) in grouped {
            let sections: Map<String, Value> = sections
                .into_iter()
                .map(|(section, records)| (section, Value::Array(records)))
                .collect();
            nodes.insert(collection.to_string(), Value::Object(sections));
        }

        let mut planes: BTreeMap<Plane, BTreeMap<&str, Vec<Value>>> = BTreeMap::new();
        for edge in self.all_edges() {
            planes
                .entry(edge.plane)
                .or_default()
                .entry(edge.section.as_str())
                .or_default()
                .push(edge_record(edge));
        }

        let mut edges = Map::new();
        edges.insert(
            "_meta".to_string(),
            meta_record(
                &meta.edges_extra,
                "edge_count",
                self.edge_count(),
                meta.revision_id.as_deref(),
            ),
        );
        for (plane, sections) in planes {
            let sections: Map<String, Value> = sections
                .into_iter()
                .map(|(section, records)| (section.to_string(), Value::Array(records)))
                .collect();
            edges.insert(plane.snapshot_key(), Value::Object(sections));
        }

        Snapshot {
            nodes: Value::Object(nodes),
            edges: Value::Object(edges),
        }
    }
}

fn meta_record(
    extra: &BTreeMap<String, Value>,
    count_key: &str,
    count: usize,
    revision_id: Option<&str>,
) -> Value {
    let mut obj: Map<String, Value> = extra.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    obj.insert(count_key.to_string(), Value::from(count));
    if let Some(rev) = revision_id {
        obj.insert("revision_id".to_string(), Value::from(rev));
    }
    Value::Object(obj)
}

/// Read a `_meta` object: the count key and `revision_id` are recognised, the
/// rest is preserved verbatim.
fn read_meta(
    value: &Value,
    count_key: &str,
    count: &mut usize,
    revision_id: &mut Option<String>,
    extra: &mut BTreeMap<String, Value>,
) {
    let Some(obj) = value.as_object() else {
        return;
    };
    for (key, v) in obj {
        match key.as_str() {
            "revision_id" => {
                if let Some(rev) = v.as_str() {
                    match revision_id {
                        Some(existing) if existing.as_str() != rev => tracing::warn!(
                            "nodes and edges disagree on revision_id ({} vs {})",
                            existing,
                            rev
                        ),
                        Some(_) => {}
                        None => *revision_id = Some(rev.to_string()),
                    }
                }
            }
            k if k == count_key => {
                if let Some(n) = v.as_u64() {
                    *count = usize::try_from(n).unwrap_or(usize::MAX);
                }
            }
            _ => {
                extra.insert(key.clone(), v.clone());
            }
        }
    }
}

fn read_nodes(doc: &Value, store: &mut GraphStore, meta: &mut SnapshotMeta, problems: &mut Vec<String>) {
    let Some(obj) = doc.as_object() else {
        problems.push("nodes document is not a JSON object".to_string());
        return;
    };

    for (key, value) in obj {
        if key == "_meta" {
            read_meta(
                value,
                "node_count",
                &mut meta.node_count,
                &mut meta.revision_id,
                &mut meta.nodes_extra,
            );
            continue;
        }
        if key.starts_with('_') {
            continue;
        }

        if let Some((_, expected)) = LIST_COLLECTIONS.iter().find(|(k, _)| k == key) {
            let Some(records) = value.as_array() else {
                problems.push(format!("{}: expected a list of nodes", key));
                continue;
            };
            for (i, record) in records.iter().enumerate() {
                let at = format!("{}[{}]", key, i);
                match node_from_record(record, Some(*expected), None, &at) {
                    Ok(node) => store.push_node(node),
                    Err(errs) => problems.extend(errs),
                }
            }
        } else if let Some((_, expected)) = GROUPED_COLLECTIONS.iter().find(|(k, _)| k == key) {
            let Some(sections) = value.as_object() else {
                problems.push(format!("{}: expected an object of sections", key));
                continue;
            };
            for (section, records) in sections {
                if section.starts_with('_') {
                    continue;
                }
                let Some(records) = records.as_array() else {
                    problems.push(format!("{}.{}: expected a list of nodes", key, section));
                    continue;
                };
                for (i, record) in records.iter().enumerate() {
                    let at = format!("{}.{}[{}]", key, section, i);
                    match node_from_record(record, Some(*expected), Some(section), &at) {
                        Ok(node) => store.push_node(node),
                        Err(errs) => problems.extend(errs),
                    }
                }
            }
        } else {
            problems.push(format!("unrecognised node collection '{}'", key));
        }
    }
}

fn read_edges(doc: &Value, store: &mut GraphStore, meta: &mut SnapshotMeta, problems: &mut Vec<String>) {
    let Some(obj) = doc.as_object() else {
        problems.push("edges document is not a JSON object".to_string());
        return;
    };

    for (key, value) in obj {
        if key == "_meta" {
            read_meta(
                value,
                "edge_count",
                &mut meta.edge_count,
                &mut meta.revision_id,
                &mut meta.edges_extra,
            );
            continue;
        }
        if key.starts_with('_') {
            continue;
        }
        let Some(plane) = Plane::from_snapshot_key(key) else {
            problems.push(format!("unrecognised plane key '{}'", key));
            continue;
        };
        let Some(sections) = value.as_object() else {
            problems.push(format!("{}: expected an object of sections", key));
            continue;
        };
        for (section, records) in sections {
            if section.starts_with('_') {
                continue;
            }
            let Some(records) = records.as_array() else {
                problems.push(format!("{}.{}: expected a list of edges", key, section));
                continue;
            };
            for (i, record) in records.iter().enumerate() {
                match EdgeRecord::deserialize(record) {
                    Ok(rec) => store.push_edge(rec.into_edge(plane, section)),
                    Err(e) => problems.push(format!("{}.{}[{}]: {}", key, section, i, e)),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    s: String,
    p: String,
    o: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    meta: BTreeMap<String, MetaValue>,
}

impl EdgeRecord {
    fn into_edge(self, plane: Plane, section: &str) -> Edge {
        Edge {
            subject: self.s,
            predicate: self.p,
            object: self.o,
            confidence: self.confidence.unwrap_or(1.0),
            meta: self.meta,
            plane,
            section: section.to_string(),
        }
    }
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    at: &str,
    problems: &mut Vec<String>,
) -> Option<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            problems.push(format!("{}: field '{}' must be a string", at, key));
            None
        }
        None => {
            problems.push(format!("{}: missing field '{}'", at, key));
            None
        }
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str, at: &str, problems: &mut Vec<String>) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(_) => {
            problems.push(format!("{}: field '{}' must be a string", at, key));
            None
        }
    }
}

fn required_int(obj: &Map<String, Value>, key: &str, at: &str, problems: &mut Vec<String>) -> Option<i64> {
    match obj.get(key) {
        Some(v) if v.is_i64() => v.as_i64(),
        Some(_) => {
            problems.push(format!("{}: field '{}' must be an integer", at, key));
            None
        }
        None => {
            problems.push(format!("{}: missing field '{}'", at, key));
            None
        }
    }
}

/// Keys consumed into [`NodeKind`] and therefore excluded from `props`.
fn typed_keys(node_type: NodeType) -> &'static [&'static str] {
    match node_type {
        NodeType::ControlFamily => &["framework_id"],
        NodeType::Control => &["family_id", "framework_id"],
        NodeType::Baseline => &["framework_id", "level_ordinal"],
        NodeType::ServiceModel => &["stack_position"],
        _ => &[],
    }
}

fn kind_from_record(
    node_type: NodeType,
    obj: &Map<String, Value>,
    at: &str,
    problems: &mut Vec<String>,
) -> Option<NodeKind> {
    match node_type {
        NodeType::Framework => Some(NodeKind::Framework),
        NodeType::EvidenceType => Some(NodeKind::EvidenceType),
        NodeType::DocumentType => Some(NodeKind::DocumentType),
        NodeType::ControlFamily => {
            required_str(obj, "framework_id", at, problems).map(|fw| NodeKind::ControlFamily {
                framework_id: fw.to_string(),
            })
        }
        NodeType::Control => {
            let framework_id = optional_str(obj, "framework_id", at, problems);
            required_str(obj, "family_id", at, problems).map(|family| NodeKind::Control {
                family_id: family.to_string(),
                framework_id,
            })
        }
        NodeType::Baseline => {
            let framework_id = optional_str(obj, "framework_id", at, problems);
            let ordinal = required_int(obj, "level_ordinal", at, problems)?;
            match u32::try_from(ordinal) {
                Ok(level_ordinal) => Some(NodeKind::Baseline {
                    framework_id,
                    level_ordinal,
                }),
                Err(_) => {
                    problems.push(format!("{}: level_ordinal {} out of range", at, ordinal));
                    None
                }
            }
        }
        NodeType::ServiceModel => required_int(obj, "stack_position", at, problems)
            .map(|stack_position| NodeKind::ServiceModel { stack_position }),
    }
}

/// Decode one node record. `expected` is the type implied by the collection the
/// record sits in, if any.
fn node_from_record(
    record: &Value,
    expected: Option<NodeType>,
    section: Option<&str>,
    at: &str,
) -> Result<Node, Vec<String>> {
    let Some(obj) = record.as_object() else {
        return Err(vec![format!("{}: node record is not an object", at)]);
    };
    let mut problems = Vec::new();

    let id = required_str(obj, "id", at, &mut problems);
    let label = required_str(obj, "label", at, &mut problems);
    let node_type = required_str(obj, "type", at, &mut problems).and_then(|tag| {
        tag.parse::<NodeType>()
            .map_err(|e| problems.push(format!("{}: {}", at, e)))
            .ok()
    });

    if let (Some(found), Some(expected)) = (node_type, expected)
        && found != expected
    {
        problems.push(format!(
            "{}: collection holds {} nodes, found {}",
            at, expected, found
        ));
    }

    let kind = node_type.and_then(|t| kind_from_record(t, obj, at, &mut problems));

    match (id, label, kind) {
        (Some(id), Some(label), Some(kind)) if problems.is_empty() => {
            let skip = typed_keys(kind.node_type());
            let props = obj
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "id" | "type" | "label") && !skip.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok(Node {
                id: id.to_string(),
                label: label.to_string(),
                kind,
                props,
                section: section.map(str::to_string),
            })
        }
        _ => Err(problems),
    }
}

/// Snapshot record of a node: `id`, `type`, `label`, typed attributes and props.
pub fn node_record(node: &Node) -> Value {
    let mut obj: Map<String, Value> = node
        .props
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    obj.insert("id".to_string(), Value::from(node.id.as_str()));
    obj.insert("type".to_string(), Value::from(node.node_type().as_str()));
    obj.insert("label".to_string(), Value::from(node.label.as_str()));
    match &node.kind {
        NodeKind::ControlFamily { framework_id } => {
            obj.insert("framework_id".to_string(), Value::from(framework_id.as_str()));
        }
        NodeKind::Control {
            family_id,
            framework_id,
        } => {
            obj.insert("family_id".to_string(), Value::from(family_id.as_str()));
            if let Some(fw) = framework_id {
                obj.insert("framework_id".to_string(), Value::from(fw.as_str()));
            }
        }
        NodeKind::Baseline {
            framework_id,
            level_ordinal,
        } => {
            if let Some(fw) = framework_id {
                obj.insert("framework_id".to_string(), Value::from(fw.as_str()));
            }
            obj.insert("level_ordinal".to_string(), Value::from(*level_ordinal));
        }
        NodeKind::ServiceModel { stack_position } => {
            obj.insert("stack_position".to_string(), Value::from(*stack_position));
        }
        NodeKind::Framework | NodeKind::EvidenceType | NodeKind::DocumentType => {}
    }
    Value::Object(obj)
}

/// Snapshot record of an edge: `s`, `p`, `o`, `confidence` and non-empty `meta`.
pub fn edge_record(edge: &Edge) -> Value {
    let mut obj = Map::new();
    obj.insert("s".to_string(), Value::from(edge.subject.as_str()));
    obj.insert("p".to_string(), Value::from(edge.predicate.as_str()));
    obj.insert("o".to_string(), Value::from(edge.object.as_str()));
    obj.insert("confidence".to_string(), Value::from(edge.confidence));
    if !edge.meta.is_empty() {
        let meta = edge
            .meta
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
            .collect();
        obj.insert("meta".to_string(), Value::Object(meta));
    }
    Value::Object(obj)
}

/// Candidate nodes and edges produced by an extraction run, awaiting merge.
#[derive(Debug, Clone, Default)]
pub struct CandidateBatch {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct CandidateEdge {
    plane: String,
    s: String,
    p: String,
    o: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    meta: BTreeMap<String, MetaValue>,
    #[serde(default)]
    section: Option<String>,
}

impl CandidateBatch {
    /// Parse `{"nodes": [...], "edges": [...]}`.
    ///
    /// Candidate edges name their plane explicitly. An edge without a
    /// confidence takes it from a `coverage` label in its meta, else `1.0`.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let doc: Value = serde_json::from_str(json)?;
        let mut problems = Vec::new();
        let mut batch = CandidateBatch::default();

        let empty = Vec::new();
        let node_records = doc.get("nodes").and_then(Value::as_array).unwrap_or(&empty);
        for (i, record) in node_records.iter().enumerate() {
            let at = format!("nodes[{}]", i);
            match node_from_record(record, None, None, &at) {
                Ok(mut node) => {
                    if let Some(Value::String(section)) = node.props.remove("section") {
                        node.section = Some(section);
                    }
                    batch.nodes.push(node);
                }
                Err(errs) => problems.extend(errs),
            }
        }

        let edge_records = doc.get("edges").and_then(Value::as_array).unwrap_or(&empty);
        for (i, record) in edge_records.iter().enumerate() {
            let at = format!("edges[{}]", i);
            let candidate = match CandidateEdge::deserialize(record) {
                Ok(c) => c,
                Err(e) => {
                    problems.push(format!("{}: {}", at, e));
                    continue;
                }
            };
            let plane = match candidate.plane.parse::<Plane>() {
                Ok(p) => p,
                Err(e) => {
                    problems.push(format!("{}: {}", at, e));
                    continue;
                }
            };
            let confidence = candidate.confidence.unwrap_or_else(|| {
                candidate
                    .meta
                    .get("coverage")
                    .and_then(MetaValue::as_str)
                    .map_or(1.0, coverage_to_confidence)
            });
            let mut edge = Edge::new(plane, candidate.s, candidate.p, candidate.o, confidence);
            edge.meta = candidate.meta;
            if let Some(section) = candidate.section {
                edge.section = section;
            }
            batch.edges.push(edge);
        }

        if !problems.is_empty() {
            return Err(SnapshotError::Malformed { problems });
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            nodes: json!({
                "_meta": {"node_count": 4, "revision_id": "grc-kg-rev-001", "generator": "seed"},
                "frameworks": [
                    {"id": "NIST-800-53", "type": "Framework", "label": "NIST SP 800-53", "version": "5"}
                ],
                "control_families": {
                    "nist_800_53": [
                        {"id": "NIST-AC", "type": "ControlFamily", "label": "Access Control", "framework_id": "NIST-800-53"}
                    ]
                },
                "controls": {
                    "nist_800_53": [
                        {"id": "NIST-AC-2", "type": "Control", "label": "Account Management", "family_id": "NIST-AC"}
                    ]
                },
                "service_models": [
                    {"id": "SM-SAAS", "type": "ServiceModel", "label": "SaaS", "stack_position": 3}
                ]
            }),
            edges: json!({
                "_meta": {"edge_count": 2},
                "plane_compliance": {
                    "framework_to_family": [
                        {"s": "NIST-800-53", "p": "CONTAINS", "o": "NIST-AC", "confidence": 1.0}
                    ],
                    "family_to_control": [
                        {"s": "NIST-AC", "p": "CONTAINS", "o": "NIST-AC-2"}
                    ]
                }
            }),
        }
    }

    #[test]
    fn test_load_sample() {
        let store = GraphStore::load(&sample_snapshot()).unwrap();
        assert_eq!(store.node_count(), 4);
        assert_eq!(store.edge_count(), 2);
        assert_eq!(store.meta().revision_id.as_deref(), Some("grc-kg-rev-001"));

        let fw = store.node("NIST-800-53").unwrap();
        assert_eq!(fw.props.get("version"), Some(&json!("5")));
        let sm = store.node("SM-SAAS").unwrap();
        assert_eq!(sm.stack_position(), Some(3));

        // Missing confidence defaults to 1.0
        let contains = store.outgoing("NIST-AC");
        assert_eq!(contains[0].confidence, 1.0);
        assert_eq!(contains[0].section, "family_to_control");
    }

    #[test]
    fn test_load_collects_all_problems() {
        let snapshot = Snapshot {
            nodes: json!({
                "frameworks": [
                    {"type": "Framework", "label": "no id"},
                    {"id": "X", "type": "Regulation", "label": "bad tag"}
                ],
                "controls": {"misc": [{"id": "C", "type": "Control", "label": "no family"}]}
            }),
            edges: json!({
                "plane_orbital": {},
                "plane_mapping": {"m": [{"s": "A", "p": "MAPS_TO"}]}
            }),
        };
        let err = GraphStore::load(&snapshot).unwrap_err();
        let SnapshotError::Malformed { problems } = err else {
            panic!("expected malformed snapshot");
        };
        assert_eq!(problems.len(), 5, "{:?}", problems);
        assert!(problems.iter().any(|p| p.contains("missing field 'id'")));
        assert!(problems.iter().any(|p| p.contains("Regulation")));
        assert!(problems.iter().any(|p| p.contains("family_id")));
        assert!(problems.iter().any(|p| p.contains("plane_orbital")));
        assert!(problems.iter().any(|p| p.starts_with("plane_mapping.m[0]")));
    }

    #[test]
    fn test_wrong_collection_is_rejected() {
        let snapshot = Snapshot {
            nodes: json!({"frameworks": [{"id": "E", "type": "EvidenceType", "label": "Logs"}]}),
            edges: json!({}),
        };
        assert!(matches!(
            GraphStore::load(&snapshot),
            Err(SnapshotError::Malformed { .. })
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = GraphStore::load(&sample_snapshot()).unwrap();
        let reloaded = GraphStore::load(&store.to_snapshot()).unwrap();
        assert_eq!(reloaded.nodes().len(), store.nodes().len());
        assert_eq!(reloaded.all_edges(), store.all_edges());
        assert_eq!(reloaded.node("NIST-AC-2"), store.node("NIST-AC-2"));
        assert_eq!(
            reloaded.meta().nodes_extra.get("generator"),
            Some(&json!("seed"))
        );
    }

    #[test]
    fn test_to_snapshot_refreshes_counts() {
        let mut store = GraphStore::load(&sample_snapshot()).unwrap();
        store.merge_nodes([Node::framework("SOC2", "SOC 2")]);
        let snapshot = store.to_snapshot();
        assert_eq!(snapshot.nodes["_meta"]["node_count"], json!(5));
        assert_eq!(snapshot.edges["_meta"]["edge_count"], json!(2));
    }

    #[test]
    fn test_candidate_batch_coverage_confidence() {
        let json = r#"{
            "nodes": [{"id": "SOC2-CC6.1", "type": "Control", "label": "Logical access", "family_id": "SOC2-CC6", "section": "soc2"}],
            "edges": [
                {"plane": "MAPPING", "s": "NIST-AC-2", "p": "MAPS_TO", "o": "SOC2-CC6.1", "meta": {"coverage": "Partial"}},
                {"plane": "plane_mapping", "s": "NIST-AC-3", "p": "MAPS_TO", "o": "SOC2-CC6.1"}
            ]
        }"#;
        let batch = CandidateBatch::from_json(json).unwrap();
        assert_eq!(batch.nodes[0].section.as_deref(), Some("soc2"));
        assert!(!batch.nodes[0].props.contains_key("section"));
        assert_eq!(batch.edges[0].confidence, 0.80);
        assert_eq!(batch.edges[1].confidence, 1.0);
        assert_eq!(batch.edges[1].plane, Plane::Mapping);
        assert_eq!(batch.edges[0].section, "maps_to");
    }
}
