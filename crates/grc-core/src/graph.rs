//! Graph data model for the GRC knowledge graph.
//!
//! Nodes are a sum type over the framework/control/baseline/... variants; edges are
//! typed triples filed into one of four planes. The [`GraphStore`] holds both,
//! keeps lookup indexes in sync, and applies additive merges.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Well-known predicate names used by the built-in schema.
pub mod predicates {
    pub const CONTAINS: &str = "CONTAINS";
    pub const MAPS_TO: &str = "MAPS_TO";
    pub const ASSIGNED_TO: &str = "ASSIGNED_TO";
    pub const REQUIRES_EVIDENCE: &str = "REQUIRES_EVIDENCE";
    pub const RESPONSIBILITY_OF: &str = "RESPONSIBILITY_OF";
    pub const DOCUMENTED_IN: &str = "DOCUMENTED_IN";
    pub const INHERITS_FROM: &str = "INHERITS_FROM";
}

/// The type tag of a node, without its variant attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Framework,
    ControlFamily,
    Control,
    Baseline,
    ServiceModel,
    EvidenceType,
    DocumentType,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::Framework,
        NodeType::ControlFamily,
        NodeType::Control,
        NodeType::Baseline,
        NodeType::ServiceModel,
        NodeType::EvidenceType,
        NodeType::DocumentType,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Framework => "Framework",
            Self::ControlFamily => "ControlFamily",
            Self::Control => "Control",
            Self::Baseline => "Baseline",
            Self::ServiceModel => "ServiceModel",
            Self::EvidenceType => "EvidenceType",
            Self::DocumentType => "DocumentType",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unrecognised node type '{}'", s))
    }
}

/// Variant-specific node attributes. Back-references are ids, never ownership.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Framework,
    ControlFamily {
        framework_id: String,
    },
    Control {
        family_id: String,
        framework_id: Option<String>,
    },
    Baseline {
        framework_id: Option<String>,
        level_ordinal: u32,
    },
    ServiceModel {
        /// Layer in the service stack; higher layers inherit from lower ones.
        stack_position: i64,
    },
    EvidenceType,
    DocumentType,
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Framework => NodeType::Framework,
            Self::ControlFamily { .. } => NodeType::ControlFamily,
            Self::Control { .. } => NodeType::Control,
            Self::Baseline { .. } => NodeType::Baseline,
            Self::ServiceModel { .. } => NodeType::ServiceModel,
            Self::EvidenceType => NodeType::EvidenceType,
            Self::DocumentType => NodeType::DocumentType,
        }
    }
}

/// A graph node: id, label, typed attributes, and free-form snapshot properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    /// Extra snapshot attributes (`focus`, `description`, ...). Never load-bearing.
    pub props: BTreeMap<String, Value>,
    /// Snapshot section this node is filed under (families and controls only).
    pub section: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            props: BTreeMap::new(),
            section: None,
        }
    }

    pub fn framework(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, NodeKind::Framework)
    }

    pub fn family(
        id: impl Into<String>,
        label: impl Into<String>,
        framework_id: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            label,
            NodeKind::ControlFamily {
                framework_id: framework_id.into(),
            },
        )
    }

    pub fn control(
        id: impl Into<String>,
        label: impl Into<String>,
        family_id: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            label,
            NodeKind::Control {
                family_id: family_id.into(),
                framework_id: None,
            },
        )
    }

    pub fn service_model(
        id: impl Into<String>,
        label: impl Into<String>,
        stack_position: i64,
    ) -> Self {
        Self::new(id, label, NodeKind::ServiceModel { stack_position })
    }

    #[must_use]
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn stack_position(&self) -> Option<i64> {
        match self.kind {
            NodeKind::ServiceModel { stack_position } => Some(stack_position),
            _ => None,
        }
    }
}

/// A named partition of the edge set with its own predicate allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plane {
    Compliance,
    Mapping,
    Responsibility,
    Evidence,
}

impl Plane {
    pub const ALL: [Plane; 4] = [
        Plane::Compliance,
        Plane::Mapping,
        Plane::Responsibility,
        Plane::Evidence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliance => "COMPLIANCE",
            Self::Mapping => "MAPPING",
            Self::Responsibility => "RESPONSIBILITY",
            Self::Evidence => "EVIDENCE",
        }
    }

    /// Key of this plane in the edges snapshot document (`plane_mapping`).
    pub fn snapshot_key(self) -> String {
        format!("plane_{}", self.as_str().to_lowercase())
    }

    /// Key of this plane in the schema document (`PLANE-MAPPING`).
    pub fn schema_key(self) -> String {
        format!("PLANE-{}", self.as_str())
    }

    pub fn from_snapshot_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.snapshot_key() == key)
    }

    pub fn from_schema_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.schema_key() == key)
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plane {
    type Err = String;

    /// Accepts `MAPPING`, `mapping`, `plane_mapping` and `PLANE-MAPPING`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let bare = upper
            .strip_prefix("PLANE-")
            .or_else(|| upper.strip_prefix("PLANE_"))
            .unwrap_or(&upper);
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == bare)
            .ok_or_else(|| format!("unrecognised plane '{}'", s))
    }
}

/// A primitive metadata value attached to an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A directed, typed edge `(subject, predicate, object)` filed in one plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub meta: BTreeMap<String, MetaValue>,
    pub plane: Plane,
    /// Named group within the plane (e.g. `family_to_control`).
    pub section: String,
}

/// Identity of an edge for deduplication: plane plus triple.
pub type TripleKey = (Plane, String, String, String);

impl Edge {
    pub fn new(
        plane: Plane,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let predicate = predicate.into();
        let section = default_edge_section(&predicate);
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
            confidence,
            meta: BTreeMap::new(),
            plane,
            section,
        }
    }

    #[must_use]
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn triple_key(&self) -> TripleKey {
        (
            self.plane,
            self.subject.clone(),
            self.predicate.clone(),
            self.object.clone(),
        )
    }
}

/// Default edge section for a predicate: its lower-cased name.
pub fn default_edge_section(predicate: &str) -> String {
    predicate.to_lowercase()
}

/// Snapshot section key for a framework id: `NIST-800-53` -> `nist_800_53`.
pub fn section_key(framework_id: &str) -> String {
    framework_id.to_lowercase().replace(['-', ' ', '.'], "_")
}

/// `_meta` bookkeeping carried alongside a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub revision_id: Option<String>,
    pub node_count: usize,
    pub edge_count: usize,
    /// Unrecognised `_meta` keys from the nodes document, preserved on save.
    pub nodes_extra: BTreeMap<String, Value>,
    /// Unrecognised `_meta` keys from the edges document, preserved on save.
    pub edges_extra: BTreeMap<String, Value>,
}

/// Counts returned by merge operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub accepted: usize,
    pub skipped: usize,
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} accepted, {} skipped", self.accepted, self.skipped)
    }
}

/// In-memory typed graph: nodes, plane-filed edges and lookup indexes.
///
/// Insertion order is preserved. Duplicate node ids and duplicate triples can be
/// present after [`GraphStore::load`](crate::snapshot) of a defective snapshot; the
/// validator reports them. Merges never introduce either.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    /// Node id -> position of its first occurrence in `nodes`.
    node_index: HashMap<String, usize>,
    edges: Vec<Edge>,
    triple_index: HashSet<TripleKey>,
    /// Node id -> indices of edges where it is the subject.
    out_index: HashMap<String, Vec<usize>>,
    /// Node id -> indices of edges where it is the object.
    in_index: HashMap<String, Vec<usize>>,
    meta: SnapshotMeta,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node without any merge semantics. Used when loading snapshots.
    pub(crate) fn push_node(&mut self, node: Node) {
        let idx = self.nodes.len();
        self.node_index.entry(node.id.clone()).or_insert(idx);
        self.nodes.push(node);
    }

    /// Append an edge without any merge semantics. Used when loading snapshots.
    pub(crate) fn push_edge(&mut self, edge: Edge) {
        let idx = self.edges.len();
        self.triple_index.insert(edge.triple_key());
        self.out_index
            .entry(edge.subject.clone())
            .or_default()
            .push(idx);
        self.in_index.entry(edge.object.clone()).or_default().push(idx);
        self.edges.push(edge);
    }

    pub(crate) fn set_meta(&mut self, meta: SnapshotMeta) {
        self.meta = meta;
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    /// Stamp a revision id and recompute the `_meta` counts.
    pub fn stamp(&mut self, revision_id: impl Into<String>) {
        self.meta.revision_id = Some(revision_id.into());
        self.refresh_meta();
    }

    /// Recompute `_meta` node/edge counts from current state.
    pub fn refresh_meta(&mut self) {
        self.meta.node_count = self.node_count();
        self.meta.edge_count = self.edge_count();
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// All node records in insertion order (may include duplicate ids).
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Distinct node ids.
    pub fn all_node_ids(&self) -> BTreeSet<&str> {
        self.node_index.keys().map(String::as_str).collect()
    }

    /// All edges in insertion order.
    pub fn all_edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_in(&self, plane: Plane) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.plane == plane)
    }

    /// Number of distinct node ids.
    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Edges whose subject is `id`, in insertion order.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        self.edges_at(self.out_index.get(id))
    }

    /// Edges whose object is `id`, in insertion order.
    pub fn incoming(&self, id: &str) -> Vec<&Edge> {
        self.edges_at(self.in_index.get(id))
    }

    fn edges_at(&self, indices: Option<&Vec<usize>>) -> Vec<&Edge> {
        indices
            .map(|ids| ids.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    pub fn contains_triple(&self, plane: Plane, subject: &str, predicate: &str, object: &str) -> bool {
        self.triple_index.contains(&(
            plane,
            subject.to_string(),
            predicate.to_string(),
            object.to_string(),
        ))
    }

    /// Framework a node belongs to: its own id for a Framework, the `framework_id`
    /// attribute for families and baselines, and for controls the explicit
    /// `framework_id` or else the framework of their family.
    pub fn framework_of(&self, id: &str) -> Option<&str> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Framework => Some(node.id.as_str()),
            NodeKind::ControlFamily { framework_id } => Some(framework_id.as_str()),
            NodeKind::Control {
                framework_id: Some(fw),
                ..
            } => Some(fw.as_str()),
            NodeKind::Control {
                family_id,
                framework_id: None,
            } => self.node(family_id).and_then(|family| match &family.kind {
                NodeKind::ControlFamily { framework_id } => Some(framework_id.as_str()),
                _ => None,
            }),
            NodeKind::Baseline { framework_id, .. } => framework_id.as_deref(),
            _ => None,
        }
    }

    /// Edge counts keyed by plane.
    pub fn edge_counts_by_plane(&self) -> BTreeMap<Plane, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.plane).or_insert(0) += 1;
        }
        counts
    }

    /// Edge counts keyed by predicate.
    pub fn edge_counts_by_predicate(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.predicate.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Node counts keyed by type (distinct ids only).
    pub fn node_counts_by_type(&self) -> BTreeMap<NodeType, usize> {
        let mut counts = BTreeMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if self.node_index.get(&node.id) == Some(&i) {
                *counts.entry(node.node_type()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Merge candidate nodes. Existing ids win: a candidate whose id is already
    /// present is skipped. Accepted families and controls without a section are
    /// filed under their framework's section.
    pub fn merge_nodes(&mut self, candidates: impl IntoIterator<Item = Node>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for mut node in candidates {
            if self.contains_node(&node.id) {
                outcome.skipped += 1;
                continue;
            }
            if node.section.is_none() {
                node.section = self.default_node_section(&node);
            }
            self.push_node(node);
            outcome.accepted += 1;
        }
        tracing::debug!("merged nodes: {}", outcome);
        outcome
    }

    /// Merge candidate edges. A candidate whose `(plane, subject, predicate, object)`
    /// already exists, or appeared earlier in the same batch, is skipped.
    pub fn merge_edges(&mut self, candidates: impl IntoIterator<Item = Edge>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for edge in candidates {
            if self.triple_index.contains(&edge.triple_key()) {
                outcome.skipped += 1;
                continue;
            }
            self.push_edge(edge);
            outcome.accepted += 1;
        }
        tracing::debug!("merged edges: {}", outcome);
        outcome
    }

    fn default_node_section(&self, node: &Node) -> Option<String> {
        match &node.kind {
            NodeKind::ControlFamily { framework_id } => Some(section_key(framework_id)),
            NodeKind::Control {
                family_id,
                framework_id,
            } => {
                let framework = framework_id
                    .as_deref()
                    .or_else(|| self.framework_of(family_id));
                Some(framework.map_or_else(|| "unassigned".to_string(), section_key))
            }
            _ => None,
        }
    }
}
