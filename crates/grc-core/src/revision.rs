//! Content hashing, revision lifecycle and the publish gate.
//!
//! A [`RevisionManager`] issues monotonically increasing revision ids, drafts
//! immutable snapshots of a store, and publishes a draft only when the schema's
//! publish gate passes. The published revision sits behind an `RwLock` holding
//! an `Arc`, so readers always observe a complete revision.

use crate::graph::{Edge, GraphStore, Plane};
use crate::schema::{RevisionInfo, SchemaRegistry};
use crate::snapshot::{Snapshot, SnapshotError, edge_record, node_record};
use crate::validate::{ValidationReport, validate};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Revision id prefix used when none is configured.
pub const DEFAULT_REVISION_PREFIX: &str = "grc-kg-rev";

const PUBLISH_GATE_NAME: &str = "publish_gate";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevisionError {
    #[error("invalid revision id '{0}': expected <prefix>-<sequence>")]
    InvalidId(String),
    #[error("unknown revision status '{0}'")]
    UnknownStatus(String),
    #[error("revision {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: RevisionStatus,
        to: RevisionStatus,
    },
    #[error("revision {id} is older than published revision {current}")]
    Superseded { id: String, current: String },
    #[error("revision {0} not found")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

/// SHA-256 digests of the canonical node and edge collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    pub nodes: String,
    pub edges: String,
}

impl ContentHash {
    /// Single digest over both collection digests.
    pub fn combined(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.nodes.as_bytes());
        hasher.update(b":");
        hasher.update(self.edges.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nodes:{} edges:{}", self.nodes, self.edges)
    }
}

/// Serialize a JSON value with sorted keys and no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn edge_hash_record(edge: &Edge) -> Value {
    let mut record = edge_record(edge);
    if let Value::Object(obj) = &mut record {
        obj.insert("plane".to_string(), Value::from(edge.plane.as_str()));
    }
    record
}

/// Digest of a sorted list of canonical records, hashed as one JSON array.
fn digest_records(mut records: Vec<String>) -> String {
    records.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(b"[");
    for (i, r) in records.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(r.as_bytes());
    }
    hasher.update(b"]");
    hex::encode(hasher.finalize())
}

/// Content hash of a store. Independent of insertion order, sections and `_meta`.
pub fn content_hash(store: &GraphStore) -> ContentHash {
    let nodes = store
        .nodes()
        .par_iter()
        .map(|n| canonical_json(&node_record(n)))
        .collect();
    let edges = store
        .all_edges()
        .par_iter()
        .map(|e| canonical_json(&edge_hash_record(e)))
        .collect();
    ContentHash {
        nodes: digest_records(nodes),
        edges: digest_records(edges),
    }
}

/// Content hash of persisted snapshot documents.
pub fn snapshot_hash(snapshot: &Snapshot) -> Result<ContentHash, SnapshotError> {
    Ok(content_hash(&GraphStore::load(snapshot)?))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionStatus {
    Draft,
    Published,
    Archived,
}

impl RevisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// The only state this one may move to.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Published),
            Self::Published => Some(Self::Archived),
            Self::Archived => None,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }
}

impl fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevisionStatus {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(RevisionError::UnknownStatus(other.to_string())),
        }
    }
}

/// `<prefix>-<seq>` revision identifier, ordered by sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RevisionId {
    prefix: String,
    seq: u64,
}

impl RevisionId {
    pub fn new(prefix: impl Into<String>, seq: u64) -> Self {
        Self {
            prefix: prefix.into(),
            seq,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Ord for RevisionId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.prefix.cmp(&other.prefix))
    }
}

impl PartialOrd for RevisionId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.prefix, self.seq)
    }
}

impl FromStr for RevisionId {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RevisionError::InvalidId(s.to_string());
        let (prefix, seq) = s.rsplit_once('-').ok_or_else(invalid)?;
        if prefix.is_empty() || seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let seq = seq.parse().map_err(|_| invalid())?;
        Ok(Self::new(prefix, seq))
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for RevisionId {
    type Error = RevisionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ---------------------------------------------------------------------------
// Publish gate
// ---------------------------------------------------------------------------

/// Thresholds a draft must meet before it can be published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishGate {
    pub min_nodes: usize,
    pub min_edges: usize,
    pub max_validation_errors: usize,
    /// Minimum edge count per plane, keyed by plane name (`MAPPING` or `PLANE-MAPPING`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub min_plane_edges: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub min_predicate_edges: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateOutcome {
    pub gate: String,
    pub passed: bool,
    pub failures: Vec<String>,
    pub report: ValidationReport,
}

impl PublishGate {
    /// Evaluate the gate for `store` given its validation report.
    pub fn evaluate(&self, store: &GraphStore, report: ValidationReport) -> GateOutcome {
        let mut failures = Vec::new();

        if report.node_count < self.min_nodes {
            failures.push(format!(
                "node count {} below minimum {}",
                report.node_count, self.min_nodes
            ));
        }
        if report.edge_count < self.min_edges {
            failures.push(format!(
                "edge count {} below minimum {}",
                report.edge_count, self.min_edges
            ));
        }
        if report.errors.len() > self.max_validation_errors {
            failures.push(format!(
                "{} validation error(s), at most {} allowed",
                report.errors.len(),
                self.max_validation_errors
            ));
        }

        if !self.min_plane_edges.is_empty() {
            let by_plane = store.edge_counts_by_plane();
            for (key, &min) in &self.min_plane_edges {
                match key.parse::<Plane>() {
                    Ok(plane) => {
                        let count = by_plane.get(&plane).copied().unwrap_or(0);
                        if count < min {
                            failures.push(format!(
                                "plane {} has {} edge(s), minimum {}",
                                plane, count, min
                            ));
                        }
                    }
                    Err(e) => failures.push(format!("gate configuration: {}", e)),
                }
            }
        }

        if !self.min_predicate_edges.is_empty() {
            let by_predicate = store.edge_counts_by_predicate();
            for (predicate, &min) in &self.min_predicate_edges {
                let count = by_predicate.get(predicate).copied().unwrap_or(0);
                if count < min {
                    failures.push(format!(
                        "predicate {} has {} edge(s), minimum {}",
                        predicate, count, min
                    ));
                }
            }
        }

        GateOutcome {
            gate: PUBLISH_GATE_NAME.to_string(),
            passed: failures.is_empty(),
            failures,
            report,
        }
    }
}

/// Validate `store` and run the schema's publish gate over the result.
pub fn publish_gate(store: &GraphStore, schema: &SchemaRegistry) -> GateOutcome {
    let report = validate(store, schema);
    schema.publish_gate().evaluate(store, report)
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// An immutable snapshot of the graph at one point in its lifecycle.
#[derive(Debug, Clone)]
pub struct Revision {
    pub id: RevisionId,
    pub status: RevisionStatus,
    pub created_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub hash: ContentHash,
    store: Arc<GraphStore>,
}

/// History entry for an issued revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionRecord {
    pub id: RevisionId,
    pub status: RevisionStatus,
    pub created_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub hash: ContentHash,
}

impl Revision {
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Shared handle to the snapshot, for readers that outlive this revision.
    pub fn shared_store(&self) -> Arc<GraphStore> {
        Arc::clone(&self.store)
    }

    pub fn record(&self) -> RevisionRecord {
        RevisionRecord {
            id: self.id.clone(),
            status: self.status,
            created_at: self.created_at,
            summary: self.summary.clone(),
            hash: self.hash.clone(),
        }
    }

    /// Descriptor stored as the schema's `current_revision`.
    pub fn info(&self) -> RevisionInfo {
        RevisionInfo {
            revision_id: self.id.to_string(),
            status: self.status.to_string(),
            created_at: Some(self.created_at.to_rfc3339()),
            summary: self.summary.clone(),
        }
    }

    fn transition(&mut self, to: RevisionStatus) -> Result<(), RevisionError> {
        if !self.status.can_transition_to(to) {
            return Err(RevisionError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Result of [`RevisionManager::publish`].
#[derive(Debug)]
pub enum PublishOutcome {
    Published(Arc<Revision>),
    /// The gate failed; the draft is handed back unchanged.
    Rejected { draft: Revision, gate: GateOutcome },
}

/// Issues revision ids and owns the globally visible published revision.
#[derive(Debug)]
pub struct RevisionManager {
    prefix: String,
    next_seq: AtomicU64,
    current: RwLock<Option<Arc<Revision>>>,
    archived: Mutex<Vec<Arc<Revision>>>,
    history: Mutex<BTreeMap<u64, RevisionRecord>>,
}

impl Default for RevisionManager {
    fn default() -> Self {
        Self::new(DEFAULT_REVISION_PREFIX)
    }
}

impl RevisionManager {
    /// Fresh manager; the first issued id has sequence 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix.into(), 1)
    }

    /// Manager that continues after an already-issued id.
    pub fn resume_after(last: &RevisionId) -> Self {
        Self::starting_at(last.prefix().to_string(), last.seq() + 1)
    }

    /// Issue ids with `prefix`, continuing after the sequence number of the
    /// schema's current revision when it has a parsable id.
    pub fn for_schema(schema: &SchemaRegistry, prefix: &str) -> Self {
        match schema
            .current_revision()
            .map(|info| info.revision_id.parse::<RevisionId>())
        {
            Some(Ok(last)) => {
                if last.prefix() != prefix {
                    tracing::warn!(
                        "current revision {} uses prefix {}, continuing with {}",
                        last,
                        last.prefix(),
                        prefix
                    );
                }
                Self::starting_at(prefix.to_string(), last.seq() + 1)
            }
            Some(Err(e)) => {
                tracing::warn!("ignoring current revision: {}", e);
                Self::new(prefix)
            }
            None => Self::new(prefix),
        }
    }

    fn starting_at(prefix: String, seq: u64) -> Self {
        Self {
            prefix,
            next_seq: AtomicU64::new(seq),
            current: RwLock::new(None),
            archived: Mutex::new(Vec::new()),
            history: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock_history(&self) -> MutexGuard<'_, BTreeMap<u64, RevisionRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue the next revision id. Ids are never reused.
    pub fn next_id(&self) -> RevisionId {
        RevisionId::new(
            self.prefix.clone(),
            self.next_seq.fetch_add(1, Ordering::SeqCst),
        )
    }

    /// Freeze `store` into a new draft revision, stamping its `_meta`.
    pub fn create_draft(&self, mut store: GraphStore, summary: Option<String>) -> Revision {
        let id = self.next_id();
        store.stamp(id.to_string());
        let revision = Revision {
            hash: content_hash(&store),
            id,
            status: RevisionStatus::Draft,
            created_at: Utc::now(),
            summary,
            store: Arc::new(store),
        };
        self.lock_history()
            .insert(revision.id.seq(), revision.record());
        tracing::debug!("drafted revision {}", revision.id);
        revision
    }

    /// Run the publish gate and, if it passes, make `draft` the published
    /// revision. The previously published revision is archived.
    pub fn publish(
        &self,
        mut draft: Revision,
        schema: &SchemaRegistry,
    ) -> Result<PublishOutcome, RevisionError> {
        if draft.status != RevisionStatus::Draft {
            return Err(RevisionError::InvalidTransition {
                id: draft.id.to_string(),
                from: draft.status,
                to: RevisionStatus::Published,
            });
        }
        if let Some(current) = self.current()
            && current.id >= draft.id
        {
            return Err(RevisionError::Superseded {
                id: draft.id.to_string(),
                current: current.id.to_string(),
            });
        }

        let gate = publish_gate(draft.store(), schema);
        if !gate.passed {
            tracing::warn!(
                "revision {} failed {}: {}",
                draft.id,
                gate.gate,
                gate.failures.join("; ")
            );
            return Ok(PublishOutcome::Rejected { draft, gate });
        }

        // The check above is advisory; the swap re-checks under the write lock.
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(newer) = current.as_ref()
            && newer.id >= draft.id
        {
            return Err(RevisionError::Superseded {
                id: draft.id.to_string(),
                current: newer.id.to_string(),
            });
        }
        draft.transition(RevisionStatus::Published)?;
        let published = Arc::new(draft);
        let previous = current.replace(Arc::clone(&published));

        let mut history = self.lock_history();
        history.insert(published.id.seq(), published.record());
        if let Some(previous) = previous {
            let mut archived = Revision::clone(&previous);
            archived.transition(RevisionStatus::Archived)?;
            history.insert(archived.id.seq(), archived.record());
            tracing::debug!("archived revision {}", archived.id);
            self.archived
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Arc::new(archived));
        }
        drop(history);
        drop(current);

        tracing::info!(
            "published revision {} ({} nodes, {} edges)",
            published.id,
            published.store().node_count(),
            published.store().edge_count()
        );
        Ok(PublishOutcome::Published(published))
    }

    /// The currently published revision, if any.
    pub fn current(&self) -> Option<Arc<Revision>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a revision newer than `seen` has been published.
    pub fn is_stale(&self, seen: &RevisionId) -> bool {
        self.current().is_some_and(|current| current.id > *seen)
    }

    /// Look up a published or archived revision.
    pub fn revision(&self, id: &RevisionId) -> Result<Arc<Revision>, RevisionError> {
        if let Some(current) = self.current()
            && current.id == *id
        {
            return Ok(current);
        }
        self.archived
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == *id)
            .cloned()
            .ok_or_else(|| RevisionError::NotFound(id.to_string()))
    }

    /// Every issued revision, ordered by id.
    pub fn history(&self) -> Vec<RevisionRecord> {
        self.lock_history().values().cloned().collect()
    }
}
