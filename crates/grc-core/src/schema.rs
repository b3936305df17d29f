//! Schema document and the registry built from it.
//!
//! The schema declares predicates, per-plane allowlists, retrieval templates,
//! scoring parameters, the hub framework and the revision gates. The registry is
//! read-only once built; a validation or query cycle holds it by reference.

use crate::graph::{GraphStore, NodeType, Plane};
use crate::revision::PublishGate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Schema shipped with the crate.
pub const DEFAULT_SCHEMA: &str = include_str!("default_schema.json");

const LIFECYCLE: [&str; 3] = ["draft", "published", "archived"];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognised plane '{0}' in schema")]
    UnknownPlane(String),
    #[error("{context} references undeclared predicate '{predicate}'")]
    UndeclaredPredicate { context: String, predicate: String },
    #[error("template '{0}' has no steps")]
    EmptyTemplate(String),
    #[error("invalid scoring configuration: {0}")]
    InvalidScoring(String),
    #[error("invalid lifecycle {0:?}: expected draft -> published -> archived")]
    InvalidLifecycle(Vec<String>),
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Declaration of one predicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredicateDef {
    #[serde(default)]
    pub description: String,
    /// Allowed `(subject type, object type)` pairs. Empty means unconstrained.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_pairs: Vec<(NodeType, NodeType)>,
    /// At least one endpoint must belong to the hub framework.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hub_routed: bool,
    /// Subject must sit strictly above object in the service stack.
    #[serde(default, skip_serializing_if = "is_false")]
    pub stack_ordered: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneDef {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub predicates_allowed: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
    #[serde(default)]
    pub description: String,
    /// Step predicates in traversal order; `^` prefix walks an edge backwards.
    #[serde(default)]
    pub predicates_ordered: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Retrieval scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub edge_weights: BTreeMap<String, f64>,
    pub min_path_score: f64,
    pub max_depth: usize,
    pub jaccard_dedup_threshold: f64,
    /// Multiplier applied once per hop beyond the first.
    pub length_penalty: f64,
    /// Weight of predicates missing from `edge_weights`.
    pub default_edge_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            edge_weights: BTreeMap::new(),
            min_path_score: 0.3,
            max_depth: 4,
            jaccard_dedup_threshold: 0.8,
            length_penalty: 0.9,
            default_edge_weight: 0.5,
        }
    }
}

/// The hub framework all cross-framework mappings route through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub framework_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            framework_id: "NIST-800-53".to_string(),
            id_prefix: Some("NIST-".to_string()),
        }
    }
}

/// Descriptor of the currently published revision, kept in the schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub revision_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gates {
    pub publish_gate: PublishGate,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<RevisionInfo>,
    pub lifecycle: Vec<String>,
    pub gates: Gates,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for RevisionLayer {
    fn default() -> Self {
        Self {
            current_revision: None,
            lifecycle: LIFECYCLE.iter().map(|s| (*s).to_string()).collect(),
            gates: Gates::default(),
            extra: BTreeMap::new(),
        }
    }
}

/// The persisted schema document (`schema.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub node_types: BTreeMap<String, Value>,
    pub predicates: BTreeMap<String, PredicateDef>,
    pub planes: BTreeMap<String, PlaneDef>,
    pub templates: BTreeMap<String, TemplateDef>,
    pub scoring: ScoringConfig,
    pub hub: HubConfig,
    pub revision_layer: RevisionLayer,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Traversal direction of a template step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// subject -> object
    Forward,
    /// object -> subject
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateStep {
    pub predicate: String,
    pub direction: Direction,
}

impl TemplateStep {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('^') {
            Some(predicate) => Self {
                predicate: predicate.to_string(),
                direction: Direction::Inverse,
            },
            None => Self {
                predicate: raw.to_string(),
                direction: Direction::Forward,
            },
        }
    }
}

impl fmt::Display for TemplateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Forward => f.write_str(&self.predicate),
            Direction::Inverse => write!(f, "^{}", self.predicate),
        }
    }
}

/// A named, ordered predicate sequence that constrains retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub name: String,
    pub description: String,
    pub steps: Vec<TemplateStep>,
}

/// Read-only view over a consistency-checked [`SchemaDocument`].
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    doc: SchemaDocument,
    allowlists: BTreeMap<Plane, BTreeSet<String>>,
    templates: BTreeMap<String, Template>,
}

impl SchemaRegistry {
    /// Registry over the embedded default schema.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_json(DEFAULT_SCHEMA)
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Self::from_document(SchemaDocument::from_json(json)?)
    }

    /// Check the document for internal consistency and build lookup tables.
    pub fn from_document(doc: SchemaDocument) -> Result<Self, SchemaError> {
        let mut allowlists = BTreeMap::new();
        for (key, plane_def) in &doc.planes {
            let plane = Plane::from_schema_key(key)
                .or_else(|| key.parse().ok())
                .ok_or_else(|| SchemaError::UnknownPlane(key.clone()))?;
            for predicate in &plane_def.predicates_allowed {
                if !doc.predicates.contains_key(predicate) {
                    return Err(SchemaError::UndeclaredPredicate {
                        context: format!("plane {}", key),
                        predicate: predicate.clone(),
                    });
                }
            }
            allowlists.insert(
                plane,
                plane_def.predicates_allowed.iter().cloned().collect(),
            );
        }

        let mut templates = BTreeMap::new();
        for (name, def) in &doc.templates {
            if def.predicates_ordered.is_empty() {
                return Err(SchemaError::EmptyTemplate(name.clone()));
            }
            let steps: Vec<TemplateStep> = def
                .predicates_ordered
                .iter()
                .map(|raw| TemplateStep::parse(raw))
                .collect();
            if let Some(step) = steps
                .iter()
                .find(|s| !doc.predicates.contains_key(&s.predicate))
            {
                return Err(SchemaError::UndeclaredPredicate {
                    context: format!("template {}", name),
                    predicate: step.predicate.clone(),
                });
            }
            templates.insert(
                name.clone(),
                Template {
                    name: name.clone(),
                    description: def.description.clone(),
                    steps,
                },
            );
        }

        check_scoring(&doc.scoring)?;

        if !doc.revision_layer.lifecycle.is_empty()
            && doc.revision_layer.lifecycle.iter().map(String::as_str).ne(LIFECYCLE)
        {
            return Err(SchemaError::InvalidLifecycle(
                doc.revision_layer.lifecycle.clone(),
            ));
        }

        for predicate in doc.predicates.keys() {
            if !doc.scoring.edge_weights.contains_key(predicate) {
                tracing::warn!(
                    "predicate {} has no edge weight, using default {}",
                    predicate,
                    doc.scoring.default_edge_weight
                );
            }
        }
        for predicate in doc.scoring.edge_weights.keys() {
            if !doc.predicates.contains_key(predicate) {
                tracing::warn!("edge weight declared for unknown predicate {}", predicate);
            }
        }

        Ok(Self {
            doc,
            allowlists,
            templates,
        })
    }

    pub fn document(&self) -> &SchemaDocument {
        &self.doc
    }

    pub fn into_document(self) -> SchemaDocument {
        self.doc
    }

    pub fn is_valid_predicate(&self, predicate: &str) -> bool {
        self.doc.predicates.contains_key(predicate)
    }

    pub fn predicate(&self, predicate: &str) -> Option<&PredicateDef> {
        self.doc.predicates.get(predicate)
    }

    /// Predicates permitted in `plane`. A plane missing from the schema allows none.
    pub fn allowed_predicates(&self, plane: Plane) -> impl Iterator<Item = &str> {
        self.allowlists
            .get(&plane)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn is_allowed_in(&self, plane: Plane, predicate: &str) -> bool {
        self.allowlists
            .get(&plane)
            .is_some_and(|set| set.contains(predicate))
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// All templates, ordered by name.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    /// Scoring weight of a predicate, falling back to `default_edge_weight`.
    pub fn weight(&self, predicate: &str) -> f64 {
        self.doc
            .scoring
            .edge_weights
            .get(predicate)
            .copied()
            .unwrap_or(self.doc.scoring.default_edge_weight)
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.doc.scoring
    }

    pub fn hub(&self) -> &HubConfig {
        &self.doc.hub
    }

    pub fn publish_gate(&self) -> &PublishGate {
        &self.doc.revision_layer.gates.publish_gate
    }

    pub fn current_revision(&self) -> Option<&RevisionInfo> {
        self.doc.revision_layer.current_revision.as_ref()
    }

    /// Whether `id` resolves into the hub framework, or carries the hub id prefix.
    pub fn is_hub_endpoint(&self, store: &GraphStore, id: &str) -> bool {
        let hub = &self.doc.hub;
        store.framework_of(id) == Some(hub.framework_id.as_str())
            || hub
                .id_prefix
                .as_deref()
                .is_some_and(|prefix| !prefix.is_empty() && id.starts_with(prefix))
    }
}

fn check_scoring(scoring: &ScoringConfig) -> Result<(), SchemaError> {
    let unit = 0.0..=1.0;
    if !unit.contains(&scoring.min_path_score) {
        return Err(SchemaError::InvalidScoring(format!(
            "min_path_score {} outside [0, 1]",
            scoring.min_path_score
        )));
    }
    if !unit.contains(&scoring.jaccard_dedup_threshold) {
        return Err(SchemaError::InvalidScoring(format!(
            "jaccard_dedup_threshold {} outside [0, 1]",
            scoring.jaccard_dedup_threshold
        )));
    }
    if !(scoring.length_penalty > 0.0 && scoring.length_penalty <= 1.0) {
        return Err(SchemaError::InvalidScoring(format!(
            "length_penalty {} outside (0, 1]",
            scoring.length_penalty
        )));
    }
    if scoring.max_depth == 0 {
        return Err(SchemaError::InvalidScoring(
            "max_depth must be at least 1".to_string(),
        ));
    }
    let bad_weight = |w: f64| !w.is_finite() || w < 0.0;
    if bad_weight(scoring.default_edge_weight) {
        return Err(SchemaError::InvalidScoring(format!(
            "default_edge_weight {} must be a non-negative number",
            scoring.default_edge_weight
        )));
    }
    if let Some((predicate, w)) = scoring.edge_weights.iter().find(|(_, w)| bad_weight(**w)) {
        return Err(SchemaError::InvalidScoring(format!(
            "edge weight {} for {} must be a non-negative number",
            w, predicate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_from(value: Value) -> SchemaDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_builtin_schema_loads() {
        let schema = SchemaRegistry::builtin().unwrap();
        assert!(schema.is_valid_predicate("MAPS_TO"));
        assert!(!schema.is_valid_predicate("OWNS"));
        assert!(schema.is_allowed_in(Plane::Mapping, "MAPS_TO"));
        assert!(!schema.is_allowed_in(Plane::Compliance, "REQUIRES_EVIDENCE"));
        assert_eq!(schema.weight("MAPS_TO"), 0.9);
        assert_eq!(schema.scoring().max_depth, 4);
        assert_eq!(
            schema.template("evidence_chain").unwrap().steps.len(),
            2
        );
        let contains = schema.predicate("CONTAINS").unwrap();
        assert_eq!(contains.type_pairs.len(), 3);
        assert!(schema.predicate("MAPS_TO").unwrap().hub_routed);
        assert!(schema.predicate("INHERITS_FROM").unwrap().stack_ordered);
    }

    #[test]
    fn test_inverse_template_steps() {
        let schema = SchemaRegistry::builtin().unwrap();
        let tpl = schema.template("mapped_from").unwrap();
        assert_eq!(tpl.steps[0].predicate, "MAPS_TO");
        assert_eq!(tpl.steps[0].direction, Direction::Inverse);
        assert_eq!(tpl.steps[0].to_string(), "^MAPS_TO");
    }

    #[test]
    fn test_weight_falls_back_to_default() {
        let doc = doc_from(json!({
            "predicates": {"OWNS": {}},
            "planes": {"PLANE-COMPLIANCE": {"predicates_allowed": ["OWNS"]}},
            "scoring": {"default_edge_weight": 0.4}
        }));
        let schema = SchemaRegistry::from_document(doc).unwrap();
        assert_eq!(schema.weight("OWNS"), 0.4);
        assert_eq!(schema.allowed_predicates(Plane::Compliance).count(), 1);
        assert_eq!(schema.allowed_predicates(Plane::Mapping).count(), 0);
    }

    #[test]
    fn test_template_with_undeclared_predicate_rejected() {
        let doc = doc_from(json!({
            "predicates": {"MAPS_TO": {}},
            "templates": {"broken": {"predicates_ordered": ["MAPS_TO", "^OWNS"]}}
        }));
        let err = SchemaRegistry::from_document(doc).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UndeclaredPredicate { ref predicate, .. } if predicate == "OWNS"
        ));
    }

    #[test]
    fn test_plane_allowlist_with_undeclared_predicate_rejected() {
        let doc = doc_from(json!({
            "planes": {"PLANE-MAPPING": {"predicates_allowed": ["MAPS_TO"]}}
        }));
        assert!(matches!(
            SchemaRegistry::from_document(doc),
            Err(SchemaError::UndeclaredPredicate { .. })
        ));
    }

    #[test]
    fn test_unknown_plane_rejected() {
        let doc = doc_from(json!({"planes": {"PLANE-ORBITAL": {}}}));
        assert!(matches!(
            SchemaRegistry::from_document(doc),
            Err(SchemaError::UnknownPlane(_))
        ));
    }

    #[test]
    fn test_out_of_range_scoring_rejected() {
        for scoring in [
            json!({"min_path_score": 1.5}),
            json!({"jaccard_dedup_threshold": -0.1}),
            json!({"length_penalty": 0.0}),
            json!({"max_depth": 0}),
            json!({"edge_weights": {"X": -1.0}}),
        ] {
            let doc = doc_from(json!({"scoring": scoring}));
            assert!(
                matches!(
                    SchemaRegistry::from_document(doc),
                    Err(SchemaError::InvalidScoring(_))
                ),
                "accepted {}",
                scoring
            );
        }
    }

    #[test]
    fn test_lifecycle_must_be_linear() {
        let doc = doc_from(json!({
            "revision_layer": {"lifecycle": ["draft", "archived", "published"]}
        }));
        assert!(matches!(
            SchemaRegistry::from_document(doc),
            Err(SchemaError::InvalidLifecycle(_))
        ));
    }

    #[test]
    fn test_document_round_trip_keeps_unknown_keys() {
        let doc = doc_from(json!({
            "predicates": {"MAPS_TO": {"description": "x", "cardinality": "many"}},
            "provenance": {"source": "seed"}
        }));
        let json = doc.to_json().unwrap();
        let back = SchemaDocument::from_json(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.extra["provenance"]["source"], json!("seed"));
        assert_eq!(
            back.predicates["MAPS_TO"].extra["cardinality"],
            json!("many")
        );
    }

    #[test]
    fn test_hub_endpoint() {
        use crate::graph::Node;
        let mut store = GraphStore::new();
        store.merge_nodes([
            Node::framework("NIST-800-53", "NIST"),
            Node::family("AC", "Access Control", "NIST-800-53"),
            Node::control("AC-2", "Account Management", "AC"),
            Node::framework("SOC2", "SOC 2"),
        ]);
        let schema = SchemaRegistry::builtin().unwrap();
        assert!(schema.is_hub_endpoint(&store, "AC-2"));
        assert!(schema.is_hub_endpoint(&store, "NIST-XX-1"));
        assert!(!schema.is_hub_endpoint(&store, "SOC2"));
    }
}
