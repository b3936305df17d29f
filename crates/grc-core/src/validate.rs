//! Integrity checks over a [`GraphStore`] against a [`SchemaRegistry`].
//!
//! Every invariant is checked independently and every violation is reported.
//! The store is never modified. Check groups run in parallel and their results
//! are concatenated in a fixed order, so reports are deterministic.

use crate::graph::{Edge, GraphStore, Node, NodeKind, NodeType};
use crate::schema::SchemaRegistry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Kind of invariant a [`ValidationError`] violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    DanglingSubject,
    DanglingObject,
    UnknownPredicate,
    PlaneViolation,
    InvalidTypePair,
    OutOfRangeConfidence,
    BrokenFamilyRef,
    BrokenFrameworkRef,
    DuplicateId,
    DuplicateTriple,
    HubRoutingViolation,
    StackOrderViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ErrorKind,
    /// Offending node ids, subject first for edge-level errors.
    pub ids: Vec<String>,
    pub detail: String,
}

impl ValidationError {
    fn new(kind: ErrorKind, ids: Vec<String>, detail: String) -> Self {
        Self { kind, ids, detail }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}

/// Result of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub node_count: usize,
    pub edge_count: usize,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.errors {
            *counts.entry(e.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Validate the whole store.
pub fn validate(store: &GraphStore, schema: &SchemaRegistry) -> ValidationReport {
    let ((duplicate_ids, references), (edge_errors, duplicate_triples)) = rayon::join(
        || {
            rayon::join(
                || check_duplicate_ids(store),
                || check_references(store),
            )
        },
        || {
            rayon::join(
                || check_edges(store, schema),
                || check_duplicate_triples(store),
            )
        },
    );

    let mut errors = Vec::with_capacity(
        duplicate_ids.len() + references.len() + edge_errors.len() + duplicate_triples.len(),
    );
    errors.extend(duplicate_ids);
    errors.extend(references);
    errors.extend(edge_errors);
    errors.extend(duplicate_triples);

    let report = ValidationReport {
        node_count: store.node_count(),
        edge_count: store.edge_count(),
        errors,
    };
    tracing::debug!(
        "validated {} nodes, {} edges: {} error(s)",
        report.node_count,
        report.edge_count,
        report.errors.len()
    );
    report
}

fn check_duplicate_ids(store: &GraphStore) -> Vec<ValidationError> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for node in store.nodes() {
        let count = seen.entry(node.id.as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(node.id.as_str());
        }
    }
    order
        .into_iter()
        .map(|id| {
            ValidationError::new(
                ErrorKind::DuplicateId,
                vec![id.to_string()],
                format!("node id '{}' appears {} times", id, seen[id]),
            )
        })
        .collect()
}

fn check_references(store: &GraphStore) -> Vec<ValidationError> {
    store
        .nodes()
        .par_iter()
        .flat_map_iter(|node| node_reference_errors(store, node))
        .collect()
}

fn node_reference_errors(store: &GraphStore, node: &Node) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let framework_ref = match &node.kind {
        NodeKind::ControlFamily { framework_id } => Some(framework_id.as_str()),
        NodeKind::Control { framework_id, .. } | NodeKind::Baseline { framework_id, .. } => {
            framework_id.as_deref()
        }
        _ => None,
    };

    if let NodeKind::Control { family_id, .. } = &node.kind
        && !matches!(store.node(family_id).map(Node::node_type), Some(NodeType::ControlFamily))
    {
        errors.push(ValidationError::new(
            ErrorKind::BrokenFamilyRef,
            vec![node.id.clone(), family_id.clone()],
            format!(
                "control '{}' references family '{}', which is not a ControlFamily node",
                node.id, family_id
            ),
        ));
    }

    if let Some(fw) = framework_ref
        && !matches!(store.node(fw).map(Node::node_type), Some(NodeType::Framework))
    {
        errors.push(ValidationError::new(
            ErrorKind::BrokenFrameworkRef,
            vec![node.id.clone(), fw.to_string()],
            format!(
                "{} '{}' references framework '{}', which is not a Framework node",
                node.node_type(),
                node.id,
                fw
            ),
        ));
    }
    errors
}

fn check_edges(store: &GraphStore, schema: &SchemaRegistry) -> Vec<ValidationError> {
    store
        .all_edges()
        .par_iter()
        .enumerate()
        .flat_map_iter(|(i, edge)| edge_errors(store, schema, i, edge))
        .collect()
}

fn edge_errors(
    store: &GraphStore,
    schema: &SchemaRegistry,
    index: usize,
    edge: &Edge,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let at = format!(
        "edge #{} {}:{} -{}-> {}",
        index, edge.plane, edge.subject, edge.predicate, edge.object
    );
    let triple_ids = || vec![edge.subject.clone(), edge.object.clone()];

    let subject = store.node(&edge.subject);
    let object = store.node(&edge.object);
    if subject.is_none() {
        errors.push(ValidationError::new(
            ErrorKind::DanglingSubject,
            vec![edge.subject.clone()],
            format!("{}: subject '{}' does not exist", at, edge.subject),
        ));
    }
    if object.is_none() {
        errors.push(ValidationError::new(
            ErrorKind::DanglingObject,
            vec![edge.object.clone()],
            format!("{}: object '{}' does not exist", at, edge.object),
        ));
    }

    if !(0.0..=1.0).contains(&edge.confidence) {
        errors.push(ValidationError::new(
            ErrorKind::OutOfRangeConfidence,
            triple_ids(),
            format!("{}: confidence {} outside [0, 1]", at, edge.confidence),
        ));
    }

    let Some(def) = schema.predicate(&edge.predicate) else {
        errors.push(ValidationError::new(
            ErrorKind::UnknownPredicate,
            triple_ids(),
            format!("{}: predicate '{}' is not declared", at, edge.predicate),
        ));
        return errors;
    };

    if !schema.is_allowed_in(edge.plane, &edge.predicate) {
        errors.push(ValidationError::new(
            ErrorKind::PlaneViolation,
            triple_ids(),
            format!(
                "{}: predicate '{}' is not allowed in plane {}",
                at, edge.predicate, edge.plane
            ),
        ));
    }

    // Structural checks need both endpoints; dangling ones are already reported.
    let (Some(subject), Some(object)) = (subject, object) else {
        return errors;
    };

    let pair = (subject.node_type(), object.node_type());
    if !def.type_pairs.is_empty() && !def.type_pairs.contains(&pair) {
        errors.push(ValidationError::new(
            ErrorKind::InvalidTypePair,
            triple_ids(),
            format!(
                "{}: {} may not link {} -> {}",
                at, edge.predicate, pair.0, pair.1
            ),
        ));
    }

    if def.hub_routed
        && !schema.is_hub_endpoint(store, &subject.id)
        && !schema.is_hub_endpoint(store, &object.id)
    {
        errors.push(ValidationError::new(
            ErrorKind::HubRoutingViolation,
            triple_ids(),
            format!(
                "{}: neither endpoint belongs to hub framework {}",
                at,
                schema.hub().framework_id
            ),
        ));
    }

    if def.stack_ordered {
        match (subject.stack_position(), object.stack_position()) {
            (Some(s), Some(o)) if s > o => {}
            (Some(s), Some(o)) => errors.push(ValidationError::new(
                ErrorKind::StackOrderViolation,
                triple_ids(),
                format!(
                    "{}: subject stack position {} must exceed object stack position {}",
                    at, s, o
                ),
            )),
            // Non-service-model endpoints are a type-pair problem, not an ordering one
            _ => {}
        }
    }

    errors
}

fn check_duplicate_triples(store: &GraphStore) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    for (i, edge) in store.all_edges().iter().enumerate() {
        if !seen.insert((edge.plane, &edge.subject, &edge.predicate, &edge.object)) {
            errors.push(ValidationError::new(
                ErrorKind::DuplicateTriple,
                vec![edge.subject.clone(), edge.object.clone()],
                format!(
                    "edge #{} {}:{} -{}-> {} duplicates an earlier edge",
                    i, edge.plane, edge.subject, edge.predicate, edge.object
                ),
            ));
        }
    }
    errors
}
