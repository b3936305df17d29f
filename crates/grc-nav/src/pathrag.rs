//! Path-constrained retrieval ("PathRAG") over the typed graph.
//!
//! A query names an anchor node and a template. Traversal walks the template's
//! predicates strictly in order, breadth first; every complete path is scored,
//! thresholded, deduplicated per terminal node and ranked.

use grc_core::graph::{Edge, GraphStore, Plane, TripleKey};
use grc_core::schema::{Direction, SchemaRegistry, Template};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("unknown anchor node '{0}'")]
    UnknownAnchor(String),
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
}

/// Per-query options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Upper bound on returned paths.
    pub max_results: usize,
    /// Only traverse edges in this plane.
    pub plane: Option<Plane>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            max_results: 10,
            plane: None,
        }
    }
}

/// One traversed edge of a path, in traversal order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathHop {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub plane: Plane,
    pub confidence: f64,
    pub weight: f64,
    /// Walked object -> subject.
    pub inverse: bool,
}

/// A scored path from the anchor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathResult {
    /// Node ids from anchor to terminal.
    pub nodes: Vec<String>,
    pub hops: Vec<PathHop>,
    pub score: f64,
}

impl PathResult {
    /// Number of hops.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn anchor(&self) -> &str {
        self.nodes.first().map_or("", String::as_str)
    }

    pub fn terminal(&self) -> &str {
        self.nodes.last().map_or("", String::as_str)
    }

    fn edge_set(&self) -> HashSet<TripleKey> {
        self.hops
            .iter()
            .map(|h| {
                (
                    h.plane,
                    h.subject.clone(),
                    h.predicate.clone(),
                    h.object.clone(),
                )
            })
            .collect()
    }
}

/// Jaccard similarity coefficient: |A ∩ B| / |A ∪ B|.
pub fn jaccard_similarity<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| *v <= 0.0) {
        return 0.0;
    }
    (values.iter().map(|v| v.ln()).sum::<f64>() / values.len() as f64).exp()
}

/// `geomean(confidence) × geomean(weight) × length_penalty^(hops − 1)`.
///
/// Any zero confidence or weight zeroes the score. An empty path scores 0.
pub fn path_score(confidences: &[f64], weights: &[f64], length_penalty: f64) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let extra_hops = confidences.len().saturating_sub(1) as i32;
    geometric_mean(confidences) * geometric_mean(weights) * length_penalty.powi(extra_hops)
}

fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) }
}

/// Ranking: score desc, hops asc, terminal asc, then node and hop sequence.
fn rank(a: &PathResult, b: &PathResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.len().cmp(&b.len()))
        .then_with(|| a.terminal().cmp(b.terminal()))
        .then_with(|| a.nodes.cmp(&b.nodes))
        .then_with(|| {
            let keys = |p: &PathResult| {
                p.hops
                    .iter()
                    .map(|h| (h.plane, h.predicate.clone()))
                    .collect::<Vec<_>>()
            };
            keys(a).cmp(&keys(b))
        })
}

/// A partial path during traversal.
#[derive(Clone)]
struct Walk<'a> {
    nodes: Vec<&'a str>,
    hops: Vec<(&'a Edge, Direction)>,
}

impl Walk<'_> {
    fn into_result(self, schema: &SchemaRegistry) -> PathResult {
        let confidences: Vec<f64> = self
            .hops
            .iter()
            .map(|(e, _)| clamp_confidence(e.confidence))
            .collect();
        let weights: Vec<f64> = self
            .hops
            .iter()
            .map(|(e, _)| schema.weight(&e.predicate))
            .collect();
        let score = path_score(&confidences, &weights, schema.scoring().length_penalty);

        let hops = self
            .hops
            .iter()
            .zip(&weights)
            .map(|((edge, direction), weight)| PathHop {
                subject: edge.subject.clone(),
                predicate: edge.predicate.clone(),
                object: edge.object.clone(),
                plane: edge.plane,
                confidence: edge.confidence,
                weight: *weight,
                inverse: *direction == Direction::Inverse,
            })
            .collect();

        PathResult {
            nodes: self.nodes.into_iter().map(str::to_string).collect(),
            hops,
            score,
        }
    }
}

/// Breadth-first expansion, one template step per level. Paths are simple and
/// never enter a node that does not exist in the store.
fn traverse<'a>(
    store: &'a GraphStore,
    template: &Template,
    anchor: &'a str,
    plane: Option<Plane>,
) -> Vec<Walk<'a>> {
    let mut frontier = vec![Walk {
        nodes: vec![anchor],
        hops: Vec::new(),
    }];

    for step in &template.steps {
        let mut next = Vec::new();
        for walk in &frontier {
            let Some(&here) = walk.nodes.last() else {
                continue;
            };
            let candidates = match step.direction {
                Direction::Forward => store.outgoing(here),
                Direction::Inverse => store.incoming(here),
            };
            for edge in candidates {
                if edge.predicate != step.predicate || plane.is_some_and(|p| p != edge.plane) {
                    continue;
                }
                let neighbor = match step.direction {
                    Direction::Forward => edge.object.as_str(),
                    Direction::Inverse => edge.subject.as_str(),
                };
                if walk.nodes.contains(&neighbor) || !store.contains_node(neighbor) {
                    continue;
                }
                let mut extended = walk.clone();
                extended.nodes.push(neighbor);
                extended.hops.push((edge, step.direction));
                next.push(extended);
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        frontier = next;
    }
    frontier
}

/// Keep, per terminal node, paths whose edge sets are not too similar to a
/// better path already kept.
fn dedup_per_terminal(paths: Vec<PathResult>, threshold: f64) -> Vec<PathResult> {
    let mut groups: BTreeMap<String, Vec<PathResult>> = BTreeMap::new();
    for path in paths {
        groups.entry(path.terminal().to_string()).or_default().push(path);
    }

    let mut kept = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(rank);
        let mut group_kept: Vec<(PathResult, HashSet<TripleKey>)> = Vec::new();
        for path in group {
            let edges = path.edge_set();
            if group_kept
                .iter()
                .all(|(_, other)| jaccard_similarity(&edges, other) <= threshold)
            {
                group_kept.push((path, edges));
            }
        }
        kept.extend(group_kept.into_iter().map(|(p, _)| p));
    }
    kept
}

/// Retrieve ranked paths from `anchor` that follow `template_name`.
///
/// Returns an empty list when no path matches; unknown anchors and templates
/// are errors. A template with more steps than `max_depth` matches nothing.
pub fn retrieve(
    store: &GraphStore,
    schema: &SchemaRegistry,
    anchor: &str,
    template_name: &str,
    options: &RetrieveOptions,
) -> Result<Vec<PathResult>, RetrievalError> {
    let anchor_node = store
        .node(anchor)
        .ok_or_else(|| RetrievalError::UnknownAnchor(anchor.to_string()))?;
    let template = schema
        .template(template_name)
        .ok_or_else(|| RetrievalError::UnknownTemplate(template_name.to_string()))?;
    let scoring = schema.scoring();

    if options.max_results == 0 {
        return Ok(Vec::new());
    }
    if template.steps.len() > scoring.max_depth {
        tracing::debug!(
            "template {} needs {} hops, max_depth is {}",
            template.name,
            template.steps.len(),
            scoring.max_depth
        );
        return Ok(Vec::new());
    }

    let walks = traverse(store, template, anchor_node.id.as_str(), options.plane);
    let explored = walks.len();
    let scored: Vec<PathResult> = walks
        .into_iter()
        .map(|w| w.into_result(schema))
        .filter(|p| p.score >= scoring.min_path_score)
        .collect();
    let above_threshold = scored.len();

    let mut results = dedup_per_terminal(scored, scoring.jaccard_dedup_threshold);
    results.sort_by(rank);
    results.truncate(options.max_results);

    tracing::debug!(
        "retrieve {} from {}: {} complete, {} above threshold, {} returned",
        template.name,
        anchor,
        explored,
        above_threshold,
        results.len()
    );
    Ok(results)
}

/// One `(anchor, template)` query for [`retrieve_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub anchor: String,
    pub template: String,
}

impl Query {
    pub fn new(anchor: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
            template: template.into(),
        }
    }
}

/// Run independent queries in parallel. Results are in query order.
pub fn retrieve_many(
    store: &GraphStore,
    schema: &SchemaRegistry,
    queries: &[Query],
    options: &RetrieveOptions,
) -> Vec<Result<Vec<PathResult>, RetrievalError>> {
    queries
        .par_iter()
        .map(|q| retrieve(store, schema, &q.anchor, &q.template, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_score_single_hop() {
        let score = path_score(&[0.8], &[0.9], 0.5);
        assert!((score - 0.72).abs() < 1e-12);
    }

    #[test]
    fn test_path_score_penalises_length() {
        let one = path_score(&[0.9], &[0.9], 0.9);
        let two = path_score(&[0.9, 0.9], &[0.9, 0.9], 0.9);
        assert!((two - one * 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_path_score_zero_confidence() {
        assert_eq!(path_score(&[0.9, 0.0], &[1.0, 1.0], 1.0), 0.0);
        assert_eq!(path_score(&[], &[], 1.0), 0.0);
    }

    #[test]
    fn test_jaccard() {
        let a: HashSet<&str> = ["x", "y"].into_iter().collect();
        let b: HashSet<&str> = ["y", "z"].into_iter().collect();
        assert!((jaccard_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(jaccard_similarity(&a, &a), 1.0);
        let empty: HashSet<&str> = HashSet::new();
        assert_eq!(jaccard_similarity(&empty, &empty), 0.0);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.5), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }
}
