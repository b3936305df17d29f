//! Summary statistics over a graph snapshot.

use grc_core::coverage::{CoverageLevel, CoverageThresholds};
use grc_core::graph::{GraphStore, NodeType, Plane, predicates};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub node_types: BTreeMap<NodeType, usize>,
    pub edge_predicates: BTreeMap<String, usize>,
    pub planes: BTreeMap<Plane, usize>,
    /// MAPS_TO edges bucketed by coverage level.
    pub mapping_coverage: BTreeMap<CoverageLevel, usize>,
}

impl GraphStats {
    pub fn compute(store: &GraphStore) -> Self {
        Self::with_thresholds(store, &CoverageThresholds::default())
    }

    pub fn with_thresholds(store: &GraphStore, thresholds: &CoverageThresholds) -> Self {
        let mut mapping_coverage = BTreeMap::new();
        for edge in store
            .all_edges()
            .iter()
            .filter(|e| e.predicate == predicates::MAPS_TO)
        {
            *mapping_coverage
                .entry(thresholds.level(edge.confidence))
                .or_insert(0) += 1;
        }

        Self {
            node_count: store.node_count(),
            edge_count: store.edge_count(),
            node_types: store.node_counts_by_type(),
            edge_predicates: store.edge_counts_by_predicate(),
            planes: store.edge_counts_by_plane(),
            mapping_coverage,
        }
    }
}

impl fmt::Display for GraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes: {}", self.node_count)?;
        for (ty, n) in &self.node_types {
            writeln!(f, "  {:<14} {}", ty.as_str(), n)?;
        }
        writeln!(f, "edges: {}", self.edge_count)?;
        for (plane, n) in &self.planes {
            writeln!(f, "  {:<14} {}", plane.as_str(), n)?;
        }
        writeln!(f, "predicates:")?;
        for (p, n) in &self.edge_predicates {
            writeln!(f, "  {:<18} {}", p, n)?;
        }
        if !self.mapping_coverage.is_empty() {
            writeln!(f, "mapping coverage:")?;
            for (level, n) in &self.mapping_coverage {
                writeln!(f, "  {:<9} {}", level.as_str(), n)?;
            }
        }
        Ok(())
    }
}
