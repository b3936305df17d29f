//! Read-side tools for the GRC knowledge graph.
//!
//! Provides path-constrained retrieval (PathRAG), summary statistics and
//! export to the flat viewer payload or Graphviz DOT.

pub mod export;
pub mod pathrag;
pub mod stats;
