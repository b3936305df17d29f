//! Core types and storage for the GRC compliance knowledge graph.
//!
//! Provides the typed multi-plane graph ([`graph::GraphStore`]), the snapshot codec,
//! the schema registry, integrity validation, coverage labels, and revision
//! management with content hashing and a publish gate.

pub mod config;
pub mod coverage;
pub mod graph;
pub mod revision;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod validate;
