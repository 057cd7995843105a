// src/graph/mod.rs

//! Typed DAG of commands with per-node state and an event queue.
//!
//! - [`graph`] holds the nodes, their states and the event queue drained by
//!   the harness core.

pub mod graph;

pub use graph::{CommandGraph, GraphEvent, Node, NodeId, NodeState};
