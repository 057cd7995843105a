// src/enqueue/mod.rs

//! Turning test suites into graph nodes and promoting them.
//!
//! - [`test_cases`] expands suites into test cases, deduplicates commands
//!   and wires per-test dependency chains into the graph.
//! - [`commands`] watches graph events and promotes nodes whose
//!   dependencies are satisfied.

pub mod commands;
pub mod test_cases;

pub use commands::CommandEnqueuer;
pub use test_cases::{TestCaseEnqueuer, TestInfo, TestInfoCache, TestSuite};
