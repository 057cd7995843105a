// crates/test-utils/src/lib.rs

//! Shared helpers for testdag's integration tests: builders for configs,
//! commands and suites, plus a fake executor backend that completes
//! commands without spawning processes.

pub mod builders;
pub mod fake_executor;
