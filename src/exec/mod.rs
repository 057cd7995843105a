// src/exec/mod.rs

//! Process execution layer.
//!
//! This module actually runs commands, using `tokio::process::Command`, and
//! reports back to the harness runtime via `HarnessEvent`s.
//!
//! - [`process`] handles one-shot child processes: sanitized environment,
//!   timeouts, stack capture, stdio draining and exit-code normalization.
//! - [`batch`] owns persistent batch runner workers speaking the line-framed
//!   worker protocol.
//! - [`executor`] dispatches each command to the right runner and applies
//!   the retry policy.
//! - [`script`] runs in-process filesystem steps.
//! - [`diagnostics`] captures stack traces from timed-out process trees.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod batch;
pub mod diagnostics;
pub mod executor;
pub mod process;
pub mod script;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor::{
    BrowserCommandRunner, CommandExecutor, Device, DevicePool, DeviceStepResult,
};
