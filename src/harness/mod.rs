// src/harness/mod.rs

//! Orchestration of the scheduler core and its async shell.
//!
//! - [`core`] is a synchronous, deterministic state machine over the graph,
//!   the enqueuers, the command queue and the completer. It consumes
//!   [`HarnessEvent`]s and produces [`CoreAction`]s for the shell.
//! - [`runtime`] is the async IO shell: it forwards dispatch actions to an
//!   executor backend, delivers delayed ticks, runs the inactivity watchdog
//!   and drives the event-listener callbacks.
//! - [`listener`] defines the callbacks consumed by external UIs.

pub mod core;
pub mod listener;
pub mod runtime;

pub use self::core::{CoreAction, CoreStep, HarnessCore, HarnessEvent};
pub use listener::{EventListener, TracingListener};
pub use runtime::{RunSummary, Runtime};
