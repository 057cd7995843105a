// src/lib.rs

pub mod cli;
pub mod command;
pub mod completer;
pub mod config;
pub mod enqueue;
pub mod errors;
pub mod exec;
pub mod expectation;
pub mod graph;
pub mod harness;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod output_log;
pub mod queue;
pub mod testcase;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::RunConfig;
use crate::enqueue::{TestInfoCache, TestSuite};
use crate::exec::{CommandExecutor, RealExecutorBackend};
use crate::harness::core::{HarnessCore, HarnessEvent};
use crate::harness::listener::{EventListener, TracingListener};
use crate::harness::runtime::{RunSummary, Runtime};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - manifest loading
/// - the scheduler core
/// - the executor backend
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let config = Arc::new(RunConfig {
        max_processes: args.max_processes,
        max_browser_processes: args.max_browser_processes,
        repeat: args.repeat,
        batch_mode: args.batch,
        base_timeout: Duration::from_secs(args.timeout),
        ..RunConfig::from_host()
    });

    let mut suites = manifest::load_suites(&args.manifests, config.clone())?;

    if args.list {
        print_list(&mut suites);
        return Ok(RunSummary::default());
    }

    run_test_suites(config, suites, Box::new(TracingListener::default())).await
}

/// Run the given suites to completion with the production executor.
pub async fn run_test_suites(
    config: Arc<RunConfig>,
    mut suites: Vec<Box<dyn TestSuite>>,
    listener: Box<dyn EventListener>,
) -> Result<RunSummary> {
    let mut core = HarnessCore::new(config.clone());
    let mut cache = TestInfoCache::new();
    let (added, initial_actions) = core.enqueue_test_suites(&mut suites, &mut cache);
    info!(test_cases = added, "test suites enqueued");

    let (events_tx, events_rx) = mpsc::channel::<HarnessEvent>(64);
    let executor = Arc::new(CommandExecutor::new(config));
    let backend = Box::new(RealExecutorBackend::new(executor, events_tx.clone()));

    // Ctrl-C → graceful shutdown.
    {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(HarnessEvent::ShutdownRequested).await;
        });
    }

    let runtime = Runtime::new(core, events_rx, events_tx, backend, listener);
    runtime.run(initial_actions, added).await
}

/// Simple listing output: print every discovered test case name.
fn print_list(suites: &mut [Box<dyn TestSuite>]) {
    let mut cache = TestInfoCache::new();
    for suite in suites {
        for test_case in suite.test_cases(&mut cache) {
            println!("{}", test_case.display_name);
        }
    }
}
