// src/harness/runtime.rs

//! Async IO shell around [`HarnessCore`].

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::exec::ExecutorBackend;
use crate::harness::core::{CoreAction, HarnessCore, HarnessEvent};
use crate::harness::listener::EventListener;

/// Inactivity window after which the watchdog dumps scheduler state.
const WATCHDOG_INACTIVITY: Duration = Duration::from_secs(600);

/// Totals for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub total: usize,
    pub finished: usize,
    /// Finished test cases whose outcome did not satisfy their expectations.
    pub failed: usize,
}

/// Drives the core from the event channel, forwards its actions to the
/// executor backend, and keeps the listener informed.
pub struct Runtime {
    core: HarnessCore,
    events_rx: mpsc::Receiver<HarnessEvent>,
    events_tx: mpsc::Sender<HarnessEvent>,
    executor: Box<dyn ExecutorBackend>,
    listener: Box<dyn EventListener>,
    summary: RunSummary,
}

impl Runtime {
    pub fn new(
        core: HarnessCore,
        events_rx: mpsc::Receiver<HarnessEvent>,
        events_tx: mpsc::Sender<HarnessEvent>,
        executor: Box<dyn ExecutorBackend>,
        listener: Box<dyn EventListener>,
    ) -> Self {
        Self {
            core,
            events_rx,
            events_tx,
            executor,
            listener,
            summary: RunSummary::default(),
        }
    }

    /// Main event loop.
    ///
    /// `initial_actions` are the actions returned by
    /// [`HarnessCore::enqueue_test_suites`]; `tests_added` is the number of
    /// test cases it registered.
    pub async fn run(
        mut self,
        initial_actions: Vec<CoreAction>,
        tests_added: usize,
    ) -> Result<RunSummary> {
        info!(tests_added, "harness runtime started");
        self.summary.total = tests_added;

        for _ in 0..tests_added {
            self.listener.test_added();
        }
        self.listener.all_tests_known();

        self.perform(initial_actions).await?;
        if self.core.is_done() {
            return Ok(self.summary);
        }

        let mut last_activity = Instant::now();
        let mut watchdog = tokio::time::interval(Duration::from_secs(60));
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = self.events_rx.recv() => {
                    let Some(event) = maybe_event else {
                        error!("event channel closed before the run finished");
                        break;
                    };
                    debug!(?event, "runtime received event");
                    if matches!(event, HarnessEvent::CommandFinished { .. }) {
                        last_activity = Instant::now();
                    }

                    let step = self.core.step(event);
                    let keep_running = step.keep_running;
                    self.perform(step.actions).await?;
                    if !keep_running {
                        break;
                    }
                }
                _ = watchdog.tick() => {
                    if last_activity.elapsed() >= WATCHDOG_INACTIVITY {
                        error!(
                            "no command finished in the last {:?}; scheduler state:\n{}",
                            WATCHDOG_INACTIVITY,
                            self.core.dump_state()
                        );
                        last_activity = Instant::now();
                    }
                }
            }
        }

        info!(
            finished = self.summary.finished,
            failed = self.summary.failed,
            "harness runtime exiting"
        );
        Ok(self.summary)
    }

    async fn perform(&mut self, actions: Vec<CoreAction>) -> Result<()> {
        for action in actions {
            match action {
                CoreAction::Dispatch {
                    node,
                    command,
                    timeout,
                } => {
                    debug!(command = %command.display_name(), "dispatching command");
                    self.executor.dispatch(node, command, timeout).await?;
                }
                CoreAction::ScheduleTick(delay) => {
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(HarnessEvent::Tick).await;
                    });
                }
                CoreAction::EmitTestCase(finished) => {
                    self.summary.finished += 1;
                    if !finished.succeeded() {
                        self.summary.failed += 1;
                    }
                    self.listener.done(&finished);
                }
                CoreAction::Cleanup => {
                    self.executor.cleanup().await?;
                }
                CoreAction::AllDone => {
                    self.listener.all_done();
                }
            }
        }
        Ok(())
    }
}
