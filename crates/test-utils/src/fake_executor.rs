// crates/test-utils/src/fake_executor.rs

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use testdag::command::Command;
use testdag::errors::Result;
use testdag::exec::ExecutorBackend;
use testdag::graph::NodeId;
use testdag::harness::core::HarnessEvent;
use testdag::output::CommandOutput;

/// Shared observable state of a [`FakeExecutor`].
#[derive(Debug, Default)]
pub struct FakeExecutorState {
    /// Display names in dispatch order.
    pub dispatched: Mutex<Vec<String>>,
    /// Scripted exit codes keyed by (display name, repeat index); unknown
    /// commands succeed.
    pub exit_codes: Mutex<HashMap<(String, usize), i32>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub browser_in_flight: AtomicUsize,
    pub max_browser_in_flight: AtomicUsize,
    pub cleaned_up: AtomicBool,
}

impl FakeExecutorState {
    /// Script a failure for a command.
    pub fn fail(&self, name: &str, repeat_index: usize, exit_code: i32) {
        self.exit_codes
            .lock()
            .unwrap()
            .insert((name.to_string(), repeat_index), exit_code);
    }
}

/// An executor backend that completes every dispatched command after a
/// short delay, with scripted exit codes, and records concurrency
/// high-water marks so tests can check the caps.
pub struct FakeExecutor {
    events_tx: mpsc::Sender<HarnessEvent>,
    state: Arc<FakeExecutorState>,
    delay: Duration,
}

impl FakeExecutor {
    pub fn new(events_tx: mpsc::Sender<HarnessEvent>) -> (Self, Arc<FakeExecutorState>) {
        Self::with_delay(events_tx, Duration::from_millis(10))
    }

    pub fn with_delay(
        events_tx: mpsc::Sender<HarnessEvent>,
        delay: Duration,
    ) -> (Self, Arc<FakeExecutorState>) {
        let state = Arc::new(FakeExecutorState::default());
        (
            Self {
                events_tx,
                state: state.clone(),
                delay,
            },
            state,
        )
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        node: NodeId,
        command: Arc<Command>,
        _time_limit: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.events_tx.clone();
        let state = self.state.clone();
        let delay = self.delay;

        Box::pin(async move {
            // Record the dispatch synchronously so tests see exact order.
            state
                .dispatched
                .lock()
                .unwrap()
                .push(command.display_name().to_string());

            tokio::spawn(async move {
                let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                state.max_in_flight.fetch_max(current, Ordering::SeqCst);
                let browser = command.is_browser();
                if browser {
                    let current = state.browser_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    state
                        .max_browser_in_flight
                        .fetch_max(current, Ordering::SeqCst);
                }

                tokio::time::sleep(delay).await;

                let exit_code = state
                    .exit_codes
                    .lock()
                    .unwrap()
                    .get(&(
                        command.display_name().to_string(),
                        command.repeat_index(),
                    ))
                    .copied()
                    .unwrap_or(0);

                state.in_flight.fetch_sub(1, Ordering::SeqCst);
                if browser {
                    state.browser_in_flight.fetch_sub(1, Ordering::SeqCst);
                }

                let output = CommandOutput::new(command, exit_code, delay);
                let _ = tx
                    .send(HarnessEvent::CommandFinished { node, output })
                    .await;
            });
            Ok(())
        })
    }

    fn cleanup(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.state.cleaned_up.store(true, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}
