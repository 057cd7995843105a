// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of the executor
//! directly. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`executor`](super::executor).
//!
//! - `RealExecutorBackend` is the default implementation: each dispatched
//!   command runs in its own Tokio task and reports back over the runtime's
//!   event channel.
//! - Tests can provide their own `ExecutorBackend` that records which
//!   commands were dispatched and emits synthetic `CommandFinished` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::command::Command;
use crate::errors::Result;
use crate::exec::executor::CommandExecutor;
use crate::graph::NodeId;
use crate::harness::core::HarnessEvent;

/// Trait abstracting how dispatched commands are executed.
pub trait ExecutorBackend: Send {
    /// Run the command and, when it finishes, deliver a
    /// `HarnessEvent::CommandFinished` for `node`.
    fn dispatch(
        &mut self,
        node: NodeId,
        command: Arc<Command>,
        time_limit: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Release executor-owned resources; called once after the queue drains.
    fn cleanup(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    executor: Arc<CommandExecutor>,
    events_tx: mpsc::Sender<HarnessEvent>,
}

impl RealExecutorBackend {
    pub fn new(executor: Arc<CommandExecutor>, events_tx: mpsc::Sender<HarnessEvent>) -> Self {
        Self {
            executor,
            events_tx,
        }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn dispatch(
        &mut self,
        node: NodeId,
        command: Arc<Command>,
        time_limit: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let executor = self.executor.clone();
        let tx = self.events_tx.clone();

        Box::pin(async move {
            tokio::spawn(async move {
                let output = executor.run(command, time_limit).await;
                if tx
                    .send(HarnessEvent::CommandFinished { node, output })
                    .await
                    .is_err()
                {
                    warn!("runtime event channel closed; dropping command output");
                }
            });
            Ok(())
        })
    }

    fn cleanup(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            executor.cleanup().await;
            Ok(())
        })
    }
}
