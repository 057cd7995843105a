// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use testdag::config::RunConfig;
use testdag::enqueue::{TestInfoCache, TestSuite};
use testdag::harness::core::{HarnessCore, HarnessEvent};
use testdag::harness::listener::EventListener;
use testdag::harness::runtime::{RunSummary, Runtime};
use testdag::testcase::FinishedTestCase;
use testdag_test_utils::fake_executor::{FakeExecutor, FakeExecutorState};

pub fn init_tracing() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .with_test_writer()
            .try_init();
    });
}

/// One emitted test case, as seen by the listener.
#[derive(Debug, Clone)]
pub struct FinishedRecord {
    pub name: String,
    pub repeat_index: usize,
    pub succeeded: bool,
    pub outputs: usize,
}

/// Listener that records every `done` callback.
pub struct RecordingListener {
    finished: Arc<Mutex<Vec<FinishedRecord>>>,
}

impl RecordingListener {
    pub fn new(finished: Arc<Mutex<Vec<FinishedRecord>>>) -> Self {
        Self { finished }
    }
}

impl EventListener for RecordingListener {
    fn done(&mut self, test_case: &FinishedTestCase) {
        self.finished.lock().unwrap().push(FinishedRecord {
            name: test_case.test_case.display_name.clone(),
            repeat_index: test_case.test_case.commands[0].repeat_index(),
            succeeded: test_case.succeeded(),
            outputs: test_case.outputs.len(),
        });
    }
}

/// Run the suites through the real core and runtime with a fake executor.
///
/// `script` gets a chance to set up scripted failures before anything is
/// dispatched.
pub async fn run_suites_with_fake(
    config: Arc<RunConfig>,
    mut suites: Vec<Box<dyn TestSuite>>,
    script: impl FnOnce(&FakeExecutorState),
) -> (RunSummary, Arc<FakeExecutorState>, Vec<FinishedRecord>) {
    init_tracing();

    let mut core = HarnessCore::new(config);
    let mut cache = TestInfoCache::new();
    let (added, initial_actions) = core.enqueue_test_suites(&mut suites, &mut cache);

    let (events_tx, events_rx) = mpsc::channel::<HarnessEvent>(64);
    let (fake, state) = FakeExecutor::new(events_tx.clone());
    script(&state);

    let finished = Arc::new(Mutex::new(Vec::new()));
    let listener = RecordingListener::new(finished.clone());

    let runtime = Runtime::new(
        core,
        events_rx,
        events_tx,
        Box::new(fake),
        Box::new(listener),
    );
    let summary = timeout(Duration::from_secs(5), runtime.run(initial_actions, added))
        .await
        .expect("runtime did not finish within 5 seconds")
        .expect("runtime failed");

    let finished = finished.lock().unwrap().clone();
    (summary, state, finished)
}
