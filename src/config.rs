// src/config.rs

//! Run-wide configuration for the harness.
//!
//! Everything "global-ish" lives here: concurrency caps, the repeat count,
//! batch mode, the captured host environment, platform detection and the
//! debugger paths used for stack capture. The core never reads process-wide
//! state directly; it only sees an injected [`RunConfig`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Operating system the harness is running on.
///
/// Detected once at startup (or injected by tests); the one-shot process
/// runner uses it to pick the stack-capture tool and the retry helper uses
/// it to scope Linux-only display flakiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    Linux,
    MacOs,
    Windows,
}

impl OperatingSystem {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OperatingSystem::Windows
        } else if cfg!(target_os = "macos") {
            OperatingSystem::MacOs
        } else {
            OperatingSystem::Linux
        }
    }
}

/// Configuration handle shared by every test case of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of child processes in flight at once.
    pub max_processes: usize,

    /// Maximum number of browser processes in flight at once.
    pub max_browser_processes: usize,

    /// How many times each test case is run.
    pub repeat: usize,

    /// Whether batch-eligible compilations are served by persistent batch
    /// runner workers.
    pub batch_mode: bool,

    /// Base per-test timeout; scaled up for slow / extra-slow tests.
    pub base_timeout: Duration,

    /// Host environment captured at startup. Children inherit this minus
    /// the proxy variables, see `exec::process::sanitized_environment`.
    pub host_env: Vec<(String, String)>,

    pub system: OperatingSystem,

    /// Root of the Windows SDK; `cdb.exe` is resolved relative to this for
    /// stack capture on Windows.
    pub windows_sdk_path: Option<PathBuf>,

    /// Batch runner keys that are restarted every
    /// [`BATCH_RECYCLE_LIMIT`](crate::exec::batch::BATCH_RECYCLE_LIMIT) jobs
    /// to bound memory growth in leaky backends.
    pub leaky_runners: HashSet<String>,
}

impl RunConfig {
    /// Configuration with the host environment and platform captured from
    /// the current process.
    pub fn from_host() -> Self {
        Self {
            host_env: std::env::vars().collect(),
            ..Self::default()
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_processes: 4,
            max_browser_processes: 2,
            repeat: 1,
            batch_mode: false,
            base_timeout: Duration::from_secs(60),
            host_env: Vec::new(),
            system: OperatingSystem::current(),
            windows_sdk_path: None,
            leaky_runners: HashSet::new(),
        }
    }
}
