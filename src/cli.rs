// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `testdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "testdag",
    version,
    about = "Schedule and run test-suite commands across a pool of worker processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Test manifest files (JSON), one suite each, run in order.
    #[arg(value_name = "MANIFEST", required = true)]
    pub manifests: Vec<String>,

    /// Maximum number of child processes in flight.
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub max_processes: usize,

    /// Maximum number of browser processes in flight.
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub max_browser_processes: usize,

    /// Run every test case this many times.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub repeat: usize,

    /// Serve batch-eligible compilations from persistent batch runners.
    #[arg(long)]
    pub batch: bool,

    /// Base per-test timeout in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub timeout: u64,

    /// List discovered test cases without running anything.
    #[arg(long)]
    pub list: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESTDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
