// src/manifest.rs

//! JSON test manifests.
//!
//! The binary feeds the scheduler from manifest files describing suites of
//! test cases and their commands. Real discovery pipelines implement
//! [`TestSuite`](crate::enqueue::TestSuite) themselves; the manifest format
//! is the built-in data source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::command::Command;
use crate::config::RunConfig;
use crate::enqueue::{TestInfoCache, TestSuite};
use crate::errors::{HarnessError, Result};
use crate::expectation::{Expectation, ExpectationSet};
use crate::testcase::TestCase;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub suite: String,
    pub test_cases: Vec<ManifestTestCase>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestTestCase {
    pub name: String,
    pub commands: Vec<ManifestCommand>,
    #[serde(default)]
    pub expected: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestCommand {
    pub name: Option<String>,
    pub executable: PathBuf,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub max_retries: u32,
}

/// A suite backed by a parsed manifest file.
pub struct ManifestSuite {
    manifest: Manifest,
    configuration: Arc<RunConfig>,
}

impl TestSuite for ManifestSuite {
    fn name(&self) -> &str {
        &self.manifest.suite
    }

    fn test_cases(&mut self, _cache: &mut TestInfoCache) -> Vec<TestCase> {
        self.manifest
            .test_cases
            .iter()
            .map(|tc| {
                let commands = tc
                    .commands
                    .iter()
                    .map(|mc| {
                        let name = mc
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("{}/{}", self.manifest.suite, tc.name));
                        let mut builder = Command::builder(name, &mc.executable)
                            .args(mc.arguments.iter().cloned())
                            .max_retries(mc.max_retries);
                        if let Some(dir) = &mc.working_directory {
                            builder = builder.working_directory(dir);
                        }
                        for (key, value) in &mc.environment {
                            builder = builder.env(key, value);
                        }
                        Arc::new(builder.build())
                    })
                    .collect();

                let expected: ExpectationSet = tc
                    .expected
                    .iter()
                    .filter_map(|s| s.parse::<Expectation>().ok())
                    .collect();

                TestCase::new(
                    format!("{}/{}", self.manifest.suite, tc.name),
                    commands,
                    self.configuration.clone(),
                    expected,
                    ExpectationSet::EMPTY,
                )
            })
            .collect()
    }
}

/// Load one suite per manifest file, in the order given.
pub fn load_suites(
    paths: &[String],
    configuration: Arc<RunConfig>,
) -> Result<Vec<Box<dyn TestSuite>>> {
    let mut suites: Vec<Box<dyn TestSuite>> = Vec::new();
    for path in paths {
        let manifest = load_manifest(Path::new(path))?;
        suites.push(Box::new(ManifestSuite {
            manifest,
            configuration: configuration.clone(),
        }));
    }
    Ok(suites)
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| HarnessError::Manifest(format!("{}: {e}", path.display())))
}
