//! Run reports and stage-scoped failures.

use crate::compiler::ResolvedCompiler;
use crate::error::ExtTestError;
use crate::preset::Preset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Orchestrator stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    ResolveCompilerVersion,
    FetchProject,
    PrepareEnvironment,
    Configure,
    Compile,
    Test,
    Cleanup,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::ResolveCompilerVersion => "resolve_compiler_version",
            Stage::FetchProject => "fetch_project",
            Stage::PrepareEnvironment => "prepare_environment",
            Stage::Configure => "configure",
            Stage::Compile => "compile",
            Stage::Test => "test",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fatal error, tagged with the stage (and preset) it happened in.
#[derive(Debug, Error)]
#[error(
    "{stage} stage failed{}: {source}",
    .preset.map(|p| format!(" for preset {p}")).unwrap_or_default()
)]
pub struct RunFailure {
    pub stage: Stage,
    pub preset: Option<Preset>,
    #[source]
    pub source: ExtTestError,
}

impl RunFailure {
    pub fn at(stage: Stage) -> impl FnOnce(ExtTestError) -> RunFailure {
        move |source| RunFailure {
            stage,
            preset: None,
            source,
        }
    }

    pub fn at_preset(stage: Stage, preset: Preset) -> impl FnOnce(ExtTestError) -> RunFailure {
        move |source| RunFailure {
            stage,
            preset: Some(preset),
            source,
        }
    }
}

/// What happened to the test suite for a preset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Skipped,
}

/// Outcome for a single preset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresetOutcome {
    pub preset: Preset,
    pub profile: String,
    pub tests: TestStatus,
    pub duration_ms: u64,
}

/// Result of a complete, successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub test_name: String,
    /// Digest of the test configuration.
    pub config_digest: String,
    pub runner: String,
    pub compiler: ResolvedCompiler,
    pub evm_version: String,
    /// Commit of the project that was tested.
    pub commit: String,
    pub presets: Vec<PresetOutcome>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Number of presets whose test suite ran and passed.
    pub fn tested_count(&self) -> usize {
        self.presets
            .iter()
            .filter(|p| p.tests == TestStatus::Passed)
            .count()
    }

    /// Number of presets that were only compiled.
    pub fn skipped_count(&self) -> usize {
        self.presets
            .iter()
            .filter(|p| p.tests == TestStatus::Skipped)
            .count()
    }
}
