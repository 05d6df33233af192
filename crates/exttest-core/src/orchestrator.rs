//! External test orchestration.

use crate::compiler::CompilerBinary;
use crate::config::{HarnessConfig, TestConfig};
use crate::git::{GitFetcher, ProjectFetcher};
use crate::preset::Preset;
use crate::report::{PresetOutcome, RunFailure, RunReport, Stage, TestStatus};
use crate::runner::Runner;
use crate::workspace::RunnerState;
use chrono::Utc;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Sequences one external test run against a [`Runner`].
///
/// Stages run strictly in order and the first failure aborts the run,
/// including the remaining presets. Once the working directory exists,
/// [`Runner::cleanup`] is called exactly once whatever the outcome.
pub struct Orchestrator<F = GitFetcher> {
    config: TestConfig,
    compiler: CompilerBinary,
    harness: HarnessConfig,
    evm_version: String,
    fetcher: F,
}

impl Orchestrator<GitFetcher> {
    pub fn new(config: TestConfig, compiler: CompilerBinary, harness: HarnessConfig) -> Self {
        let evm_version = config
            .evm_version()
            .unwrap_or(harness.default_evm_version.as_str())
            .to_string();
        Self {
            config,
            compiler,
            harness,
            evm_version,
            fetcher: GitFetcher,
        }
    }
}

impl<F: ProjectFetcher> Orchestrator<F> {
    /// Replace the project fetcher.
    pub fn with_fetcher<G: ProjectFetcher>(self, fetcher: G) -> Orchestrator<G> {
        Orchestrator {
            config: self.config,
            compiler: self.compiler,
            harness: self.harness,
            evm_version: self.evm_version,
            fetcher,
        }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// EVM version in effect: the test's pin, else the harness default.
    pub fn evm_version(&self) -> &str {
        &self.evm_version
    }

    /// Execute the whole pipeline.
    pub async fn run(&self, runner: &mut dyn Runner) -> Result<RunReport, RunFailure> {
        let name = self.config.name();
        info!("Testing {}...", name);

        let presets = self.config.selected_presets();
        info!(
            "Selected settings presets: {}",
            presets.iter().map(|p| p.name()).collect::<Vec<_>>().join(" ")
        );

        let mut state = RunnerState::new(name, &self.evm_version, self.harness.command_timeout)
            .map_err(RunFailure::at(Stage::Init))?;

        let outcome = self.run_stages(runner, &mut state, &presets).await;

        info!(stage = %Stage::Cleanup, "Cleaning up working directory");
        let cleanup = runner.cleanup(state).await;

        match (outcome, cleanup) {
            (Ok(report), Ok(())) => {
                info!(run_id = %report.run_id, "Done.");
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(RunFailure::at(Stage::Cleanup)(e)),
            (Err(failure), Err(e)) => {
                warn!(error = %e, "Cleanup failed after an earlier failure");
                Err(failure)
            }
            (Err(failure), Ok(())) => Err(failure),
        }
    }

    async fn run_stages(
        &self,
        runner: &mut dyn Runner,
        state: &mut RunnerState,
        presets: &BTreeSet<Preset>,
    ) -> Result<RunReport, RunFailure> {
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            stage = %Stage::ResolveCompilerVersion,
            binary = %self.compiler.path().display(),
            "Resolving compiler version"
        );
        let compiler = self
            .compiler
            .resolve(state)
            .await
            .map_err(RunFailure::at(Stage::ResolveCompilerVersion))?;
        info!("Using compiler version {}", compiler.full_version);
        state.set_compiler(compiler.clone());

        info!(stage = %Stage::FetchProject, url = %self.config.repo_url(), "Fetching project");
        let commit = self
            .fetcher
            .fetch(&self.config, state)
            .await
            .map_err(RunFailure::at(Stage::FetchProject))?;

        info!(stage = %Stage::PrepareEnvironment, runner = %runner.name(), "Preparing environment");
        runner
            .prepare_environment(state, &self.config)
            .await
            .map_err(RunFailure::at(Stage::PrepareEnvironment))?;

        info!(
            stage = %Stage::Configure,
            binary_type = %compiler.kind,
            compiler_path = %compiler.path.display(),
            "Configuring runner's profiles"
        );
        runner
            .configure_settings(state, presets)
            .await
            .map_err(RunFailure::at(Stage::Configure))?;

        let mut outcomes = Vec::with_capacity(presets.len());
        for preset in presets.iter().copied() {
            let preset_start = Instant::now();
            let settings = preset.settings(&self.evm_version);
            info!(
                preset = %preset,
                settings = %serde_json::to_string(&settings).unwrap_or_default(),
                evm_version = %self.evm_version,
                compiler_version = %compiler.short_version,
                compiler_version_full = %compiler.full_version,
                "Running compile function..."
            );
            runner
                .compile(state, preset)
                .await
                .map_err(RunFailure::at_preset(Stage::Compile, preset))?;

            let tests = if self.harness.compile_only || self.config.is_compile_only(preset) {
                info!(preset = %preset, "Skipping test function...");
                TestStatus::Skipped
            } else {
                info!(preset = %preset, "Running test function...");
                runner
                    .run_tests(state)
                    .await
                    .map_err(RunFailure::at_preset(Stage::Test, preset))?;
                TestStatus::Passed
            };

            outcomes.push(PresetOutcome {
                preset,
                profile: preset.profile_name(),
                tests,
                duration_ms: preset_start.elapsed().as_millis() as u64,
            });
        }

        Ok(RunReport {
            run_id: Uuid::new_v4(),
            test_name: self.config.name().to_string(),
            config_digest: self.config.digest(),
            runner: runner.name().to_string(),
            compiler,
            evm_version: self.evm_version.clone(),
            commit,
            presets: outcomes,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
