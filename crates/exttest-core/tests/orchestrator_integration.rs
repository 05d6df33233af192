//! Integration tests for the orchestrator with recording runners and fake tools.
#![cfg(unix)]

use async_trait::async_trait;
use exttest_core::runner::foundry::{FOUNDRY_CONFIG_FILE, FOUNDRY_PROFILE_VAR};
use exttest_core::{
    CompilerBinary, ExtTestError, FoundryRunner, HarnessConfig, Orchestrator, Preset,
    ProjectFetcher, ResolvedCompiler, Runner, RunnerState, Stage, TestConfig, TestStatus,
};
use exttest_core::{BuildDependency, CompilerKind};
use std::collections::BTreeSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SOLC_VERSION_OUTPUT: &str = concat!(
    "solc, the solidity compiler commandline interface\\n",
    "Version: 0.8.24+commit.e11b9ed9.Linux.g++\\n",
);

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn fake_solc(dir: &TempDir) -> PathBuf {
    write_script(dir.path(), "solc", &format!("printf '{SOLC_VERSION_OUTPUT}'"))
}

fn prb_math_like() -> TestConfig {
    TestConfig::builder("PRBMath", "https://github.com/PaulRBerg/prb-math.git")
        .reference("branch", "main")
        .build_dependency(BuildDependency::Rust)
        .compile_only_presets(["ir-no-optimize"])
        .settings_presets([
            "ir-optimize-evm-only",
            "ir-optimize-evm+yul",
            "legacy-optimize-evm-only",
            "legacy-optimize-evm+yul",
            "legacy-no-optimize",
        ])
        .build()
        .unwrap()
}

/// Fetcher that materializes a tiny project instead of cloning.
struct StubFetcher {
    fail: bool,
}

#[async_trait]
impl ProjectFetcher for StubFetcher {
    async fn fetch(
        &self,
        config: &TestConfig,
        state: &RunnerState,
    ) -> exttest_core::Result<String> {
        if self.fail {
            return Err(ExtTestError::CloneFailed {
                url: config.repo_url().to_string(),
                reference: format!("{} {}", config.ref_type(), config.git_ref()),
                reason: "remote unreachable".to_string(),
            });
        }
        std::fs::create_dir_all(state.project_dir().join("src"))?;
        std::fs::write(
            state.project_dir().join("src/Math.sol"),
            "pragma solidity >=0.8.19;\ncontract Math {}\n",
        )?;
        Ok("0123456789abcdef0123456789abcdef01234567".to_string())
    }
}

/// Runner that records every call and can fail on a chosen one.
#[derive(Default)]
struct RecordingRunner {
    calls: Vec<String>,
    fail_on: Option<String>,
    last_compiled: Option<Preset>,
    cleaned_root: Option<PathBuf>,
    fail_cleanup: bool,
}

impl RecordingRunner {
    fn failing_on(call: &str) -> Self {
        Self {
            fail_on: Some(call.to_string()),
            ..Self::default()
        }
    }

    fn with_failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    fn record(&mut self, call: String) -> exttest_core::Result<()> {
        let fail = self.fail_on.as_deref() == Some(call.as_str());
        self.calls.push(call.clone());
        if fail {
            return Err(ExtTestError::CommandFailed {
                command: call,
                exit_code: 1,
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl Runner for RecordingRunner {
    fn name(&self) -> &str {
        "recording"
    }

    async fn prepare_environment(
        &mut self,
        state: &mut RunnerState,
        _config: &TestConfig,
    ) -> exttest_core::Result<()> {
        state.scope()?;
        self.record("prepare_environment".to_string())
    }

    async fn configure_settings(
        &mut self,
        _state: &mut RunnerState,
        presets: &BTreeSet<Preset>,
    ) -> exttest_core::Result<()> {
        self.record(format!("configure_settings:{}", presets.len()))
    }

    async fn compile(
        &mut self,
        _state: &mut RunnerState,
        preset: Preset,
    ) -> exttest_core::Result<()> {
        self.last_compiled = Some(preset);
        self.record(format!("compile:{preset}"))
    }

    async fn run_tests(&mut self, _state: &mut RunnerState) -> exttest_core::Result<()> {
        let preset = self.last_compiled.map(|p| p.to_string()).unwrap_or_default();
        self.record(format!("run_tests:{preset}"))
    }

    async fn cleanup(&mut self, state: RunnerState) -> exttest_core::Result<()> {
        self.cleaned_root = Some(state.root().to_path_buf());
        self.calls.push("cleanup".to_string());
        state.close()?;
        if self.fail_cleanup {
            return Err(ExtTestError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "working directory is busy",
            )));
        }
        Ok(())
    }
}

fn orchestrator(
    bin: &TempDir,
    config: TestConfig,
    harness: HarnessConfig,
    fail_fetch: bool,
) -> Orchestrator<StubFetcher> {
    Orchestrator::new(config, CompilerBinary::native(fake_solc(bin)), harness)
        .with_fetcher(StubFetcher { fail: fail_fetch })
}

fn assert_cleaned_once(runner: &RecordingRunner) {
    assert_eq!(runner.count("cleanup"), 1, "calls: {:?}", runner.calls);
    assert_eq!(runner.calls.last().map(String::as_str), Some("cleanup"));
    let root = runner.cleaned_root.as_ref().expect("cleanup saw the state");
    assert!(!root.exists(), "working directory should be removed");
}

/// Test: all six presets compile, five are tested, one cleanup at the end
#[tokio::test]
async fn test_happy_path_runs_full_matrix() {
    let bin = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&bin, prb_math_like(), HarnessConfig::default(), false);
    let mut runner = RecordingRunner::default();

    let report = orchestrator.run(&mut runner).await.expect("run should succeed");

    assert_eq!(runner.count("compile:"), 6);
    assert_eq!(runner.count("run_tests:"), 5);
    assert!(!runner.calls.contains(&"run_tests:ir-no-optimize".to_string()));
    assert_eq!(runner.calls[0], "prepare_environment");
    assert_eq!(runner.calls[1], "configure_settings:6");
    assert_cleaned_once(&runner);

    let compiled: Vec<String> = runner
        .calls
        .iter()
        .filter_map(|c| c.strip_prefix("compile:").map(str::to_string))
        .collect();
    let expected: Vec<String> = Preset::ALL.iter().map(|p| p.to_string()).collect();
    assert_eq!(compiled, expected, "presets run in selection order");

    assert_eq!(report.test_name, "PRBMath");
    assert_eq!(report.runner, "recording");
    assert_eq!(report.evm_version, "shanghai");
    assert_eq!(report.compiler.short_version, "0.8.24");
    assert_eq!(report.commit, "0123456789abcdef0123456789abcdef01234567");
    assert_eq!(report.presets.len(), 6);
    assert_eq!(report.tested_count(), 5);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.config_digest, prb_math_like().digest());
    let skipped = report
        .presets
        .iter()
        .find(|o| o.tests == TestStatus::Skipped)
        .unwrap();
    assert_eq!(skipped.preset, Preset::IrNoOptimize);
}

/// Test: the global compile-only override suppresses every test run
#[tokio::test]
async fn test_global_compile_only() {
    let bin = tempfile::tempdir().unwrap();
    let harness = HarnessConfig::default().with_compile_only(true);
    let orchestrator = orchestrator(&bin, prb_math_like(), harness, false);
    let mut runner = RecordingRunner::default();

    let report = orchestrator.run(&mut runner).await.unwrap();

    assert_eq!(runner.count("compile:"), 6);
    assert_eq!(runner.count("run_tests:"), 0);
    assert_eq!(report.skipped_count(), 6);
    assert_cleaned_once(&runner);
}

/// Test: a compile failure mid-loop aborts the remaining presets
#[tokio::test]
async fn test_compile_failure_aborts_and_cleans_up() {
    let bin = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&bin, prb_math_like(), HarnessConfig::default(), false);
    let mut runner = RecordingRunner::failing_on("compile:legacy-optimize-evm-only");

    let failure = orchestrator.run(&mut runner).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Compile);
    assert_eq!(failure.preset, Some(Preset::LegacyOptimizeEvmOnly));
    assert!(matches!(failure.source, ExtTestError::CommandFailed { .. }));
    assert_eq!(runner.count("compile:"), 3);
    assert_eq!(runner.count("run_tests:"), 1);
    assert_cleaned_once(&runner);
}

/// Test: a test failure aborts the run
#[tokio::test]
async fn test_test_failure_aborts_and_cleans_up() {
    let bin = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&bin, prb_math_like(), HarnessConfig::default(), false);
    let mut runner = RecordingRunner::failing_on("run_tests:legacy-no-optimize");

    let failure = orchestrator.run(&mut runner).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Test);
    assert_eq!(failure.preset, Some(Preset::LegacyNoOptimize));
    assert_eq!(runner.count("compile:"), 1);
    assert_cleaned_once(&runner);
}

/// Test: environment and configure failures happen before any compile
#[tokio::test]
async fn test_setup_failures_stop_before_compile() {
    for (call, stage) in [
        ("prepare_environment", Stage::PrepareEnvironment),
        ("configure_settings:6", Stage::Configure),
    ] {
        let bin = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&bin, prb_math_like(), HarnessConfig::default(), false);
        let mut runner = RecordingRunner::failing_on(call);

        let failure = orchestrator.run(&mut runner).await.unwrap_err();

        assert_eq!(failure.stage, stage);
        assert_eq!(failure.preset, None);
        assert_eq!(runner.count("compile:"), 0);
        assert_cleaned_once(&runner);
    }
}

/// Test: a cleanup failure after a clean run fails the run at the cleanup stage
#[tokio::test]
async fn test_cleanup_failure_after_success() {
    let bin = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&bin, prb_math_like(), HarnessConfig::default(), false);
    let mut runner = RecordingRunner::default().with_failing_cleanup();

    let failure = orchestrator.run(&mut runner).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Cleanup);
    assert_eq!(failure.preset, None);
    assert!(matches!(failure.source, ExtTestError::Io(_)));
    assert_eq!(runner.count("compile:"), 6);
    assert_cleaned_once(&runner);
}

/// Test: an earlier stage failure wins over a cleanup failure
#[tokio::test]
async fn test_stage_failure_wins_over_cleanup_failure() {
    let bin = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&bin, prb_math_like(), HarnessConfig::default(), false);
    let mut runner = RecordingRunner::failing_on("compile:ir-no-optimize").with_failing_cleanup();

    let failure = orchestrator.run(&mut runner).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Compile);
    assert_eq!(failure.preset, Some(Preset::IrNoOptimize));
    assert!(matches!(failure.source, ExtTestError::CommandFailed { .. }));
    assert_cleaned_once(&runner);
}

/// Test: fetch failures surface as clone failures
#[tokio::test]
async fn test_fetch_failure() {
    let bin = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&bin, prb_math_like(), HarnessConfig::default(), true);
    let mut runner = RecordingRunner::default();

    let failure = orchestrator.run(&mut runner).await.unwrap_err();

    assert_eq!(failure.stage, Stage::FetchProject);
    assert!(matches!(failure.source, ExtTestError::CloneFailed { .. }));
    assert_eq!(runner.calls, vec!["cleanup".to_string()]);
    assert_cleaned_once(&runner);
}

/// Test: an unparseable compiler version stops the run before fetching
#[tokio::test]
async fn test_version_parse_failure() {
    let bin = tempfile::tempdir().unwrap();
    let solc = write_script(bin.path(), "solc", "echo 'no version here'");
    let compiler = CompilerBinary::native(solc);
    let orchestrator = Orchestrator::new(prb_math_like(), compiler, HarnessConfig::default())
        .with_fetcher(StubFetcher { fail: false });
    let mut runner = RecordingRunner::default();

    let failure = orchestrator.run(&mut runner).await.unwrap_err();

    assert_eq!(failure.stage, Stage::ResolveCompilerVersion);
    assert!(matches!(failure.source, ExtTestError::VersionParse(_)));
    assert_eq!(runner.calls, vec!["cleanup".to_string()]);
    assert_cleaned_once(&runner);
}

/// Test: a missing compiler binary is also a version resolution failure
#[tokio::test]
async fn test_missing_compiler_binary() {
    let orchestrator = Orchestrator::new(
        prb_math_like(),
        CompilerBinary::native("/nonexistent/exttest/solc"),
        HarnessConfig::default(),
    )
    .with_fetcher(StubFetcher { fail: false });
    let mut runner = RecordingRunner::default();

    let failure = orchestrator.run(&mut runner).await.unwrap_err();

    assert_eq!(failure.stage, Stage::ResolveCompilerVersion);
    assert_cleaned_once(&runner);
}

/// Test: the harness default EVM version reaches the report
#[tokio::test]
async fn test_harness_evm_version() {
    let bin = tempfile::tempdir().unwrap();
    let harness = HarnessConfig::default().with_default_evm_version("cancun");
    let orchestrator = orchestrator(&bin, prb_math_like(), harness, false);
    let mut runner = RecordingRunner::default();

    let report = orchestrator.run(&mut runner).await.unwrap();
    assert_eq!(report.evm_version, "cancun");
}

/// Foundry runner driven against a fake `forge` that logs its invocations.
struct FakeForge {
    bin: TempDir,
    log: PathBuf,
}

impl FakeForge {
    fn new(fail_subcommand: Option<&str>) -> Self {
        let bin = tempfile::tempdir().unwrap();
        let log = bin.path().join("forge.log");
        let fail = fail_subcommand.unwrap_or("");
        let body = format!(
            "echo \"${FOUNDRY_PROFILE_VAR}:$*\" >> '{log}'\n\
             if [ \"$1\" = '{fail}' ]; then echo 'forge exploded' >&2; exit 2; fi",
            log = log.display()
        );
        write_script(bin.path(), "forge", &body);
        Self { bin, log }
    }

    fn state(&self) -> RunnerState {
        let mut state = RunnerState::new("foundry-e2e", "shanghai", None).unwrap();
        let path = format!(
            "{}:{}",
            self.bin.path().display(),
            state.env().get("PATH").cloned().unwrap_or_default()
        );
        state.set_env("PATH", path);
        state.set_compiler(ResolvedCompiler {
            kind: CompilerKind::Native,
            path: PathBuf::from("/opt/solc/solc"),
            full_version: "0.8.24+commit.e11b9ed9".to_string(),
            short_version: "0.8.24".to_string(),
        });
        std::fs::create_dir_all(state.project_dir().join("src")).unwrap();
        std::fs::write(
            state.project_dir().join(FOUNDRY_CONFIG_FILE),
            "[profile.default]\nsrc = \"src\"\n",
        )
        .unwrap();
        std::fs::write(
            state.project_dir().join("src/Math.sol"),
            "pragma solidity >=0.8.19;\n",
        )
        .unwrap();
        state
    }

    fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[tokio::test]
async fn test_foundry_runner_drives_forge() {
    let forge = FakeForge::new(None);
    let mut state = forge.state();
    let config = prb_math_like();
    let presets = config.selected_presets();
    let mut runner = FoundryRunner::new();

    runner.prepare_environment(&mut state, &config).await.unwrap();
    runner.configure_settings(&mut state, &presets).await.unwrap();
    runner.compile(&mut state, Preset::IrOptimizeEvmYul).await.unwrap();
    runner.run_tests(&mut state).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(state.project_dir().join("src/Math.sol")).unwrap(),
        "pragma solidity >=0.0;\n"
    );

    let toml_text = std::fs::read_to_string(state.project_dir().join(FOUNDRY_CONFIG_FILE)).unwrap();
    let parsed: toml::Table = toml::from_str(&toml_text).unwrap();
    let profiles = parsed["profile"].as_table().unwrap();
    assert_eq!(profiles.len(), 7, "default profile kept, six appended");
    let yul = profiles["ir_optimize_evm_yul"].as_table().unwrap();
    assert_eq!(yul["solc"].as_str(), Some("/opt/solc/solc"));
    assert_eq!(yul["via_ir"].as_bool(), Some(true));
    assert_eq!(yul["optimizer_details"]["yul"].as_bool(), Some(true));

    let invocations = forge.invocations();
    assert_eq!(invocations.len(), 3);
    assert!(invocations[0].ends_with(":install"));
    assert_eq!(invocations[1], "ir_optimize_evm_yul:build");
    assert_eq!(invocations[2], "ir_optimize_evm_yul:test --gas-report");

    state.close().unwrap();
}

#[tokio::test]
async fn test_foundry_runner_build_failure_propagates() {
    let forge = FakeForge::new(Some("build"));
    let mut state = forge.state();
    let mut runner = FoundryRunner::new();

    let err = runner.compile(&mut state, Preset::LegacyNoOptimize).await.unwrap_err();
    match err {
        ExtTestError::CommandFailed { command, exit_code, stderr } => {
            assert_eq!(command, "forge build");
            assert_eq!(exit_code, 2);
            assert_eq!(stderr, "forge exploded");
        }
        other => panic!("unexpected error: {other}"),
    }
    state.close().unwrap();
}

#[tokio::test]
async fn test_foundry_runner_requires_forge() {
    let mut state = RunnerState::new("no-forge", "shanghai", None).unwrap();
    state.set_env("PATH", "/nonexistent/exttest/bin");
    std::fs::create_dir_all(state.project_dir()).unwrap();
    let config = prb_math_like();
    let mut runner = FoundryRunner::new();

    let err = runner.prepare_environment(&mut state, &config).await.unwrap_err();
    assert!(matches!(err, ExtTestError::ToolNotFound(tool) if tool == "Forge"));
}

#[tokio::test]
async fn test_nodejs_project_requires_package_json() {
    let forge = FakeForge::new(None);
    let node_bin = tempfile::tempdir().unwrap();
    write_script(node_bin.path(), "node", "exit 0");

    let mut state = forge.state();
    let path = format!("{}:{}", node_bin.path().display(), state.env()["PATH"]);
    state.set_env("PATH", path);
    let config = TestConfig::builder("node-project", "https://example.com/node.git")
        .build()
        .unwrap();
    let mut runner = FoundryRunner::new();

    let err = runner.prepare_environment(&mut state, &config).await.unwrap_err();
    assert!(matches!(err, ExtTestError::MissingProjectFile(f) if f == "package.json"));
}
