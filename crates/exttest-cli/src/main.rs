//! exttest - external project tests for compiler release candidates
//!
//! Builds and tests real-world Solidity projects with a candidate compiler
//! under every settings preset.
//!
//! ## Commands
//!
//! - `prb-math`: run the PRBMath external tests
//! - `list`: show the known projects and their preset selection
//! - `presets`: print the settings preset catalogue

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exttest_core::config::DEFAULT_EVM_VERSION;
use exttest_core::{
    find_project, CompilerBinary, CompilerKind, HarnessConfig, Orchestrator, Preset, RunReport,
    TestStatus, PROJECTS,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "exttest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run external Solidity projects against a candidate compiler", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the PRBMath external tests
    PrbMath(RunArgs),

    /// List known projects
    List,

    /// Print every settings preset with its compiler settings
    Presets {
        /// EVM version to render the settings with
        #[arg(long, env = "DEFAULT_EVM", default_value = DEFAULT_EVM_VERSION)]
        evm_version: String,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// How the compiler is delivered: native or solcjs
    solc_binary_type: CompilerKind,

    /// Path to the solc executable or soljson.js
    solc_binary_path: PathBuf,

    /// Local solc-js checkout to build instead of cloning upstream (solcjs only)
    solcjs_src_dir: Option<PathBuf>,

    /// EVM version for projects that don't pin one
    #[arg(long, env = "DEFAULT_EVM")]
    evm_version: Option<String>,

    /// Only compile, skip every test run (also enabled by COMPILE_ONLY=1)
    #[arg(long)]
    compile_only: bool,

    /// Kill any external command running longer than this many seconds
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    /// Write the JSON run report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    exttest_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::PrbMath(args) => cmd_run("prb-math", &args).await,
        Commands::List => cmd_list(),
        Commands::Presets { evm_version } => cmd_presets(&evm_version),
    }
}

/// Command-line flags take precedence over the environment.
fn harness_config(args: &RunArgs, base: HarnessConfig) -> HarnessConfig {
    let mut harness = base;
    if let Some(evm_version) = &args.evm_version {
        harness = harness.with_default_evm_version(evm_version);
    }
    if args.compile_only {
        harness = harness.with_compile_only(true);
    }
    harness.with_command_timeout(args.command_timeout.map(Duration::from_secs))
}

async fn cmd_run(project_id: &str, args: &RunArgs) -> Result<()> {
    let project = find_project(project_id)
        .with_context(|| format!("Unknown project: {project_id}"))?;
    let config = project
        .config()
        .with_context(|| format!("Invalid configuration for {project_id}"))?;

    let binary_path = std::fs::canonicalize(&args.solc_binary_path).with_context(|| {
        format!("Compiler binary not found: {}", args.solc_binary_path.display())
    })?;
    let solcjs_src_dir = args
        .solcjs_src_dir
        .as_deref()
        .map(|dir| {
            std::fs::canonicalize(dir)
                .with_context(|| format!("solc-js source directory not found: {}", dir.display()))
        })
        .transpose()?;
    let compiler = CompilerBinary::new(args.solc_binary_type, binary_path, solcjs_src_dir)
        .context("Invalid compiler arguments")?;

    let harness = harness_config(args, HarnessConfig::from_env());
    let orchestrator = Orchestrator::new(config, compiler, harness);
    info!(
        project = project_id,
        runner = %project.runner,
        evm_version = %orchestrator.evm_version(),
        "Starting external tests"
    );

    let mut runner = project.runner.runner();
    let report = orchestrator
        .run(runner.as_mut())
        .await
        .with_context(|| format!("{} external tests failed", orchestrator.config().name()))?;

    print_report(&report);
    if let Some(path) = &args.report {
        write_report(&report, path)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{} passed with solc {}", report.test_name, report.compiler.full_version);
    println!("  Run ID:  {}", report.run_id);
    println!("  Commit:  {}", report.commit);
    println!("  EVM:     {}", report.evm_version);
    println!("  Runner:  {}", report.runner);
    for outcome in &report.presets {
        let tests = match outcome.tests {
            TestStatus::Passed => "compiled, tests passed",
            TestStatus::Skipped => "compiled only",
        };
        println!("  {:<26} {} ({}ms)", outcome.preset.name(), tests, outcome.duration_ms);
    }
    println!(
        "  {} tested, {} compile-only, {}ms total",
        report.tested_count(),
        report.skipped_count(),
        report.duration_ms
    );
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

fn cmd_list() -> Result<()> {
    for project in PROJECTS {
        let config = project
            .config()
            .with_context(|| format!("Invalid configuration for {}", project.id))?;
        println!("{} ({}, {})", project.id, config.name(), project.runner);
        println!("  Repository: {} {} {}", config.repo_url(), config.ref_type(), config.git_ref());
        if let Some(evm_version) = config.evm_version() {
            println!("  EVM:        {evm_version}");
        }
        for preset in config.selected_presets() {
            let marker = if config.is_compile_only(preset) { " (compile only)" } else { "" };
            println!("  - {preset}{marker}");
        }
    }
    Ok(())
}

fn cmd_presets(evm_version: &str) -> Result<()> {
    for preset in Preset::ALL {
        let settings = serde_json::to_string(&preset.settings(evm_version))
            .with_context(|| format!("Failed to render settings for {preset}"))?;
        println!("{:<26} {:<26} {}", preset.name(), preset.profile_name(), settings);
    }
    Ok(())
}
