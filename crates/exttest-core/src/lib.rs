//! exttest-core - external project tests for compiler release candidates
//!
//! Drives real-world Solidity projects through a matrix of compiler
//! presets:
//! - Resolves the candidate compiler and its version
//! - Shallow-fetches the pinned project revision
//! - Relaxes version pragmas and prepares the project environment
//! - Configures one build-tool profile per preset, then compiles and tests

pub mod compiler;
pub mod config;
pub mod environment;
pub mod error;
pub mod git;
pub mod orchestrator;
pub mod preset;
pub mod process;
pub mod projects;
pub mod report;
pub mod runner;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use compiler::{CompilerBinary, CompilerKind, ResolvedCompiler};
pub use config::{BuildDependency, HarnessConfig, RefType, TestConfig, TestConfigBuilder};
pub use error::{ExtTestError, Result};
pub use git::{GitFetcher, ProjectFetcher};
pub use orchestrator::Orchestrator;
pub use preset::{profile_name, resolve, Preset, SettingsBundle};
pub use projects::{find_project, ProjectEntry, PROJECTS};
pub use report::{PresetOutcome, RunFailure, RunReport, Stage, TestStatus};
pub use runner::{FoundryRunner, Runner, RunnerKind};
pub use telemetry::init_tracing;
pub use workspace::{ProjectScope, RunnerState};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
