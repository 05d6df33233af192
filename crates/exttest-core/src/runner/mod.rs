//! Build-tool runners.
//!
//! A [`Runner`] translates the preset model into one third-party build
//! tool's configuration and commands. Every operation executes inside the
//! fetched project through [`RunnerState::scope`].

pub mod foundry;

use crate::config::{BuildDependency, TestConfig};
use crate::environment::{prepare_node_env, replace_version_pragmas};
use crate::error::Result;
use crate::preset::Preset;
use crate::workspace::RunnerState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

pub use foundry::FoundryRunner;

/// Driver for one build-tool family.
#[async_trait]
pub trait Runner: Send {
    /// Human-readable tool name.
    fn name(&self) -> &str;

    /// One-time project setup. Implementations run
    /// [`prepare_base_environment`] and then verify their tool is installed.
    async fn prepare_environment(
        &mut self,
        state: &mut RunnerState,
        config: &TestConfig,
    ) -> Result<()>;

    /// Materialize every selected preset into the tool's configuration and
    /// install the project's dependencies.
    async fn configure_settings(
        &mut self,
        state: &mut RunnerState,
        presets: &BTreeSet<Preset>,
    ) -> Result<()>;

    /// Build the project with `preset`'s profile.
    async fn compile(&mut self, state: &mut RunnerState, preset: Preset) -> Result<()>;

    /// Run the project's test suite against the last build.
    async fn run_tests(&mut self, state: &mut RunnerState) -> Result<()>;

    /// Release the run's working directory.
    async fn cleanup(&mut self, state: RunnerState) -> Result<()> {
        info!("Cleaning up {}...", state.root().display());
        state.close()
    }
}

/// Setup shared by every runner: Node.js preparation when the project needs
/// it, then relaxing version pragmas across the whole checkout.
pub fn prepare_base_environment(state: &RunnerState, config: &TestConfig) -> Result<()> {
    info!("Configuring runner building environment...");
    let scope = state.scope()?;
    if config.build_dependency() == BuildDependency::Nodejs {
        prepare_node_env(scope.root(), state.env())?;
    }
    replace_version_pragmas(scope.root())?;
    Ok(())
}

/// Tagged selection of the available runners.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    Foundry,
}

impl RunnerKind {
    pub fn name(&self) -> &'static str {
        match self {
            RunnerKind::Foundry => "foundry",
        }
    }

    /// Instantiate the runner for this kind.
    pub fn runner(&self) -> Box<dyn Runner> {
        match self {
            RunnerKind::Foundry => Box::new(FoundryRunner::new()),
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
