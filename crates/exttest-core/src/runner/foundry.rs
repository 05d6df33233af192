//! Foundry (`forge`) runner.

use super::{prepare_base_environment, Runner};
use crate::config::TestConfig;
use crate::environment::require_tool;
use crate::error::{ExtTestError, Result};
use crate::preset::Preset;
use crate::workspace::RunnerState;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::Path;
use tracing::info;

/// Project-local Foundry configuration file.
pub const FOUNDRY_CONFIG_FILE: &str = "foundry.toml";

/// Environment variable selecting the active Foundry profile.
pub const FOUNDRY_PROFILE_VAR: &str = "FOUNDRY_PROFILE";

/// Configures and runs Foundry-based projects.
#[derive(Debug, Clone, Default)]
pub struct FoundryRunner;

impl FoundryRunner {
    pub fn new() -> Self {
        Self
    }

    /// Render the `[profile.<name>]` section for `preset`.
    pub fn profile_section(preset: Preset, solc: &Path, evm_version: &str) -> String {
        let settings = preset.settings(evm_version);
        let name = preset.profile_name();
        let solc = toml::Value::String(solc.to_string_lossy().into_owned());
        let evm = toml::Value::String(settings.evm_version().to_string());
        format!(
            "\n[profile.{name}]\n\
             gas_reports = [\"*\"]\n\
             auto_detect_solc = false\n\
             solc = {solc}\n\
             evm_version = {evm}\n\
             optimizer = {optimizer}\n\
             via_ir = {via_ir}\n\
             \n\
             [profile.{name}.optimizer_details]\n\
             yul = {yul}\n",
            optimizer = settings.optimizer_enabled(),
            via_ir = settings.via_ir(),
            yul = settings.yul_details_enabled(),
        )
    }
}

#[async_trait]
impl Runner for FoundryRunner {
    fn name(&self) -> &str {
        "foundry"
    }

    async fn prepare_environment(
        &mut self,
        state: &mut RunnerState,
        config: &TestConfig,
    ) -> Result<()> {
        prepare_base_environment(state, config)?;
        require_tool("forge", state.env(), state.project_dir())
            .map_err(|_| ExtTestError::ToolNotFound("Forge".to_string()))?;
        Ok(())
    }

    async fn configure_settings(
        &mut self,
        state: &mut RunnerState,
        presets: &BTreeSet<Preset>,
    ) -> Result<()> {
        info!("Configuring forge profiles...");
        let solc = state.compiler_path()?.to_path_buf();
        let scope = state.scope()?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(scope.path(FOUNDRY_CONFIG_FILE))?;
        for preset in presets {
            info!(preset = %preset, profile = %preset.profile_name(), "Adding profile");
            file.write_all(Self::profile_section(*preset, &solc, state.evm_version()).as_bytes())?;
        }
        file.flush()?;

        scope.run("forge", &["install"]).await?;
        Ok(())
    }

    async fn compile(&mut self, state: &mut RunnerState, preset: Preset) -> Result<()> {
        state.set_env(FOUNDRY_PROFILE_VAR, preset.profile_name());
        state.scope()?.run("forge", &["build"]).await?;
        Ok(())
    }

    async fn run_tests(&mut self, state: &mut RunnerState) -> Result<()> {
        state.scope()?.run("forge", &["test", "--gas-report"]).await?;
        Ok(())
    }
}
