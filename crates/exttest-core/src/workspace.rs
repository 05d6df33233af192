//! Per-run mutable state and the project scope runner operations execute in.

use crate::compiler::ResolvedCompiler;
use crate::error::{ExtTestError, Result};
use crate::process::{run_command, CommandOutput};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::debug;

/// Mutable state owned by exactly one orchestrator run.
///
/// The temporary directory is removed by [`RunnerState::close`], or by the
/// `TempDir` destructor if the state is dropped without closing.
#[derive(Debug)]
pub struct RunnerState {
    tmp_dir: TempDir,
    project_dir: PathBuf,
    env: BTreeMap<String, String>,
    evm_version: String,
    compiler: Option<ResolvedCompiler>,
    command_timeout: Option<Duration>,
}

impl RunnerState {
    /// Allocate a fresh, uniquely named working directory for `test_name`.
    pub fn new(
        test_name: &str,
        evm_version: impl Into<String>,
        command_timeout: Option<Duration>,
    ) -> Result<Self> {
        let prefix: String = test_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let tmp_dir = tempfile::Builder::new()
            .prefix(&format!("ext-test-{prefix}-"))
            .tempdir()?;
        let project_dir = tmp_dir.path().join("ext");
        debug!(tmp_dir = %tmp_dir.path().display(), "Allocated working directory");

        Ok(Self {
            tmp_dir,
            project_dir,
            env: std::env::vars().collect(),
            evm_version: evm_version.into(),
            compiler: None,
            command_timeout,
        })
    }

    /// Root of the temporary directory (parent of the project dir).
    pub fn root(&self) -> &Path {
        self.tmp_dir.path()
    }

    /// Where the project under test is fetched to.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Override an environment variable for subsequent commands.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn evm_version(&self) -> &str {
        &self.evm_version
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    pub fn compiler(&self) -> Option<&ResolvedCompiler> {
        self.compiler.as_ref()
    }

    pub fn set_compiler(&mut self, compiler: ResolvedCompiler) {
        self.compiler = Some(compiler);
    }

    /// Path of the resolved compiler; errors before version resolution.
    pub fn compiler_path(&self) -> Result<&Path> {
        self.compiler
            .as_ref()
            .map(|c| c.path.as_path())
            .ok_or_else(|| {
                ExtTestError::InvalidConfig("compiler has not been resolved".to_string())
            })
    }

    /// Enter the project directory for the duration of one runner operation.
    pub fn scope(&self) -> Result<ProjectScope<'_>> {
        ProjectScope::enter(&self.project_dir, &self.env, self.command_timeout)
    }

    /// Remove the temporary directory.
    pub fn close(self) -> Result<()> {
        debug!(tmp_dir = %self.tmp_dir.path().display(), "Removing working directory");
        self.tmp_dir.close()?;
        Ok(())
    }
}

/// A project root plus environment in which commands execute.
///
/// Commands are spawned with the root as their working directory; the
/// harness process's own current directory is never changed, so nothing has
/// to be restored when the scope ends, on any exit path.
#[derive(Debug, Clone, Copy)]
pub struct ProjectScope<'a> {
    root: &'a Path,
    env: &'a BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl<'a> ProjectScope<'a> {
    /// Enter `root`; fails if it does not exist.
    pub fn enter(
        root: &'a Path,
        env: &'a BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if !root.is_dir() {
            return Err(ExtTestError::MissingProjectFile(root.display().to_string()));
        }
        Ok(Self { root, env, timeout })
    }

    pub fn root(&self) -> &'a Path {
        self.root
    }

    /// Resolve a project-relative path.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        run_command(program, args, self.root, self.env, self.timeout).await
    }
}
