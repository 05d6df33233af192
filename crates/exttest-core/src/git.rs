//! Git integration: shallow fetch of pinned project revisions.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{RefType, TestConfig};
use crate::error::{ExtTestError, Result};
use crate::process::run_command;
use crate::workspace::RunnerState;

/// Source of the project checkout for a run.
#[async_trait]
pub trait ProjectFetcher: Send + Sync {
    /// Populate `state.project_dir()` with the configured revision and
    /// return the checked-out commit hash.
    async fn fetch(&self, config: &TestConfig, state: &RunnerState) -> Result<String>;
}

/// Fetches projects with the `git` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

#[async_trait]
impl ProjectFetcher for GitFetcher {
    async fn fetch(&self, config: &TestConfig, state: &RunnerState) -> Result<String> {
        fetch_project(
            state.project_dir(),
            config.repo_url(),
            config.ref_type(),
            config.git_ref(),
            state.env(),
            state.command_timeout(),
        )
        .await
    }
}

/// Shallow-fetch `git_ref` of `repo_url` into `dest` and return HEAD.
///
/// Commits are fetched with init + fetch + hard reset; branches and tags
/// with a depth-1 clone. Submodules are initialised when `.gitmodules`
/// exists. Any git failure is reported as [`ExtTestError::CloneFailed`].
pub async fn fetch_project(
    dest: &Path,
    repo_url: &str,
    ref_type: RefType,
    git_ref: &str,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
) -> Result<String> {
    info!("Cloning {} {} of {}...", ref_type, git_ref, repo_url);

    checkout(dest, repo_url, ref_type, git_ref, env, timeout)
        .await
        .map_err(|e| ExtTestError::CloneFailed {
            url: repo_url.to_string(),
            reference: format!("{ref_type} {git_ref}"),
            reason: e.to_string(),
        })?;

    let sha = capture_head_sha(dest, env).await?;
    info!("Current commit hash: {}", sha);
    Ok(sha)
}

async fn checkout(
    dest: &Path,
    repo_url: &str,
    ref_type: RefType,
    git_ref: &str,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
) -> Result<()> {
    match ref_type {
        RefType::Commit => {
            std::fs::create_dir_all(dest)?;
            run_command("git", &["init", "--quiet"], dest, env, timeout).await?;
            run_command("git", &["remote", "add", "origin", repo_url], dest, env, timeout).await?;
            run_command("git", &["fetch", "--depth", "1", "origin", git_ref], dest, env, timeout)
                .await?;
            run_command("git", &["reset", "--hard", "FETCH_HEAD"], dest, env, timeout).await?;
        }
        RefType::Branch | RefType::Tag => {
            let parent = dest.parent().ok_or_else(|| {
                ExtTestError::InvalidConfig(format!("{} has no parent directory", dest.display()))
            })?;
            std::fs::create_dir_all(parent)?;
            let dest_str = dest.to_string_lossy();
            run_command(
                "git",
                &["clone", "--depth", "1", repo_url, "-b", git_ref, dest_str.as_ref()],
                parent,
                env,
                timeout,
            )
            .await?;
            if !dest.is_dir() {
                return Err(ExtTestError::MissingProjectFile(dest.display().to_string()));
            }
        }
    }

    if dest.join(".gitmodules").exists() {
        info!("Initializing submodules...");
        run_command("git", &["submodule", "update", "--init", "--recursive"], dest, env, timeout)
            .await?;
    }
    Ok(())
}

/// Capture the HEAD commit SHA from a git repository.
pub async fn capture_head_sha(repo_dir: &Path, env: &BTreeMap<String, String>) -> Result<String> {
    let output = run_command("git", &["rev-parse", "HEAD"], repo_dir, env, None).await?;
    let sha = output.stdout.trim().to_string();
    if sha.is_empty() {
        return Err(ExtTestError::CommandFailed {
            command: output.command,
            exit_code: 0,
            stderr: "git rev-parse HEAD returned empty output".to_string(),
        });
    }
    Ok(sha)
}
