//! Project environment preparation shared by all runners.
//!
//! - Tool discovery on `PATH`
//! - Node.js project preparation (lock files, package.json hooks)
//! - Version pragma rewriting so unreleased compilers are accepted

use crate::error::{ExtTestError, Result};
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const VERSION_PRAGMA: &str = r"pragma solidity [^;]+;";
const RELAXED_PRAGMA: &str = "pragma solidity >=0.0;";

/// Lock files that would override the harness's package.json changes.
const LOCK_FILES: [&str; 2] = ["yarn.lock", "package-lock.json"];

/// package.json scripts that run as install-time side effects.
const DISABLED_HOOKS: [&str; 2] = ["prepublish", "prepare"];

/// Locate an executable on the `PATH` of `env`. Relative `PATH` entries
/// resolve against `cwd`.
pub fn find_tool(name: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Option<PathBuf> {
    which::which_in(name, env.get("PATH"), cwd).ok()
}

/// Like [`find_tool`], failing with [`ExtTestError::ToolNotFound`].
pub fn require_tool(name: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<PathBuf> {
    find_tool(name, env, cwd).ok_or_else(|| ExtTestError::ToolNotFound(name.to_string()))
}

/// Relax every version pragma in `content`. Borrowed when nothing matched.
pub fn rewrite_version_pragmas<'a>(pattern: &Regex, content: &'a str) -> Cow<'a, str> {
    pattern.replace_all(content, RELAXED_PRAGMA)
}

/// Replace fixed-version pragmas in every `.sol` file under `root`.
///
/// Walks all directories, including installed dependencies. Files without
/// a pragma are left untouched. Returns the number of files rewritten.
pub fn replace_version_pragmas(root: &Path) -> Result<usize> {
    info!("Replacing fixed-version pragmas...");
    let pattern = Regex::new(VERSION_PRAGMA)?;
    let mut rewritten = 0;

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.path().extension().map_or(true, |e| e != "sol") {
            continue;
        }
        let source = entry.path();
        let content = std::fs::read_to_string(source)?;
        if let Cow::Owned(updated) = rewrite_version_pragmas(&pattern, &content) {
            std::fs::write(source, updated)?;
            rewritten += 1;
        }
    }

    debug!(rewritten, "Version pragmas replaced");
    Ok(rewritten)
}

/// Prepare a Node.js based project: require `node`, drop lock files and
/// disable install hooks in `package.json`.
pub fn prepare_node_env(project_dir: &Path, env: &BTreeMap<String, String>) -> Result<()> {
    require_tool("node", env, project_dir)
        .map_err(|_| ExtTestError::ToolNotFound("nodejs".to_string()))?;
    remove_lock_files(project_dir)?;
    disable_package_hooks(project_dir)
}

fn remove_lock_files(project_dir: &Path) -> Result<()> {
    info!("Removing package lock files...");
    for lock in LOCK_FILES {
        match std::fs::remove_file(project_dir.join(lock)) {
            Ok(()) => debug!(file = lock, "Removed lock file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn disable_package_hooks(project_dir: &Path) -> Result<()> {
    info!("Disabling package.json hooks...");
    let package_json = project_dir.join("package.json");
    if !package_json.exists() {
        return Err(ExtTestError::MissingProjectFile("package.json".to_string()));
    }

    let mut content = std::fs::read_to_string(&package_json)?;
    for hook in DISABLED_HOOKS {
        let pattern = Regex::new(&format!(r#"("{hook}":)\s".+""#))?;
        content = pattern.replace_all(&content, r#"$1 """#).into_owned();
    }
    std::fs::write(&package_json, content)?;
    Ok(())
}
