//! Candidate compiler setup and version resolution.

use crate::config::RefType;
use crate::environment::require_tool;
use crate::error::{ExtTestError, Result};
use crate::git::fetch_project;
use crate::process::run_command;
use crate::workspace::RunnerState;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;
use walkdir::WalkDir;

/// Upstream solc-js wrapper used when no local checkout is given.
pub const SOLC_JS_REPO: &str = "https://github.com/ethereum/solc-js.git";

const FULL_VERSION: &str = r"^[a-zA-Z:, ]*([0-9][^\s]*)";
const SHORT_VERSION: &str = r"^([0-9]+\.[0-9]+\.[0-9]+)";

/// How the candidate compiler is delivered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompilerKind {
    /// A native `solc` executable
    Native,
    /// A `soljson.js` build hosted by the solc-js wrapper
    Solcjs,
}

impl CompilerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerKind::Native => "native",
            CompilerKind::Solcjs => "solcjs",
        }
    }
}

impl fmt::Display for CompilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompilerKind {
    type Err = ExtTestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(CompilerKind::Native),
            "solcjs" => Ok(CompilerKind::Solcjs),
            other => Err(ExtTestError::InvalidConfig(format!(
                "solc binary type must be native or solcjs (got {other:?})"
            ))),
        }
    }
}

/// The compiler binary supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerBinary {
    kind: CompilerKind,
    path: PathBuf,
    solcjs_src_dir: Option<PathBuf>,
}

impl CompilerBinary {
    /// A local solc-js source dir is only meaningful for [`CompilerKind::Solcjs`].
    pub fn new(
        kind: CompilerKind,
        path: impl Into<PathBuf>,
        solcjs_src_dir: Option<PathBuf>,
    ) -> Result<Self> {
        if kind == CompilerKind::Native && solcjs_src_dir.is_some() {
            return Err(ExtTestError::InvalidConfig(
                "a solc-js source directory cannot be used with a native binary".to_string(),
            ));
        }
        Ok(Self {
            kind,
            path: path.into(),
            solcjs_src_dir,
        })
    }

    pub fn native(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: CompilerKind::Native,
            path: path.into(),
            solcjs_src_dir: None,
        }
    }

    pub fn kind(&self) -> CompilerKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn solcjs_src_dir(&self) -> Option<&Path> {
        self.solcjs_src_dir.as_deref()
    }

    /// Set the compiler up inside the run's working directory and read its version.
    pub async fn resolve(&self, state: &RunnerState) -> Result<ResolvedCompiler> {
        let output = match self.kind {
            CompilerKind::Native => {
                info!("Setting up solc...");
                let path = self.path.to_string_lossy();
                run_command(
                    &path,
                    &["--version"],
                    state.root(),
                    state.env(),
                    state.command_timeout(),
                )
                .await?
                .stdout
            }
            CompilerKind::Solcjs => self.setup_solcjs(state).await?,
        };

        let full_version = parse_solc_version(&output)?;
        let short_version = solc_short_version(&full_version)?;
        Ok(ResolvedCompiler {
            kind: self.kind,
            path: self.path.clone(),
            full_version,
            short_version,
        })
    }

    /// Build the solc-js wrapper around the given `soljson.js` and return
    /// its `--version` output.
    async fn setup_solcjs(&self, state: &RunnerState) -> Result<String> {
        if self.path.extension().map(|e| e != "js").unwrap_or(true) {
            return Err(ExtTestError::WrongBinaryType(format!(
                "provided soljson.js is expected to be of the type application/javascript: {}",
                self.path.display()
            )));
        }

        info!("Setting up solc-js...");
        let solc_dir = state.root().join("solc");
        match &self.solcjs_src_dir {
            None => {
                fetch_project(
                    &solc_dir,
                    SOLC_JS_REPO,
                    RefType::Branch,
                    "master",
                    state.env(),
                    state.command_timeout(),
                )
                .await?;
            }
            Some(src) => {
                info!("Using local solc-js from {}...", src.display());
                copy_dir(src, &solc_dir)?;
                for generated in ["dist", "node_modules"] {
                    let path = solc_dir.join(generated);
                    if path.exists() {
                        std::fs::remove_dir_all(path)?;
                    }
                }
            }
        }

        require_tool("npm", state.env(), state.root())
            .map_err(|_| ExtTestError::ToolNotFound("NPM".to_string()))?;
        let env = state.env();
        let timeout = state.command_timeout();
        run_command("npm", &["install"], &solc_dir, env, timeout).await?;
        run_command("npm", &["run", "build"], &solc_dir, env, timeout).await?;

        let dist = solc_dir.join("dist");
        std::fs::create_dir_all(&dist)?;
        std::fs::copy(&self.path, dist.join("soljson.js"))?;

        let output =
            run_command("node", &["dist/solc.js", "--version"], &solc_dir, env, timeout).await?;
        Ok(output.stdout)
    }
}

/// A compiler whose version has been established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCompiler {
    pub kind: CompilerKind,
    pub path: PathBuf,
    /// e.g. `0.8.24+commit.e11b9ed9.Linux.g++`
    pub full_version: String,
    /// e.g. `0.8.24`
    pub short_version: String,
}

/// Extract the full version from `solc --version` style output.
pub fn parse_solc_version(output: &str) -> Result<String> {
    let candidate = output
        .lines()
        .find_map(|line| line.split_once("Version:").map(|(_, v)| v))
        .unwrap_or(output)
        .trim();

    let pattern = Regex::new(FULL_VERSION)?;
    pattern
        .captures(candidate)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ExtTestError::VersionParse(output.trim().to_string()))
}

/// Extract `MAJOR.MINOR.PATCH` from a full version string.
pub fn solc_short_version(full_version: &str) -> Result<String> {
    let pattern = Regex::new(SHORT_VERSION)?;
    pattern
        .captures(full_version)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ExtTestError::VersionParse(format!(
                "error extracting short version string from: {full_version}"
            ))
        })
}

fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(|_| {
            ExtTestError::InvalidConfig(format!(
                "{} is outside {}",
                entry.path().display(),
                src.display()
            ))
        })?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NATIVE_OUTPUT: &str = concat!(
        "solc, the solidity compiler commandline interface\n",
        "Version: 0.8.24+commit.e11b9ed9.Linux.g++\n",
    );

    #[test]
    fn test_parse_native_version() {
        let full = parse_solc_version(NATIVE_OUTPUT).unwrap();
        assert_eq!(full, "0.8.24+commit.e11b9ed9.Linux.g++");
        assert_eq!(solc_short_version(&full).unwrap(), "0.8.24");
    }

    #[test]
    fn test_parse_solcjs_version() {
        let output = "0.8.25-nightly.2024.3.1+commit.abcdef12.Emscripten.clang\n";
        let full = parse_solc_version(output).unwrap();
        assert_eq!(full, "0.8.25-nightly.2024.3.1+commit.abcdef12.Emscripten.clang");
        assert_eq!(solc_short_version(&full).unwrap(), "0.8.25");
    }

    #[test]
    fn test_parse_version_failure() {
        let err = parse_solc_version("command not found: solc").unwrap_err();
        assert!(matches!(err, ExtTestError::VersionParse(_)));
        assert!(solc_short_version("develop").is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("native".parse::<CompilerKind>().unwrap(), CompilerKind::Native);
        assert_eq!("solcjs".parse::<CompilerKind>().unwrap(), CompilerKind::Solcjs);
        assert!("wasm".parse::<CompilerKind>().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_native_with_solcjs_dir_rejected() {
        let src = Some(PathBuf::from("/src"));
        let err =
            CompilerBinary::new(CompilerKind::Native, "/usr/bin/solc", src.clone()).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(CompilerBinary::new(CompilerKind::Solcjs, "soljson.js", src).is_ok());
    }

    #[test]
    fn test_copy_dir_preserves_layout() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("dist/bin")).unwrap();
        std::fs::create_dir_all(src.path().join("empty")).unwrap();
        std::fs::write(src.path().join("package.json"), "{}").unwrap();
        std::fs::write(src.path().join("dist/bin/solc.js"), "// wrapper").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("solc");
        copy_dir(src.path(), &target).unwrap();

        assert_eq!(std::fs::read_to_string(target.join("package.json")).unwrap(), "{}");
        assert_eq!(
            std::fs::read_to_string(target.join("dist/bin/solc.js")).unwrap(),
            "// wrapper"
        );
        assert!(target.join("empty").is_dir());
    }

    #[tokio::test]
    async fn test_solcjs_requires_javascript_binary() {
        let state = RunnerState::new("solcjs", "shanghai", None).unwrap();
        let binary =
            CompilerBinary::new(CompilerKind::Solcjs, "/tmp/solc-static-linux", None).unwrap();
        let err = binary.resolve(&state).await.unwrap_err();
        assert!(matches!(err, ExtTestError::WrongBinaryType(_)));
        assert!(!state.root().join("solc").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_native_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let solc = dir.path().join("solc");
        let script = format!("#!/bin/sh\nprintf '{}'\n", NATIVE_OUTPUT.replace('\n', "\\n"));
        std::fs::write(&solc, script).unwrap();
        std::fs::set_permissions(&solc, std::fs::Permissions::from_mode(0o755)).unwrap();

        let state = RunnerState::new("native", "shanghai", None).unwrap();
        let resolved = CompilerBinary::native(&solc).resolve(&state).await.unwrap();
        assert_eq!(resolved.short_version, "0.8.24");
        assert_eq!(resolved.path, solc);
        assert_eq!(resolved.kind, CompilerKind::Native);
    }
}
