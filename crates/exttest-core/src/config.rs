//! Test configuration and harness-wide settings.

use crate::error::{ExtTestError, Result};
use crate::preset::Preset;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// EVM version used when neither the test nor the environment pins one.
pub const DEFAULT_EVM_VERSION: &str = "shanghai";

/// How the pinned revision of a project is named.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Commit,
    Branch,
    Tag,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Commit => "commit",
            RefType::Branch => "branch",
            RefType::Tag => "tag",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefType {
    type Err = ExtTestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "commit" => Ok(RefType::Commit),
            "branch" => Ok(RefType::Branch),
            "tag" => Ok(RefType::Tag),
            other => Err(ExtTestError::InvalidConfig(format!(
                "ref type must be one of commit, branch, tag (got {other:?})"
            ))),
        }
    }
}

/// Toolchain the project itself needs before its build tool can run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildDependency {
    #[default]
    Nodejs,
    Rust,
}

/// Immutable descriptor of one external project under test.
///
/// Deserialization goes through [`TestConfigBuilder::build`], so a
/// deserialized config is validated like a built one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "TestConfigRecord")]
pub struct TestConfig {
    name: String,
    repo_url: String,
    ref_type: RefType,
    git_ref: String,
    build_dependency: BuildDependency,
    compile_only_presets: BTreeSet<Preset>,
    settings_presets: BTreeSet<Preset>,
    evm_version: Option<String>,
}

impl TestConfig {
    /// Start building a configuration for `name` hosted at `repo_url`.
    pub fn builder(name: impl Into<String>, repo_url: impl Into<String>) -> TestConfigBuilder {
        TestConfigBuilder {
            name: name.into(),
            repo_url: repo_url.into(),
            ref_type: "branch".to_string(),
            git_ref: "master".to_string(),
            build_dependency: BuildDependency::default(),
            compile_only_presets: Vec::new(),
            settings_presets: None,
            evm_version: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn ref_type(&self) -> RefType {
        self.ref_type
    }

    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    pub fn build_dependency(&self) -> BuildDependency {
        self.build_dependency
    }

    pub fn compile_only_presets(&self) -> &BTreeSet<Preset> {
        &self.compile_only_presets
    }

    pub fn settings_presets(&self) -> &BTreeSet<Preset> {
        &self.settings_presets
    }

    /// EVM version pinned by this test, if any.
    pub fn evm_version(&self) -> Option<&str> {
        self.evm_version.as_deref()
    }

    /// Union of compile-only and fully tested presets.
    pub fn selected_presets(&self) -> BTreeSet<Preset> {
        self.compile_only_presets
            .union(&self.settings_presets)
            .copied()
            .collect()
    }

    /// Whether `preset` is built without running the test suite.
    ///
    /// A preset listed in both sets counts as compile-only.
    pub fn is_compile_only(&self, preset: Preset) -> bool {
        self.compile_only_presets.contains(&preset)
    }

    /// Deterministic SHA-256 identity of this configuration.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.name.as_str(),
            self.repo_url.as_str(),
            self.ref_type.as_str(),
            self.git_ref.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        for preset in self.selected_presets() {
            hasher.update(preset.name().as_bytes());
            hasher.update(if self.is_compile_only(preset) { b"c" } else { b"t" });
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Builder for [`TestConfig`]; all validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    name: String,
    repo_url: String,
    ref_type: String,
    git_ref: String,
    build_dependency: BuildDependency,
    compile_only_presets: Vec<String>,
    settings_presets: Option<Vec<String>>,
    evm_version: Option<String>,
}

impl TestConfigBuilder {
    /// Pin the revision: `ref_type` is one of commit, branch or tag.
    pub fn reference(mut self, ref_type: impl Into<String>, git_ref: impl Into<String>) -> Self {
        self.ref_type = ref_type.into();
        self.git_ref = git_ref.into();
        self
    }

    pub fn build_dependency(mut self, dependency: BuildDependency) -> Self {
        self.build_dependency = dependency;
        self
    }

    pub fn compile_only_presets<I, S>(mut self, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compile_only_presets = presets.into_iter().map(Into::into).collect();
        self
    }

    /// Presets that are built and tested. Defaults to the whole catalogue.
    pub fn settings_presets<I, S>(mut self, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings_presets = Some(presets.into_iter().map(Into::into).collect());
        self
    }

    pub fn evm_version(mut self, evm_version: impl Into<String>) -> Self {
        self.evm_version = Some(evm_version.into());
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<TestConfig> {
        for (field, value) in [
            ("name", &self.name),
            ("repo_url", &self.repo_url),
            ("ref", &self.git_ref),
        ] {
            if value.trim().is_empty() {
                return Err(ExtTestError::InvalidConfig(format!("{field} must not be empty")));
            }
        }

        let ref_type = self.ref_type.parse::<RefType>()?;
        let compile_only_presets = parse_presets(&self.compile_only_presets)?;
        let settings_presets = match &self.settings_presets {
            Some(names) => parse_presets(names)?,
            None => Preset::ALL.into_iter().collect(),
        };

        Ok(TestConfig {
            name: self.name,
            repo_url: self.repo_url,
            ref_type,
            git_ref: self.git_ref,
            build_dependency: self.build_dependency,
            compile_only_presets,
            settings_presets,
            evm_version: self.evm_version,
        })
    }
}

/// Serialized shape of a [`TestConfig`].
#[derive(Deserialize)]
struct TestConfigRecord {
    name: String,
    repo_url: String,
    ref_type: RefType,
    git_ref: String,
    #[serde(default)]
    build_dependency: BuildDependency,
    #[serde(default)]
    compile_only_presets: Vec<Preset>,
    settings_presets: Option<Vec<Preset>>,
    #[serde(default)]
    evm_version: Option<String>,
}

impl TryFrom<TestConfigRecord> for TestConfig {
    type Error = ExtTestError;

    fn try_from(record: TestConfigRecord) -> Result<Self> {
        let mut builder = TestConfig::builder(record.name, record.repo_url)
            .reference(record.ref_type.as_str(), record.git_ref)
            .build_dependency(record.build_dependency)
            .compile_only_presets(record.compile_only_presets.iter().map(Preset::name));
        if let Some(settings) = record.settings_presets {
            builder = builder.settings_presets(settings.iter().map(Preset::name));
        }
        if let Some(evm_version) = record.evm_version {
            builder = builder.evm_version(evm_version);
        }
        builder.build()
    }
}

fn parse_presets(names: &[String]) -> Result<BTreeSet<Preset>> {
    names
        .iter()
        .map(|name| {
            name.parse::<Preset>()
                .map_err(|_| ExtTestError::InvalidConfig(format!("unrecognized preset {name:?}")))
        })
        .collect()
}

/// Harness-wide settings handed explicitly to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// EVM version for tests that don't pin their own.
    pub default_evm_version: String,

    /// Skip the test step for every preset.
    pub compile_only: bool,

    /// Optional limit applied to each external command.
    pub command_timeout: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            default_evm_version: DEFAULT_EVM_VERSION.to_string(),
            compile_only: false,
            command_timeout: None,
        }
    }
}

impl HarnessConfig {
    /// Read `DEFAULT_EVM` and `COMPILE_ONLY` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(evm) = lookup("DEFAULT_EVM").filter(|v| !v.is_empty()) {
            config.default_evm_version = evm;
        }
        config.compile_only = lookup("COMPILE_ONLY").as_deref() == Some("1");
        config
    }

    pub fn with_default_evm_version(mut self, evm_version: impl Into<String>) -> Self {
        self.default_evm_version = evm_version.into();
        self
    }

    pub fn with_compile_only(mut self, compile_only: bool) -> Self {
        self.compile_only = compile_only;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }
}
