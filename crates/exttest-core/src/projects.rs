//! Registry of known external projects.

use crate::config::{BuildDependency, TestConfig};
use crate::error::Result;
use crate::runner::RunnerKind;

/// A project the harness knows how to test.
#[derive(Debug, Clone, Copy)]
pub struct ProjectEntry {
    /// Command-line identifier.
    pub id: &'static str,
    pub runner: RunnerKind,
    config: fn() -> Result<TestConfig>,
}

impl ProjectEntry {
    pub fn config(&self) -> Result<TestConfig> {
        (self.config)()
    }
}

/// All known projects.
pub const PROJECTS: &[ProjectEntry] = &[ProjectEntry {
    id: "prb-math",
    runner: RunnerKind::Foundry,
    config: prb_math,
}];

/// Look up a project by its command-line identifier.
pub fn find_project(id: &str) -> Option<&'static ProjectEntry> {
    PROJECTS.iter().find(|p| p.id == id)
}

/// PRBMath: fixed-point math library built with Foundry.
pub fn prb_math() -> Result<TestConfig> {
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
}
