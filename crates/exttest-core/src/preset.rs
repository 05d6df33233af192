//! Compiler settings presets and their resolution.

use crate::error::{ExtTestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named compiler-setting bundles applied uniformly to a compile/test pass.
///
/// Variants are declared in catalogue order; `Ord` follows that order, so a
/// `BTreeSet<Preset>` iterates deterministically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Preset {
    /// Legacy codegen, optimizer off
    #[serde(rename = "legacy-no-optimize")]
    LegacyNoOptimize,

    /// Via-IR codegen, optimizer off
    #[serde(rename = "ir-no-optimize")]
    IrNoOptimize,

    /// Legacy codegen, EVM optimizer only
    #[serde(rename = "legacy-optimize-evm-only")]
    LegacyOptimizeEvmOnly,

    /// Via-IR codegen, EVM optimizer only
    #[serde(rename = "ir-optimize-evm-only")]
    IrOptimizeEvmOnly,

    /// Legacy codegen, EVM and Yul optimizers
    #[serde(rename = "legacy-optimize-evm+yul")]
    LegacyOptimizeEvmYul,

    /// Via-IR codegen, EVM and Yul optimizers
    #[serde(rename = "ir-optimize-evm+yul")]
    IrOptimizeEvmYul,
}

impl Preset {
    /// Every preset, in catalogue order.
    pub const ALL: [Preset; 6] = [
        Preset::LegacyNoOptimize,
        Preset::IrNoOptimize,
        Preset::LegacyOptimizeEvmOnly,
        Preset::IrOptimizeEvmOnly,
        Preset::LegacyOptimizeEvmYul,
        Preset::IrOptimizeEvmYul,
    ];

    /// Get the preset name as it appears in logs and generated configs.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::LegacyNoOptimize => "legacy-no-optimize",
            Preset::IrNoOptimize => "ir-no-optimize",
            Preset::LegacyOptimizeEvmOnly => "legacy-optimize-evm-only",
            Preset::IrOptimizeEvmOnly => "ir-optimize-evm-only",
            Preset::LegacyOptimizeEvmYul => "legacy-optimize-evm+yul",
            Preset::IrOptimizeEvmYul => "ir-optimize-evm+yul",
        }
    }

    /// (optimizer, via_ir, yul) toggles for this preset.
    fn toggles(&self) -> (bool, bool, bool) {
        match self {
            Preset::LegacyNoOptimize => (false, false, false),
            Preset::IrNoOptimize => (false, true, false),
            Preset::LegacyOptimizeEvmOnly => (true, false, false),
            Preset::IrOptimizeEvmOnly => (true, true, false),
            Preset::LegacyOptimizeEvmYul => (true, false, true),
            Preset::IrOptimizeEvmYul => (true, true, true),
        }
    }

    /// Resolve this preset against an EVM version.
    pub fn settings(&self, evm_version: &str) -> SettingsBundle {
        let (optimizer_enabled, via_ir, yul_details_enabled) = self.toggles();
        SettingsBundle {
            evm_version: evm_version.to_string(),
            optimizer_enabled,
            via_ir,
            yul_details_enabled,
        }
    }

    /// Preset name with `-`/`+` runs replaced by `_`, usable as a TOML key.
    pub fn profile_name(&self) -> String {
        profile_name(self.name())
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = ExtTestError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ExtTestError::InvalidPreset(s.to_string()))
    }
}

/// Concrete compiler settings derived from a preset.
///
/// Only constructed through [`Preset::settings`] or [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsBundle {
    evm_version: String,
    optimizer_enabled: bool,
    via_ir: bool,
    yul_details_enabled: bool,
}

impl SettingsBundle {
    pub fn evm_version(&self) -> &str {
        &self.evm_version
    }

    pub fn optimizer_enabled(&self) -> bool {
        self.optimizer_enabled
    }

    pub fn via_ir(&self) -> bool {
        self.via_ir
    }

    pub fn yul_details_enabled(&self) -> bool {
        self.yul_details_enabled
    }
}

#[derive(Serialize)]
struct OptimizerDetails {
    yul: bool,
}

#[derive(Serialize)]
struct OptimizerSettings {
    enabled: bool,
    details: OptimizerDetails,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StandardJsonSettings<'a> {
    optimizer: OptimizerSettings,
    evm_version: &'a str,
    #[serde(rename = "viaIR")]
    via_ir: bool,
}

// Serialized in the compiler's standard-JSON `settings` shape.
impl Serialize for SettingsBundle {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        StandardJsonSettings {
            optimizer: OptimizerSettings {
                enabled: self.optimizer_enabled,
                details: OptimizerDetails {
                    yul: self.yul_details_enabled,
                },
            },
            evm_version: &self.evm_version,
            via_ir: self.via_ir,
        }
        .serialize(serializer)
    }
}

/// Resolve a preset name and EVM version into a settings bundle.
pub fn resolve(preset_name: &str, evm_version: &str) -> Result<SettingsBundle> {
    Ok(preset_name.parse::<Preset>()?.settings(evm_version))
}

/// Sanitize a preset name into a tool profile identifier.
pub fn profile_name(preset_name: &str) -> String {
    let mut out = String::with_capacity(preset_name.len());
    let mut in_run = false;
    for c in preset_name.chars() {
        if c == '-' || c == '+' {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}
