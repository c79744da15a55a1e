//! Configuration loading for `safe-aur`.
//!
//! Loaded once at startup and threaded through explicitly; no ambient global
//! state, so tests can run with distinct threshold sets.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use safe_aur_core::Severity;

use crate::gate::PolicyThresholds;

/// Default severity at which installation is refused outright.
pub const DEFAULT_BLOCK_LEVEL: Severity = Severity::Critical;
/// Default severity at which findings are surfaced and confirmation required.
pub const DEFAULT_WARN_LEVEL: Severity = Severity::Moderate;
/// Default maximum cache record age in days.
pub const DEFAULT_CACHE_MAX_AGE_DAYS: u64 = 90;
/// Default analysis command invoked for verdicts.
pub const DEFAULT_PROVIDER_COMMAND: &str = "claude";

/// Top-level runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SafeAurConfig {
    pub provider: ProviderConfig,
    pub thresholds: ThresholdConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Executable invoked as the external analysis capability.
    pub command: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub block_level: Severity,
    pub warn_level: Severity,
    pub auto_proceed_safe: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_age_days: u64,
}

impl Default for SafeAurConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            thresholds: ThresholdConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_PROVIDER_COMMAND.to_string(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            block_level: DEFAULT_BLOCK_LEVEL,
            warn_level: DEFAULT_WARN_LEVEL,
            auto_proceed_safe: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: DEFAULT_CACHE_MAX_AGE_DAYS,
        }
    }
}

impl SafeAurConfig {
    /// Loads the config file, falling back to defaults when it is absent.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid safe-aur configuration")
    }

    pub fn policy_thresholds(&self) -> PolicyThresholds {
        PolicyThresholds {
            block_at: self.thresholds.block_level,
            warn_at: self.thresholds.warn_level,
            auto_proceed_on_warn: self.thresholds.auto_proceed_safe,
        }
    }
}

fn config_path() -> PathBuf {
    if let Some(explicit) = env::var_os("SAFE_AUR_CONFIG_PATH") {
        return PathBuf::from(explicit);
    }

    if let Some(xdg_config) = env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config).join("safe-aur").join("config.toml");
    }

    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".config").join("safe-aur").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("safe-aur.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = SafeAurConfig::default();
        assert_eq!(config.thresholds.block_level, Severity::Critical);
        assert_eq!(config.thresholds.warn_level, Severity::Moderate);
        assert!(!config.thresholds.auto_proceed_safe);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_age_days, 90);
        assert_eq!(config.provider.command, "claude");
    }

    #[test]
    fn partial_toml_layers_over_defaults() {
        let config = SafeAurConfig::from_toml_str(
            r#"
[thresholds]
block_level = "HIGH"
auto_proceed_safe = true

[cache]
max_age_days = 14
"#,
        )
        .expect("parse partial config");

        assert_eq!(config.thresholds.block_level, Severity::High);
        assert_eq!(config.thresholds.warn_level, Severity::Moderate);
        assert!(config.thresholds.auto_proceed_safe);
        assert_eq!(config.cache.max_age_days, 14);
        assert!(config.cache.enabled);
    }

    #[test]
    fn empty_toml_is_the_default_config() {
        let config = SafeAurConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(config.thresholds.block_level, DEFAULT_BLOCK_LEVEL);
        assert_eq!(config.cache.max_age_days, DEFAULT_CACHE_MAX_AGE_DAYS);
    }

    #[test]
    fn unknown_severity_label_in_config_is_rejected() {
        let err = SafeAurConfig::from_toml_str(
            r#"
[thresholds]
warn_level = "SOMEWHAT_BAD"
"#,
        )
        .expect_err("invalid severity label");
        assert!(err.to_string().contains("invalid safe-aur configuration"));
    }

    #[test]
    fn policy_thresholds_mirror_the_threshold_section() {
        let config = SafeAurConfig::from_toml_str(
            r#"
[thresholds]
block_level = "HIGH"
warn_level = "LOW"
"#,
        )
        .expect("parse config");
        let policy = config.policy_thresholds();
        assert_eq!(policy.block_at, Severity::High);
        assert_eq!(policy.warn_at, Severity::Low);
        assert!(!policy.auto_proceed_on_warn);
    }
}
