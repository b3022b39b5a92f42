//! Configuration management.
//!
//! Configuration is layered: embedded defaults, then an optional TOML file
//! (`secretscan.toml` in the working directory, or an explicit path), then
//! `SECRETSCAN_`-prefixed environment variables with the highest priority.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scanner::patterns::RuleDefinition;
use crate::scanner::types::ScanMode;

// Embedded at compile time so the binary works with zero setup.
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Fully merged, typed configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanConfig {
    pub scanner: ScannerSection,
    pub cache: CacheSection,
    pub validator: ValidatorSection,
    /// Custom rules appended to the built-in catalog
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSection {
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default)]
    pub max_threads: usize,
    #[serde(default = "default_thread_percentage")]
    pub thread_percentage: u8,
    #[serde(default = "default_min_files_for_parallel")]
    pub min_files_for_parallel: usize,
    #[serde(default = "default_max_in_memory_file_mb")]
    pub max_in_memory_file_mb: u64,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_directory")]
    pub directory: String,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSection {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_thread_percentage() -> u8 {
    75
}

fn default_min_files_for_parallel() -> usize {
    50
}

fn default_max_in_memory_file_mb() -> u64 {
    8
}

fn default_true() -> bool {
    true
}

fn default_cache_directory() -> String {
    ".secretscan".to_string()
}

fn default_retention_hours() -> u64 {
    24
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            mode: ScanMode::Auto,
            max_threads: 0,
            thread_percentage: default_thread_percentage(),
            min_files_for_parallel: default_min_files_for_parallel(),
            max_in_memory_file_mb: default_max_in_memory_file_mb(),
            ignore: Vec::new(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_directory(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ScanConfig {
    /// Load with the standard layering: embedded defaults, repo config,
    /// environment variables.
    pub fn load() -> Result<Self> {
        Self::load_with_custom_config(None)
    }

    /// Load with an explicit config file instead of the repo lookup.
    pub fn load_with_custom_config(custom_config: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        if let Some(custom_path) = custom_config {
            figment = figment.merge(Toml::file(custom_path));
        } else {
            figment = figment.merge(Toml::file("secretscan.toml"));
        }

        // Environment variables always have highest priority. Double
        // underscore separates nesting levels, so SECRETSCAN_CACHE__ENABLED
        // maps to cache.enabled without mangling keys like retention_hours.
        figment = figment.merge(Env::prefixed("SECRETSCAN_").split("__"));

        figment
            .extract()
            .context("failed to load configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_load() {
        let config = ScanConfig::load().expect("defaults should load");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.retention_hours, 24);
        assert_eq!(config.validator.probe_timeout_ms, 1000);
        assert_eq!(config.scanner.thread_percentage, 75);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_custom_config_overrides_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[cache]
enabled = false
retention_hours = 1

[[rules]]
id = "corp-token"
name = "Corporate Token"
pattern = 'corp_[a-z0-9]{16}'
"#,
        )
        .unwrap();

        let config =
            ScanConfig::load_with_custom_config(Some(path.to_str().unwrap())).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.retention_hours, 1);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].id, "corp-token");
        // Unspecified values keep their defaults.
        assert_eq!(config.validator.probe_timeout_ms, 1000);
    }

    #[test]
    fn test_missing_custom_config_falls_back_to_defaults() {
        let config = ScanConfig::load_with_custom_config(Some("does-not-exist.toml"));
        assert!(config.is_ok());
    }
}
