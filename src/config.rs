//! Configuration management for the application.
//!
//! This module handles loading, validating, and saving application configuration
//! in TOML format with platform-specific directory resolution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{CONFIG_DIR_NAME, CONFIG_ENV_VAR};
use crate::models::{RuleTarget, Selector};
use crate::parser::SpecFormat;
use crate::services::SpliceOptions;

const fn default_true() -> bool {
    true
}

/// Path configuration for file system locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Rule document; defaults to `~/.config/karabiner/karabiner.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<PathBuf>,
    /// Layer specification file (TOML, JSON/JSON5 or YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_spec: Option<PathBuf>,
}

impl PathConfig {
    /// The configured document path, or Karabiner-Elements' default location.
    pub fn document_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.document {
            return Ok(path.clone());
        }
        Ok(dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".config")
            .join("karabiner")
            .join("karabiner.json"))
    }
}

/// Splice behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpliceConfig {
    /// Adopt unmarked rules that match a synthesized signature
    #[serde(default = "default_true")]
    pub detect_unmarked: bool,
    /// Remove marked rules of layers no longer in the layer spec
    #[serde(default = "default_true")]
    pub prune_orphans: bool,
    /// Abort on ordering violations involving generated rules
    #[serde(default = "default_true")]
    pub strict_ordering: bool,
    /// Add mode guards to hand-authored rules in a layer's key space
    #[serde(default = "default_true")]
    pub patch_foreign: bool,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        Self {
            detect_unmarked: true,
            prune_orphans: true,
            strict_ordering: true,
            patch_foreign: true,
        }
    }
}

impl From<SpliceConfig> for SpliceOptions {
    fn from(config: SpliceConfig) -> Self {
        Self {
            detect_unmarked: config.detect_unmarked,
            prune_orphans: config.prune_orphans,
            strict_ordering: config.strict_ordering,
            patch_foreign: config.patch_foreign,
        }
    }
}

/// Application configuration.
///
/// # File Location
///
/// - Linux: `~/.config/lazykarabiner/config.toml`
/// - macOS: `~/Library/Application Support/lazykarabiner/config.toml`
/// - Windows: `%APPDATA%\lazykarabiner\config.toml`
///
/// `LAZYKARABINER_CONFIG` or `--config` point at another file.
///
/// # Validation
///
/// - `layer_spec` must have a supported extension
/// - named profile/rule selectors must not be empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// File system paths
    #[serde(default)]
    pub paths: PathConfig,
    /// Selected profile and rule list
    #[serde(default)]
    pub target: RuleTarget,
    /// Splice settings
    #[serde(default)]
    pub splice: SpliceConfig,
}

impl Config {
    /// Creates a new Config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if the configuration has been properly set up.
    ///
    /// A config is considered "configured" once a layer spec is set.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.paths.layer_spec.is_some()
    }

    /// Gets the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join(CONFIG_DIR_NAME);

        Ok(config_dir)
    }

    /// Gets the full path to the config file, honoring `LAZYKARABINER_CONFIG`.
    pub fn config_file_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Resolves the config file: explicit path first, then the default location.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::config_file_path(),
        }
    }

    /// Loads configuration from a file.
    ///
    /// If the file doesn't exist, returns default configuration.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(config_path).context(format!(
            "Failed to read config file: {}",
            config_path.display()
        ))?;

        let config: Self = toml::from_str(&content).context(format!(
            "Failed to parse config file: {}",
            config_path.display()
        ))?;

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration using atomic write.
    ///
    /// Uses temp file + rename pattern for atomic writes.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(config_dir) = config_path.parent() {
            fs::create_dir_all(config_dir).context(format!(
                "Failed to create config directory: {}",
                config_dir.display()
            ))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        let temp_path = config_path.with_extension("toml.tmp");

        // Write to temp file
        fs::write(&temp_path, content).context(format!(
            "Failed to write temp config file: {}",
            temp_path.display()
        ))?;

        // Atomic rename
        fs::rename(&temp_path, config_path).context(format!(
            "Failed to rename temp config file to: {}",
            config_path.display()
        ))?;

        Ok(())
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<()> {
        if let Some(spec) = &self.paths.layer_spec {
            SpecFormat::from_path(spec).context("Invalid paths.layer_spec")?;
        }

        for (label, selector) in [("profile", &self.target.profile), ("rule", &self.target.rule)] {
            if let Selector::Name(name) = selector {
                if name.trim().is_empty() {
                    anyhow::bail!("target.{label} cannot be an empty name");
                }
            }
        }

        Ok(())
    }
}
