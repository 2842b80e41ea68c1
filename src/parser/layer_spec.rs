//! Layer specification file parser.
//!
//! The format is chosen by file extension: TOML (`.toml`), JSON or JSON5
//! (`.json`, `.json5`) and YAML (`.yaml`, `.yml`). Every format maps onto the
//! same [`LayerSpec`] schema.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::models::LayerSpec;

/// Supported spec file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    /// `.toml`
    Toml,
    /// `.json` / `.json5` (JSON is a subset of JSON5)
    Json5,
    /// `.yaml` / `.yml`
    Yaml,
}

impl SpecFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "toml" => Ok(Self::Toml),
            "json" | "json5" => Ok(Self::Json5),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => anyhow::bail!(
                "Unsupported layer spec extension '{}' for {} (expected toml, json, json5, yaml or yml)",
                other,
                path.display()
            ),
        }
    }
}

/// Parses spec text in the given format without validating it.
pub fn parse_layer_spec_str(content: &str, format: SpecFormat) -> Result<LayerSpec> {
    let spec = match format {
        SpecFormat::Toml => toml::from_str(content).context("Failed to parse TOML layer spec")?,
        SpecFormat::Json5 => json5::from_str(content).context("Failed to parse JSON layer spec")?,
        SpecFormat::Yaml => {
            serde_yml::from_str(content).context("Failed to parse YAML layer spec")?
        }
    };
    Ok(spec)
}

/// Loads a layer spec file.
///
/// # Arguments
///
/// * `path` - Path to the layer spec file
///
/// # Returns
///
/// The parsed spec. Consistency checks run later, during synthesis.
pub fn parse_layer_spec(path: &Path) -> Result<LayerSpec> {
    let format = SpecFormat::from_path(path)?;
    let content = fs::read_to_string(path)
        .context(format!("Failed to read layer spec: {}", path.display()))?;

    parse_layer_spec_str(&content, format)
        .context(format!("Failed to load layer spec: {}", path.display()))
}
