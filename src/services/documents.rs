//! Document file I/O service.
//!
//! This module centralizes every read and write of `karabiner.json`. The
//! document is read once and written at most once per run.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::models::KarabinerDocument;

/// Service for loading and persisting the rule document.
pub struct DocumentService;

impl DocumentService {
    /// Loads and parses a document.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to `karabiner.json`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use lazykarabiner::services::DocumentService;
    ///
    /// let doc = DocumentService::load(Path::new("karabiner.json"))?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: &Path) -> Result<KarabinerDocument> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        KarabinerDocument::parse(&text)
            .with_context(|| format!("Failed to parse document {}", path.display()))
    }

    /// Writes a document using a temp file + rename pattern.
    ///
    /// Nothing is written when the rendered text equals the file's current
    /// content. Returns whether the file was rewritten.
    pub fn save(document: &KarabinerDocument, path: &Path) -> Result<bool> {
        let content = document.to_pretty_string()?;

        if let Ok(current) = fs::read_to_string(path) {
            if current == content {
                debug!("{} unchanged, not rewriting", path.display());
                return Ok(false);
            }
        }

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).with_context(|| {
            format!("Failed to write temp document: {}", temp_path.display())
        })?;
        fs::rename(&temp_path, path).with_context(|| {
            format!("Failed to rename temp document to: {}", path.display())
        })?;

        info!("Wrote {}", path.display());
        Ok(true)
    }
}
