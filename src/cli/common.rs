//! Shared CLI types: errors, exit codes and input resolution.

use crate::config::Config;
use crate::constants::APP_BINARY_NAME;
use crate::models::{KarabinerDocument, LayerSpec, Manipulator, RuleTarget, Selector, TargetNotFound};
use crate::parser::parse_layer_spec;
use crate::services::{DocumentService, RuleSynthesizer, SpliceError, SpliceErrorKind, Synthesis};
use clap::Args;
use std::fmt;
use std::path::{Path, PathBuf};

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Everything succeeded
    Success = 0,
    /// Anchor, classification or invariant failure
    SpliceFailure = 1,
    /// Spec or config validation failed
    InvalidInput = 2,
    /// A file could not be read or written
    Io = 3,
}

impl ExitCode {
    /// Numeric process status.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Error returned by command handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    /// Exit code the process terminates with
    pub kind: ExitCode,
    /// Message printed to stderr
    pub message: String,
}

impl CliError {
    /// Creates an error with an explicit exit code.
    pub fn new(kind: ExitCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// File system failure.
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Io, message)
    }

    /// Invalid spec, config or arguments.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ExitCode::InvalidInput, message)
    }

    /// Splice failure that is not a spec problem.
    pub fn splice(message: impl Into<String>) -> Self {
        Self::new(ExitCode::SpliceFailure, message)
    }

    /// Maps an `anyhow` error: I/O causes give [`ExitCode::Io`], missing
    /// document structure gives [`ExitCode::SpliceFailure`], anything else is
    /// treated as invalid input.
    pub fn from_anyhow(context: &str, err: &anyhow::Error) -> Self {
        let message = format!("{context}: {err:#}");
        if err.chain().any(|cause| cause.is::<std::io::Error>()) {
            Self::io(message)
        } else if err.chain().any(|cause| cause.is::<TargetNotFound>()) {
            Self::splice(message)
        } else {
            Self::validation(message)
        }
    }
}

impl From<SpliceError> for CliError {
    fn from(err: SpliceError) -> Self {
        match err.kind {
            SpliceErrorKind::InvalidSpec => Self::validation(err.to_string()),
            _ => Self::splice(err.to_string()),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for command handlers.
pub type CliResult<T> = Result<T, CliError>;

/// Layer spec selection.
#[derive(Debug, Clone, Default, Args)]
pub struct SpecArgs {
    /// Layer spec file (overrides paths.layer_spec)
    #[arg(short = 's', long, value_name = "FILE")]
    pub layer_spec: Option<PathBuf>,
}

impl SpecArgs {
    /// Resolves the layer spec path from the flag or the config.
    pub fn spec_path(&self, config: &Config) -> CliResult<PathBuf> {
        self.layer_spec
            .clone()
            .or_else(|| config.paths.layer_spec.clone())
            .ok_or_else(|| {
                CliError::validation(format!(
                    "No layer spec configured. Pass --layer-spec or run \
                     `{APP_BINARY_NAME} config set --layer-spec FILE`"
                ))
            })
    }

    /// Loads the layer spec and synthesizes its rules.
    pub fn load(&self, config: &Config) -> CliResult<(LayerSpec, Synthesis)> {
        let path = self.spec_path(config)?;
        let spec = load_spec(&path)?;
        let synthesis = RuleSynthesizer::new(&spec).synthesize()?;
        Ok((spec, synthesis))
    }
}

/// Spec plus document selection, shared by commands that edit the document.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Rule document (overrides paths.document)
    #[arg(short, long, value_name = "FILE")]
    pub document: Option<PathBuf>,

    /// Profile index or name (overrides target.profile)
    #[arg(long, value_name = "PROFILE")]
    pub profile: Option<Selector>,

    /// Rule index or description (overrides target.rule)
    #[arg(long, value_name = "RULE")]
    pub rule: Option<Selector>,
}

impl SourceArgs {
    /// Resolves the document path.
    pub fn document_path(&self, config: &Config) -> CliResult<PathBuf> {
        match &self.document {
            Some(path) => Ok(path.clone()),
            None => config
                .paths
                .document_path()
                .map_err(|e| CliError::from_anyhow("Failed to resolve document path", &e)),
        }
    }

    /// The rule list location, flags first.
    pub fn target(&self, config: &Config) -> RuleTarget {
        RuleTarget {
            profile: self
                .profile
                .clone()
                .unwrap_or_else(|| config.target.profile.clone()),
            rule: self
                .rule
                .clone()
                .unwrap_or_else(|| config.target.rule.clone()),
        }
    }
}

/// Loads a layer spec, separating unreadable files from invalid content.
pub fn load_spec(path: &Path) -> CliResult<LayerSpec> {
    if !path.exists() {
        return Err(CliError::io(format!(
            "Layer spec not found: {}",
            path.display()
        )));
    }
    parse_layer_spec(path).map_err(|e| CliError::from_anyhow("Failed to load layer spec", &e))
}

/// Loads the document and reads the selected rule list.
pub fn load_rules(
    path: &Path,
    target: &RuleTarget,
) -> CliResult<(KarabinerDocument, Vec<Manipulator>)> {
    if !path.exists() {
        return Err(CliError::io(format!("Document not found: {}", path.display())));
    }
    let document = DocumentService::load(path)
        .map_err(|e| CliError::from_anyhow("Failed to load document", &e))?;
    let rules = document
        .manipulators(target)
        .map_err(|e| CliError::from_anyhow("Failed to read rule list", &e))?;
    Ok((document, rules))
}

/// Writes the rule list back unless `dry_run`; returns whether the file changed.
pub fn store_rules(
    mut document: KarabinerDocument,
    rules: &[Manipulator],
    path: &Path,
    target: &RuleTarget,
    dry_run: bool,
) -> CliResult<bool> {
    document
        .set_manipulators(target, rules)
        .map_err(|e| CliError::from_anyhow("Failed to update rule list", &e))?;
    if dry_run {
        return Ok(false);
    }
    DocumentService::save(&document, path)
        .map_err(|e| CliError::io(format!("Failed to save document: {e:#}")))
}

/// Prints a value as pretty JSON to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io(format!("Failed to serialize JSON: {e}")))?;
    println!("{json}");
    Ok(())
}
