//! Configuration management CLI commands.

use crate::cli::common::{print_json, CliError, CliResult};
use crate::config::Config;
use crate::constants::{APP_BINARY_NAME, APP_NAME};
use crate::models::Selector;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration management commands
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Display current configuration
    Show(ConfigShowArgs),
    /// Write a default configuration file
    Init(ConfigInitArgs),
    /// Set configuration values
    Set(ConfigSetArgs),
    /// Print the configuration file location
    Path,
}

/// Display current configuration
#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Write a default configuration file
#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

/// Set configuration values
#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    /// Rule document path
    #[arg(long, value_name = "FILE")]
    document: Option<PathBuf>,

    /// Layer spec path
    #[arg(long, value_name = "FILE")]
    layer_spec: Option<PathBuf>,

    /// Profile index or name
    #[arg(long, value_name = "PROFILE")]
    profile: Option<Selector>,

    /// Rule index or description
    #[arg(long, value_name = "RULE")]
    rule: Option<Selector>,

    /// Adopt unmarked rules that match a generated signature
    #[arg(long, value_name = "BOOL")]
    detect_unmarked: Option<bool>,

    /// Remove marked rules of layers no longer in the layer spec
    #[arg(long, value_name = "BOOL")]
    prune_orphans: Option<bool>,

    /// Abort on ordering violations involving generated rules
    #[arg(long, value_name = "BOOL")]
    strict_ordering: Option<bool>,

    /// Add mode guards to hand-authored rules in a layer's key space
    #[arg(long, value_name = "BOOL")]
    patch_foreign: Option<bool>,
}

impl ConfigArgs {
    /// Execute config subcommand against the config file at `path`
    pub fn execute(&self, path: &Path) -> CliResult<()> {
        match &self.command {
            ConfigCommand::Show(args) => args.execute(path),
            ConfigCommand::Init(args) => args.execute(path),
            ConfigCommand::Set(args) => args.execute(path),
            ConfigCommand::Path => {
                println!("{}", path.display());
                Ok(())
            }
        }
    }
}

fn load(path: &Path) -> CliResult<Config> {
    Config::load_from(path)
        .map_err(|e| CliError::from_anyhow("Failed to load configuration", &e))
}

impl ConfigShowArgs {
    /// Execute show command
    pub fn execute(&self, path: &Path) -> CliResult<()> {
        let config = load(path)?;

        if self.json {
            print_json(&config)?;
        } else {
            output_human_readable(&config, path);
        }

        Ok(())
    }
}

impl ConfigInitArgs {
    /// Execute init command
    pub fn execute(&self, path: &Path) -> CliResult<()> {
        if path.exists() && !self.force {
            return Err(CliError::validation(format!(
                "Configuration already exists at {} (use --force to overwrite)",
                path.display()
            )));
        }

        Config::new()
            .save_to(path)
            .map_err(|e| CliError::io(format!("Failed to save configuration: {e:#}")))?;

        println!("✓ Created {}", path.display());
        Ok(())
    }
}

impl ConfigSetArgs {
    /// Execute set command
    pub fn execute(&self, path: &Path) -> CliResult<()> {
        let toggles = [
            self.detect_unmarked,
            self.prune_orphans,
            self.strict_ordering,
            self.patch_foreign,
        ];
        if self.document.is_none()
            && self.layer_spec.is_none()
            && self.profile.is_none()
            && self.rule.is_none()
            && toggles.iter().all(Option::is_none)
        {
            return Err(CliError::validation(
                "At least one configuration option must be specified",
            ));
        }

        let mut config = load(path)?;

        if let Some(document) = &self.document {
            config.paths.document = Some(document.clone());
        }
        if let Some(spec) = &self.layer_spec {
            config.paths.layer_spec = Some(spec.clone());
        }
        if let Some(profile) = &self.profile {
            config.target.profile = profile.clone();
        }
        if let Some(rule) = &self.rule {
            config.target.rule = rule.clone();
        }
        if let Some(value) = self.detect_unmarked {
            config.splice.detect_unmarked = value;
        }
        if let Some(value) = self.prune_orphans {
            config.splice.prune_orphans = value;
        }
        if let Some(value) = self.strict_ordering {
            config.splice.strict_ordering = value;
        }
        if let Some(value) = self.patch_foreign {
            config.splice.patch_foreign = value;
        }

        config
            .validate()
            .map_err(|e| CliError::validation(format!("{e:#}")))?;
        config
            .save_to(path)
            .map_err(|e| CliError::io(format!("Failed to save configuration: {e:#}")))?;

        println!("Configuration updated successfully.");
        Ok(())
    }
}

fn display_path(path: Option<&PathBuf>) -> String {
    path.map_or_else(|| "(not set)".to_string(), |p| p.display().to_string())
}

/// Output configuration in human-readable format
fn output_human_readable(config: &Config, path: &Path) {
    println!("{APP_NAME} configuration ({})", path.display());
    println!();
    println!("Paths:");
    println!(
        "  Document:   {}",
        config.paths.document_path().map_or_else(
            |_| display_path(config.paths.document.as_ref()),
            |p| p.display().to_string()
        )
    );
    println!(
        "  Layer spec: {}",
        display_path(config.paths.layer_spec.as_ref())
    );
    println!();
    println!("Target:");
    println!("  Profile: {}", config.target.profile);
    println!("  Rule:    {}", config.target.rule);
    println!();
    println!("Splice:");
    println!("  Detect unmarked: {}", config.splice.detect_unmarked);
    println!("  Prune orphans:   {}", config.splice.prune_orphans);
    println!("  Strict ordering: {}", config.splice.strict_ordering);
    println!("  Patch foreign:   {}", config.splice.patch_foreign);

    if !config.is_configured() {
        println!();
        println!("No layer spec set. Run `{APP_BINARY_NAME} config set --layer-spec FILE`.");
    }
}
