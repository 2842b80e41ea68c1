//! LazyKarabiner - modal layers for Karabiner-Elements
//!
//! Compiles a layer spec into Karabiner-Elements rules and splices them into
//! `karabiner.json`, leaving hand-authored rules in place.
//!
//! # Usage
//!
//! ```bash
//! # Regenerate every layer using the configured spec and document
//! lazykarabiner
//!
//! # Preview the rules of one layer
//! lazykarabiner generate --layer-spec layers.toml --layer T
//!
//! # Validate without writing
//! lazykarabiner check --json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lazykarabiner::cli::{
    ApplyArgs, CheckArgs, CliError, CliResult, ConfigArgs, ExitCode, GenerateArgs, RemoveArgs,
};
use lazykarabiner::config::Config;

/// LazyKarabiner - modal layers for Karabiner-Elements
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Regenerate every layer and write the document (default)
    Apply(ApplyArgs),
    /// Print generated rules as JSON
    Generate(GenerateArgs),
    /// Delete generated rules from the document
    Remove(RemoveArgs),
    /// Validate the layer spec and dry-run the splice
    Check(CheckArgs),
    /// Show or edit the configuration file
    Config(ConfigArgs),
}

fn run(cli: Cli) -> CliResult<()> {
    let config_path = Config::resolve_path(cli.config.as_deref())
        .map_err(|e| CliError::from_anyhow("Failed to locate configuration", &e))?;

    if let Some(Command::Config(args)) = &cli.command {
        return args.execute(&config_path);
    }

    let config = Config::load_from(&config_path)
        .map_err(|e| CliError::from_anyhow("Failed to load configuration", &e))?;

    match cli.command.unwrap_or_else(|| Command::Apply(ApplyArgs::default())) {
        Command::Apply(args) => args.execute(&config),
        Command::Generate(args) => args.execute(&config),
        Command::Remove(args) => args.execute(&config),
        Command::Check(args) => args.execute(&config),
        Command::Config(args) => args.execute(&config_path),
    }
}

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries command output only
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(cli) {
        Ok(()) => ExitCode::Success,
        Err(err) => {
            eprintln!("Error: {err}");
            err.kind
        }
    };
    std::process::exit(code.code());
}
