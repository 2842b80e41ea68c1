//! CLI command handlers for LazyKarabiner.
//!
//! Each subcommand is an `Args` struct with an `execute` method returning a
//! [`CliResult`]; `main.rs` maps failures to process exit codes.

pub mod apply;
pub mod check;
pub mod common;
pub mod config;
pub mod generate;
pub mod remove;

// Re-export types used by main.rs and tests
pub use apply::ApplyArgs;
pub use check::CheckArgs;
pub use common::{CliError, CliResult, ExitCode};
pub use config::ConfigArgs;
pub use generate::GenerateArgs;
pub use remove::RemoveArgs;
