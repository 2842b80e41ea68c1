//! Remove command: delete generated rules from the document.

use crate::cli::common::{load_rules, print_json, store_rules, CliResult, SourceArgs};
use crate::config::Config;
use crate::services::Splicer;
use clap::Args;
use serde::Serialize;

/// Delete generated rules (all layers unless names are given)
#[derive(Debug, Clone, Default, Args)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Layers whose rules are removed
    #[arg(value_name = "LAYER")]
    pub layers: Vec<String>,

    /// Do not write the document
    #[arg(long)]
    pub dry_run: bool,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Debug)]
struct RemoveOutput {
    document: String,
    written: bool,
    removed: usize,
    setters: usize,
    actions: usize,
    guards: usize,
}

impl RemoveArgs {
    /// Execute the remove command
    pub fn execute(&self, config: &Config) -> CliResult<()> {
        let (spec, synthesis) = self.source.spec.load(config)?;
        let path = self.source.document_path(config)?;
        let target = self.source.target(config);
        let (document, rules) = load_rules(&path, &target)?;

        let splicer = Splicer::new(&spec, &synthesis, config.splice.into());
        let (remaining, report) = splicer.remove(&rules, &self.layers)?;

        let written = store_rules(document, &remaining, &path, &target, self.dry_run)?;

        if self.json {
            return print_json(&RemoveOutput {
                document: path.display().to_string(),
                written,
                removed: report.removed.total(),
                setters: report.removed.setters,
                actions: report.removed.actions,
                guards: report.removed.guards,
            });
        }

        println!(
            "✓ Removed {} generated rules ({})",
            report.removed.total(),
            report.removed
        );
        if written {
            println!("  Updated {}", path.display());
        }
        Ok(())
    }
}
