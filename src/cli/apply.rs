//! Apply command: splice the synthesized layers into the rule document.

use crate::cli::common::{load_rules, print_json, store_rules, CliResult, SourceArgs};
use crate::config::Config;
use crate::services::{SpliceReport, Splicer};
use clap::Args;
use serde::Serialize;

/// Regenerate every layer and write the document
#[derive(Debug, Clone, Default, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Run the full splice but do not write the document
    #[arg(long)]
    pub dry_run: bool,

    /// Output the splice report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Debug)]
struct ApplyOutput<'a> {
    document: String,
    written: bool,
    dry_run: bool,
    report: &'a SpliceReport,
}

impl ApplyArgs {
    /// Execute the apply command
    pub fn execute(&self, config: &Config) -> CliResult<()> {
        let (spec, synthesis) = self.source.spec.load(config)?;
        let path = self.source.document_path(config)?;
        let target = self.source.target(config);
        let (document, rules) = load_rules(&path, &target)?;

        let splicer = Splicer::new(&spec, &synthesis, config.splice.into());
        let (spliced, report) = splicer.splice(&rules)?;

        let written = store_rules(document, &spliced, &path, &target, self.dry_run)?;

        if self.json {
            return print_json(&ApplyOutput {
                document: path.display().to_string(),
                written,
                dry_run: self.dry_run,
                report: &report,
            });
        }

        if self.dry_run {
            println!("✓ Dry run: {} would be updated", path.display());
        } else if written {
            println!("✓ Updated {}", path.display());
        } else {
            println!("✓ {} is up to date", path.display());
        }
        println!("  {}", report.summary());
        for warning in &report.invariants.warnings {
            println!("  ⚠ {warning}");
        }

        Ok(())
    }
}
