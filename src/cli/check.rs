//! Check command: validate the layer spec and dry-run the splice.

use crate::cli::common::{load_rules, print_json, CliError, CliResult, SourceArgs};
use crate::config::Config;
use crate::services::invariants::{self, InvariantIssue, InvariantReport, IssueKind};
use crate::services::{RuleCategory, Splicer};
use clap::Args;
use serde::Serialize;

/// Validate the layer spec and, if the document exists, dry-run a splice
#[derive(Debug, Clone, Default, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Treat warnings as errors (exit non-zero)
    #[arg(long)]
    pub strict: bool,
}

#[derive(Serialize, Debug)]
struct LayerSummary {
    name: String,
    setters: usize,
    actions: usize,
    guards: usize,
}

#[derive(Serialize, Debug, Default)]
struct DocumentCheck {
    path: String,
    checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize, Debug)]
struct CheckOutput {
    valid: bool,
    variables: usize,
    layers: Vec<LayerSummary>,
    errors: Vec<InvariantIssue>,
    warnings: Vec<InvariantIssue>,
    document: DocumentCheck,
}

impl CheckArgs {
    /// Execute the check command
    pub fn execute(&self, config: &Config) -> CliResult<()> {
        let (spec, synthesis) = self.source.spec.load(config)?;

        let mut report: InvariantReport = invariants::check_exclusivity(&synthesis);
        report.merge(invariants::check_coverage(&spec, &synthesis));
        let spec_valid = report.is_valid();

        let path = self.source.document_path(config)?;
        let mut document = DocumentCheck {
            path: path.display().to_string(),
            ..DocumentCheck::default()
        };
        let mut splice_failure = None;
        if path.exists() {
            let (_, rules) = load_rules(&path, &self.source.target(config))?;
            let splicer = Splicer::new(&spec, &synthesis, config.splice.into());
            document.checked = true;
            match splicer.splice(&rules) {
                Ok((_, splice_report)) => {
                    document.summary = Some(splice_report.summary());
                    report.warnings.extend(
                        splice_report
                            .invariants
                            .warnings
                            .into_iter()
                            .filter(|w| w.kind != IssueKind::Exclusivity),
                    );
                }
                Err(err) => {
                    document.error = Some(err.to_string());
                    splice_failure = Some(CliError::from(err));
                }
            }
        }

        let output = CheckOutput {
            valid: spec_valid && splice_failure.is_none(),
            variables: synthesis.registry.cells().len(),
            layers: synthesis
                .layers
                .iter()
                .map(|batches| LayerSummary {
                    name: batches.layer.clone(),
                    setters: batches.count(RuleCategory::Setter),
                    actions: batches.count(RuleCategory::Action),
                    guards: batches.count(RuleCategory::Guard),
                })
                .collect(),
            errors: report.errors,
            warnings: report.warnings,
            document,
        };

        if self.json {
            print_json(&output)?;
        } else {
            print_human(&output);
        }

        if !spec_valid {
            return Err(CliError::validation(format!(
                "Check failed with {} errors",
                output.errors.len()
            )));
        }
        if let Some(failure) = splice_failure {
            return Err(failure);
        }
        if self.strict && !output.warnings.is_empty() {
            return Err(CliError::validation("Warnings found in strict mode"));
        }
        Ok(())
    }
}

fn print_human(output: &CheckOutput) {
    if output.valid {
        println!("✓ Check passed");
    } else {
        println!("✗ Check failed");
    }

    println!("\nLayers:");
    for layer in &output.layers {
        println!(
            "  {:<12} {} setters, {} actions, {} guards",
            layer.name, layer.setters, layer.actions, layer.guards
        );
    }
    println!("  Variables: {}", output.variables);

    println!("\nDocument: {}", output.document.path);
    if !output.document.checked {
        println!("  not found, splice skipped");
    } else if let Some(summary) = &output.document.summary {
        println!("  dry run: {summary}");
    } else if let Some(error) = &output.document.error {
        println!("  ✗ {error}");
    }

    if !output.errors.is_empty() || !output.warnings.is_empty() {
        println!("\nIssues:");
        for issue in &output.errors {
            println!("  ✗ {issue}");
        }
        for issue in &output.warnings {
            println!("  ⚠ {issue}");
        }
    }
}
