//! Generate command: print synthesized rules without touching any document.

use crate::cli::common::{print_json, CliError, CliResult, SpecArgs};
use crate::config::Config;
use clap::Args;
use serde_json::{Map, Value};

/// Print the generated rules of each layer as JSON
#[derive(Debug, Clone, Default, Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Only print these layers
    #[arg(long = "layer", value_name = "NAME")]
    pub layers: Vec<String>,
}

impl GenerateArgs {
    /// Execute the generate command
    pub fn execute(&self, config: &Config) -> CliResult<()> {
        let (_, synthesis) = self.spec.load(config)?;
        let preview = synthesis.preview()?;

        if self.layers.is_empty() {
            return print_json(&preview);
        }

        let mut selected = Map::new();
        for name in &self.layers {
            let batches = preview
                .get(name)
                .ok_or_else(|| CliError::validation(format!("Unknown layer '{name}'")))?;
            selected.insert(name.clone(), batches.clone());
        }
        print_json(&Value::Object(selected))
    }
}
