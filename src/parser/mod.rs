//! Parsing of layer specification files.
//!
//! This module reads the declarative layer spec from TOML, JSON/JSON5 or YAML.

pub mod layer_spec;

// Re-export commonly used functions
pub use layer_spec::{parse_layer_spec, parse_layer_spec_str, SpecFormat};
