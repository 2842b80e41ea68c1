//! Service layer for business logic.
//!
//! This module contains the synthesis, classification and splicing services
//! and the document I/O that coordinates them.

pub mod anchors;
pub mod detector;
pub mod documents;
pub mod error;
pub mod invariants;
pub mod marker;
pub mod splicer;
pub mod synthesizer;

// Re-export commonly used types and functions
pub use documents::DocumentService;
pub use error::{SpliceError, SpliceErrorKind, SpliceResult};
pub use marker::{GenerationMarker, RuleCategory};
pub use splicer::{SpliceOptions, SpliceReport, Splicer};
pub use synthesizer::{RuleSynthesizer, Synthesis};
