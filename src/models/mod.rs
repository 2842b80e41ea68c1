//! Data models for rule documents, layer specifications and layer variables.
//!
//! This module contains all the core data structures used throughout the application.
//! Models are independent of the splicing logic and of the CLI.

pub mod document;
pub mod layer_spec;
pub mod manipulator;
pub mod variables;

// Re-export all model types
pub use document::{KarabinerDocument, RuleTarget, Selector, TargetNotFound};
pub use layer_spec::{
    ActionKey, AnchorPattern, AnchorSpec, KeystrokeDef, LayerDef, LayerSpec, ModeDef, Notify,
    OperationDef, OperationEffect, Placement,
};
pub use manipulator::{Condition, EffectShape, FromEvent, Manipulator, ToEvent};
pub use variables::{CellOwner, VariableCell, VariableRegistry};
