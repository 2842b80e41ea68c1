//! LazyKarabiner Library
//!
//! This library provides core functionality for the LazyKarabiner application:
//! parsing layer specifications, synthesizing Karabiner-Elements rules for
//! modal layers, and splicing them into `karabiner.json` without disturbing
//! hand-authored rules.

// Module declarations
pub mod cli;
pub mod config;
pub mod constants;
pub mod models;
pub mod parser;
pub mod services;
