//! Application-wide constants.
//!
//! This module defines constants used throughout the application,
//! including the application name and the generation marker format.

/// The display name of the application (human-readable, with proper capitalization).
pub const APP_NAME: &str = "LazyKarabiner";

/// The binary name of the application (used in command examples).
pub const APP_BINARY_NAME: &str = "lazykarabiner";

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "lazykarabiner";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "LAZYKARABINER_CONFIG";

/// Prefix of the description marker carried by every generated rule.
pub const MARKER_PREFIX: &str = "lazykarabiner";

/// Current generation format version written into markers.
pub const GENERATION_VERSION: u32 = 1;

/// Suffix appended to a key to derive its default variable name.
pub const VARIABLE_SUFFIX: &str = "_is_held";

/// Scratch variable written by guard rules unless the layer spec names another.
pub const DEFAULT_NOOP_VARIABLE: &str = "guard_noop";
