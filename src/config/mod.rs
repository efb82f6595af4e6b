//! Configuration module for rsync-transfer
//!
//! Provides the CLI arguments, the TOML configuration file and the typed
//! transfer settings.

mod settings;

pub use settings::*;
