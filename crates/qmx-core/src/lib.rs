//! Core types shared by the QMX support crates.
//!
//! This crate carries the pieces every other crate leans on: the error
//! taxonomy the registries report through, the configuration model, and the
//! logging bootstrap used by binaries.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigError, LoggingConfig, PluginConfig, Settings, ThreadConfig};
pub use error::{Classify, ErrorKind};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{env_vars, Settings};
    pub use crate::error::{Classify, ErrorKind};
}
