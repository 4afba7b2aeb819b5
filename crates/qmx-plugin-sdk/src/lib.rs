//! QMX Plugin SDK
//!
//! This SDK defines the contract between a plugin library and the host's
//! plugin registry.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use qmx_plugin_sdk::prelude::*;
//!
//! struct Greeter;
//!
//! impl Plugin for Greeter {
//!     fn id(&self) -> &str { "greeter" }
//!     fn version(&self) -> Version { Version::new(1, 0, 0) }
//! }
//!
//! export_plugin!(module: "demo", plugin: Greeter);
//! ```
//!
//! # FFI Exports
//!
//! A plugin library exports three C-linkage symbols, resolved by exact name:
//! - `PluginGetModule() -> *const c_char` - module the plugin joins
//! - `PluginStart(*mut *mut PluginObject)` - constructs the plugin object
//! - `PluginStop()` - destroys the object created by `PluginStart`
//!
//! # Compatibility
//!
//! The symbols use C linkage, but the [`PluginObject`] they pass carries a
//! `Box<dyn Plugin>`. Rust gives trait objects no stable ABI, so a plugin
//! must be compiled with the same `rustc` and the same SDK version as the
//! host that loads it.

pub mod abi;
pub mod error;
#[macro_use]
pub mod macros;
pub mod plugin;

pub use abi::{
    EntryPoints, GetModuleFn, PluginObject, StartFn, StopFn, ENTRY_POINTS, GET_MODULE_SYMBOL,
    START_SYMBOL, STOP_SYMBOL,
};
pub use error::{PluginError, PluginResult};
pub use plugin::{Plugin, PluginMeta};

pub use semver::Version;

/// Prelude module with common imports
pub mod prelude {
    pub use crate::abi::PluginObject;
    pub use crate::error::{PluginError, PluginResult};
    pub use crate::plugin::{Plugin, PluginMeta};
    pub use semver::Version;

    pub use crate::{export_plugin, plugin_entry_points};
}
