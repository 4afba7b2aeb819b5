//! Dynamic-library plugin registry.
//!
//! Plugins are shared libraries (.so/.dylib/.dll) exporting the entry points
//! defined by `qmx-plugin-sdk`. Each plugin declares membership in a module;
//! modules must be registered before their plugins can load.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   PluginRegistry                     │
//! │  - Module registration                               │
//! │  - Load / auto-load / unload                         │
//! │  - Install, Initialize, Shutdown, Uninstall dispatch │
//! └─────────────────────────────────────────────────────┘
//!                          │
//!                  ┌───────┴────────┐
//!                  ▼                ▼
//!          ┌──────────────┐  ┌──────────────┐
//!          │ LibraryLoader│  │  discovery   │
//!          │ (libloading) │  │ (read_dir)   │
//!          └──────────────┘  └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use qmx_plugins::PluginRegistry;
//!
//! let registry = PluginRegistry::new();
//! registry.register_module("codecs")?;
//! registry.auto_load("plugins")?;
//! registry.initialize()?;
//!
//! for (id, version) in registry.plugin_list("codecs")? {
//!     println!("{} {}", id, version);
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod library;
mod record;
pub mod registry;

pub use discovery::{is_library_file, library_files, platform_extension};
pub use error::{LibraryError, RegistryError, Result};
pub use library::{DynamicLibrary, LibraryHandle, LibraryLoader, NativeLoader};
pub use record::{LifecycleHook, PluginState};
pub use registry::PluginRegistry;

pub use qmx_plugin_sdk::{Plugin, PluginMeta};
