//! Plugin registry and dynamic library errors.

use std::path::PathBuf;

use qmx_core::{Classify, ErrorKind};
use qmx_plugin_sdk::PluginError;

use crate::record::LifecycleHook;

/// Result type for plugin registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Dynamic library errors.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// The file does not carry the platform's library extension.
    #[error("Invalid library extension for {path}, expected .{expected}")]
    InvalidExtension { path: PathBuf, expected: &'static str },

    /// The OS loader refused the file.
    #[error("Failed to load library {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The OS loader failed to release the library.
    #[error("Failed to unload library {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// No library is loaded.
    #[error("No library loaded")]
    NotLoaded,

    /// The loaded image does not export the symbol.
    #[error("Symbol {symbol} not found in {path}")]
    SymbolNotFound { symbol: String, path: PathBuf },

    /// The path could not be resolved on disk.
    #[error("Cannot resolve library path {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Classify for LibraryError {
    fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::InvalidExtension { .. } => ErrorKind::InvalidArgument,
            LibraryError::NotLoaded | LibraryError::SymbolNotFound { .. } => ErrorKind::NotFound,
            LibraryError::Open { .. } | LibraryError::Close { .. } | LibraryError::Path { .. } => {
                ErrorKind::Os
            }
        }
    }
}

/// Plugin registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No module with this name.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// A module with this name is already registered.
    #[error("Module already registered: {0}")]
    ModuleExists(String),

    /// No plugin with this ID in the module.
    #[error("Plugin not found: {module}/{plugin}")]
    PluginNotFound { module: String, plugin: String },

    /// A plugin from the same canonical path is already loaded.
    #[error("Plugin library already loaded: {0}")]
    AlreadyLoaded(PathBuf),

    /// The library lacks a required entry point.
    #[error("Missing entry point {symbol} in {path}")]
    MissingEntryPoint { symbol: &'static str, path: PathBuf },

    /// The plugin declares a module that was never registered.
    #[error("Plugin {path} declares unregistered module {module}")]
    ModuleNotRegistered { module: String, path: PathBuf },

    /// The plugin library did not report a module name.
    #[error("Plugin {0} reported no module name")]
    MissingModuleName(PathBuf),

    /// `PluginStart` produced no plugin object.
    #[error("Plugin {0} did not produce a plugin object")]
    StartFailed(PathBuf),

    /// `initialize` was already called.
    #[error("Plugin system already initialized")]
    AlreadyInitialized,

    /// Auto-load target is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Auto-load directory contains no plugin libraries.
    #[error("No plugin libraries found in {0}")]
    NoLibraries(PathBuf),

    /// Directory enumeration failed.
    #[error("Failed to read directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A plugin lifecycle hook failed.
    #[error("Plugin {plugin} failed to {hook}: {source}")]
    Hook {
        plugin: String,
        hook: LifecycleHook,
        #[source]
        source: PluginError,
    },

    /// Dynamic library failure.
    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl Classify for RegistryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ModuleNotFound(_) | RegistryError::PluginNotFound { .. } => {
                ErrorKind::NotFound
            }
            RegistryError::ModuleExists(_) => ErrorKind::AlreadyExists,
            RegistryError::AlreadyLoaded(_) => ErrorKind::AlreadyLoaded,
            RegistryError::MissingEntryPoint { .. } => ErrorKind::MissingEntryPoint,
            RegistryError::ModuleNotRegistered { .. } => ErrorKind::ModuleNotRegistered,
            RegistryError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            RegistryError::NotADirectory(_)
            | RegistryError::NoLibraries(_)
            | RegistryError::MissingModuleName(_) => ErrorKind::InvalidArgument,
            RegistryError::Discovery { .. } => ErrorKind::Os,
            RegistryError::StartFailed(_) | RegistryError::Hook { .. } => ErrorKind::Plugin,
            RegistryError::Library(e) => e.kind(),
        }
    }
}
