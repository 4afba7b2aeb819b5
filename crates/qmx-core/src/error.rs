//! Error taxonomy shared by the registries.
//!
//! Each crate keeps its own error enum with precise variants. This module
//! defines the coarse classification callers can branch on without knowing
//! which crate produced the error.

use std::fmt;

/// Coarse classification of a registry failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A group, thread, module or plugin ID was absent where required.
    NotFound,
    /// Duplicate group, thread or module registration.
    AlreadyExists,
    /// Group destruction blocked by live threads.
    NotEmpty,
    /// The same canonical library path is already loaded.
    AlreadyLoaded,
    /// A plugin library lacks one of the required entry points.
    MissingEntryPoint,
    /// A plugin declares a module that was never registered.
    ModuleNotRegistered,
    /// The plugin system was initialized twice.
    AlreadyInitialized,
    /// A cooperative interruption was delivered at a cancellation point.
    Interrupted,
    /// The caller passed an argument the operation cannot act on.
    InvalidArgument,
    /// An underlying OS facility failed.
    Os,
    /// A plugin's own lifecycle hook reported a failure.
    Plugin,
}

impl ErrorKind {
    /// Stable lower-case name, used in structured logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotEmpty => "not_empty",
            ErrorKind::AlreadyLoaded => "already_loaded",
            ErrorKind::MissingEntryPoint => "missing_entry_point",
            ErrorKind::ModuleNotRegistered => "module_not_registered",
            ErrorKind::AlreadyInitialized => "already_initialized",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Os => "os",
            ErrorKind::Plugin => "plugin",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can report their [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}
