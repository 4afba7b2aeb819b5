//! Plugin error types.

/// Errors a plugin reports from its lifecycle hooks.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Installation failed
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Shutdown failed
    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}

/// Plugin result type
pub type PluginResult<T> = Result<T, PluginError>;
