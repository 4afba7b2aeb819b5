//! Thread registry errors.

use qmx_core::{Classify, ErrorKind};

/// Result type for thread registry operations.
pub type Result<T> = std::result::Result<T, ThreadError>;

/// Thread registry error types.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    /// No group with this name.
    #[error("Thread group not found: {0}")]
    GroupNotFound(String),

    /// A group with this name already exists.
    #[error("Thread group already exists: {0}")]
    GroupExists(String),

    /// The group still owns threads and forced destruction was not requested.
    #[error("Thread group {group} still has {threads} thread(s)")]
    GroupNotEmpty { group: String, threads: usize },

    /// No thread with this name in the group.
    #[error("Thread not found: {group}/{thread}")]
    ThreadNotFound { group: String, thread: String },

    /// A thread with this name already exists in the group.
    #[error("Thread already exists: {group}/{thread}")]
    ThreadExists { group: String, thread: String },

    /// A thread tried to join itself.
    #[error("Thread {group}/{thread} cannot join itself")]
    JoinSelf { group: String, thread: String },

    /// The OS refused to create the thread.
    #[error("Failed to spawn thread {group}/{thread}: {source}")]
    Spawn {
        group: String,
        thread: String,
        #[source]
        source: std::io::Error,
    },

    /// An interruption request was delivered at a cancellation point.
    #[error("Thread interrupted")]
    Interrupted,
}

impl ThreadError {
    pub(crate) fn thread_not_found(group: &str, thread: &str) -> Self {
        Self::ThreadNotFound {
            group: group.to_string(),
            thread: thread.to_string(),
        }
    }

    /// Whether this error is the cooperative interruption signal.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ThreadError::Interrupted)
    }
}

impl Classify for ThreadError {
    fn kind(&self) -> ErrorKind {
        match self {
            ThreadError::GroupNotFound(_) | ThreadError::ThreadNotFound { .. } => {
                ErrorKind::NotFound
            }
            ThreadError::GroupExists(_) | ThreadError::ThreadExists { .. } => {
                ErrorKind::AlreadyExists
            }
            ThreadError::GroupNotEmpty { .. } => ErrorKind::NotEmpty,
            ThreadError::JoinSelf { .. } => ErrorKind::InvalidArgument,
            ThreadError::Spawn { .. } => ErrorKind::Os,
            ThreadError::Interrupted => ErrorKind::Interrupted,
        }
    }
}
