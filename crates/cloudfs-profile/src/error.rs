use thiserror::Error;

/// Errors raised by the profile lifecycle.
///
/// Each variant names the operation that failed. None of them are retried;
/// the message is meant for the operator.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile identity is invalid.
    #[error("{0}")]
    Initialization(String),

    /// The profile could not be created.
    #[error("{0}")]
    Creation(String),

    /// The service cleanup hook failed. The profile directory is removed
    /// regardless.
    #[error("{0}")]
    Removal(String),

    /// The profile could not be started or its session ended abnormally.
    #[error("{0}")]
    Starting(String),
}

/// Failure reported by a service hook.
///
/// The profile wraps it into the [`ProfileError`] variant of the operation
/// in progress.
#[derive(Debug, Error)]
pub enum HookError {
    /// Free-form failure message.
    #[error("{0}")]
    Message(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data store error.
    #[error("store error: {0}")]
    Store(#[from] cloudfs_store::StoreError),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HookError {
    /// A failure described by `message`.
    pub fn msg(message: impl Into<String>) -> Self {
        HookError::Message(message.into())
    }
}

/// Result type for profile operations.
pub type Result<T> = std::result::Result<T, ProfileError>;
