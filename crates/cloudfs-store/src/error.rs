use thiserror::Error;

/// Errors that can occur when working with the metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A key that is not a declared column was supplied.
    #[error("invalid key '{0}': not a declared column")]
    UnknownColumn(String),

    /// A required column was not supplied.
    #[error("missing required column '{0}'")]
    MissingColumn(String),

    /// A positional row does not match the declared column count.
    #[error("column count mismatch: expected {expected}, found {found}")]
    ColumnCount {
        /// Number of declared columns.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
