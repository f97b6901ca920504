use thiserror::Error;

/// Errors returned by filesystem operations.
///
/// Every variant corresponds to exactly one errno value, see
/// [`FsError::errno`].
#[derive(Debug, Error)]
pub enum FsError {
    /// Path does not exist.
    #[error("no such file or directory")]
    NotFound,

    /// Operation not permitted on a read-only filesystem.
    #[error("read-only filesystem")]
    ReadOnly,

    /// Operation not supported by this filesystem.
    #[error("operation not supported")]
    NotSupported,

    /// Expected a directory.
    #[error("not a directory")]
    NotADirectory,

    /// Expected something other than a directory.
    #[error("is a directory")]
    IsADirectory,

    /// Path already exists.
    #[error("file exists")]
    AlreadyExists,

    /// Directory is not empty.
    #[error("directory not empty")]
    NotEmpty,

    /// Caller lacks permission.
    #[error("permission denied")]
    PermissionDenied,

    /// No space (or entry quota) left.
    #[error("no space left on device")]
    NoSpace,

    /// Extended attribute does not exist; what `getxattr` and
    /// `removexattr` return for an unknown name.
    #[error("no such attribute")]
    NoAttribute,

    /// Backend I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raw errno value.
    #[error("os error {0}")]
    Os(i32),
}

impl FsError {
    /// The errno value reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::ReadOnly => libc::EROFS,
            FsError::NotSupported => libc::ENOTSUP,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::PermissionDenied => libc::EACCES,
            FsError::NoSpace => libc::ENOSPC,
            FsError::NoAttribute => libc::ENODATA,
            FsError::Io(_) => libc::EIO,
            FsError::Os(code) => *code,
        }
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;
