//! The capability contract a concrete filesystem implements.

use crate::error::{FsError, FsResult};
use crate::stat::{DirEntry, Stat, StatFs};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Path-based filesystem operations.
///
/// Every method has a default. Mutating operations default to
/// [`FsError::ReadOnly`], so an implementation that overrides nothing but
/// [`getattr`](FileSystem::getattr), [`readdir`](FileSystem::readdir) and
/// [`read`](FileSystem::read) is a complete read-only filesystem.
///
/// Paths are absolute within the mount, `/` being the root. File and
/// directory handles are opaque numbers chosen by the implementation; the
/// adapter passes them back unchanged.
///
/// Callbacks may be dispatched from any thread, so implementations must be
/// `Send + Sync` and guard their own mutable state.
pub trait FileSystem: Send + Sync {
    // =========================================================================
    // Filesystem
    // =========================================================================

    /// Called once when the filesystem is mounted, before any other call.
    fn init(&self) -> FsResult<()> {
        Ok(())
    }

    /// Called once when the filesystem is unmounted.
    fn destroy(&self) {}

    /// Filesystem statistics.
    fn statfs(&self, _path: &Path) -> FsResult<StatFs> {
        Ok(StatFs::default())
    }

    // =========================================================================
    // Permissions
    // =========================================================================

    /// Check access permissions (`access(2)` mask).
    fn access(&self, _path: &Path, _mask: i32) -> FsResult<()> {
        Ok(())
    }

    /// Change permission bits.
    fn chmod(&self, _path: &Path, _mode: u32) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    /// Change ownership.
    fn chown(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    // =========================================================================
    // Directory operations
    // =========================================================================

    /// Attributes of a path. Unknown paths report [`FsError::NotFound`].
    fn getattr(&self, _path: &Path, _fh: Option<u64>) -> FsResult<Stat> {
        Err(FsError::NotFound)
    }

    /// Update access and modification times. `None` leaves a time unchanged.
    fn utimens(
        &self,
        _path: &Path,
        _atime: Option<SystemTime>,
        _mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        Ok(())
    }

    /// Open a directory, returning a handle.
    fn opendir(&self, _path: &Path) -> FsResult<u64> {
        Ok(0)
    }

    /// List a directory. `.` and `..` are added by the adapter.
    fn readdir(&self, _path: &Path, _fh: u64) -> FsResult<Vec<DirEntry>> {
        Ok(Vec::new())
    }

    /// Release a directory handle.
    fn releasedir(&self, _path: &Path, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    /// Synchronize directory contents.
    fn fsyncdir(&self, _path: &Path, _datasync: bool, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    /// Create a directory.
    fn mkdir(&self, _path: &Path, _mode: u32) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    /// Remove an empty directory.
    fn rmdir(&self, _path: &Path) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    /// Move `old` to `new`.
    fn rename(&self, _old: &Path, _new: &Path) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    /// Create a special or regular file node.
    fn mknod(&self, _path: &Path, _mode: u32, _rdev: u32) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Target of a symbolic link.
    fn readlink(&self, _path: &Path) -> FsResult<PathBuf> {
        Err(FsError::NotFound)
    }

    /// Remove a file.
    fn unlink(&self, _path: &Path) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    /// Create a hard link at `link` pointing to `existing` (`ln existing link`).
    fn link(&self, _link: &Path, _existing: &Path) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    /// Create a symbolic link at `link` pointing to `target` (`ln -s target link`).
    fn symlink(&self, _link: &Path, _target: &Path) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    // =========================================================================
    // File operations
    // =========================================================================

    /// Create and open a file, returning a handle.
    fn create(&self, _path: &Path, _mode: u32, _flags: i32) -> FsResult<u64> {
        Err(FsError::ReadOnly)
    }

    /// Open a file, returning a handle.
    fn open(&self, _path: &Path, _flags: i32) -> FsResult<u64> {
        Ok(0)
    }

    /// Read up to `size` bytes at `offset`.
    fn read(&self, _path: &Path, _size: u32, _offset: u64, _fh: u64) -> FsResult<Vec<u8>> {
        Err(FsError::Os(libc::EIO))
    }

    /// Write `data` at `offset`, returning the number of bytes written.
    fn write(&self, _path: &Path, _data: &[u8], _offset: u64, _fh: u64) -> FsResult<usize> {
        Err(FsError::ReadOnly)
    }

    /// Set the file length.
    fn truncate(&self, _path: &Path, _length: u64, _fh: Option<u64>) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    /// Called on each `close(2)` of a file descriptor.
    fn flush(&self, _path: &Path, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    /// Called when the last reference to an open file goes away.
    fn release(&self, _path: &Path, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    /// Synchronize file contents.
    fn fsync(&self, _path: &Path, _datasync: bool, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    // =========================================================================
    // Extended attributes
    // =========================================================================

    /// Set an extended attribute.
    fn setxattr(&self, _path: &Path, _name: &str, _value: &[u8], _flags: i32) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    /// Get an extended attribute.
    fn getxattr(&self, _path: &Path, _name: &str) -> FsResult<Vec<u8>> {
        Err(FsError::NotSupported)
    }

    /// Remove an extended attribute.
    fn removexattr(&self, _path: &Path, _name: &str) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    /// List extended attribute names.
    fn listxattr(&self, _path: &Path) -> FsResult<Vec<String>> {
        Ok(Vec::new())
    }
}
