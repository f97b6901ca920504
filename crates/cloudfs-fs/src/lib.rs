//! # cloudfs-fs
//!
//! Filesystem capability contract and kernel binding for CloudFS.
//!
//! This crate provides:
//! - [`FileSystem`]: the path-based operation set a service implements, with
//!   read-only defaults for everything it does not override
//! - [`Stat`], [`DirEntry`] and [`StatFs`]: attribute records handed to the
//!   kernel
//! - [`FsError`]: operation errors, each mapped to one errno
//! - [`KernelBinding`]: the seam between the mount orchestrator and the
//!   kernel, plus the mount-table predicate and unmount helpers
//! - FUSE support through `fuser` (with the default `fuse` feature)
//!
//! ## Example
//!
//! ```ignore
//! use cloudfs_fs::{DirEntry, FileSystem, FsError, FsResult, Stat};
//! use std::path::Path;
//! use std::time::SystemTime;
//!
//! struct HelloFs;
//!
//! impl FileSystem for HelloFs {
//!     fn getattr(&self, path: &Path, _fh: Option<u64>) -> FsResult<Stat> {
//!         match path.to_str() {
//!             Some("/") => Ok(Stat::dir(SystemTime::now())),
//!             Some("/hello") => Ok(Stat::file(5, SystemTime::now())),
//!             _ => Err(FsError::NotFound),
//!         }
//!     }
//!
//!     fn readdir(&self, _path: &Path, _fh: u64) -> FsResult<Vec<DirEntry>> {
//!         Ok(vec![DirEntry::file("hello")])
//!     }
//!
//!     fn read(&self, _path: &Path, size: u32, offset: u64, _fh: u64) -> FsResult<Vec<u8>> {
//!         let data = b"hello";
//!         let start = (offset as usize).min(data.len());
//!         let end = (start + size as usize).min(data.len());
//!         Ok(data[start..end].to_vec())
//!     }
//! }
//! ```

mod binding;
mod error;
mod filesystem;
mod stat;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use binding::{
    is_device_boundary, is_mount_point, mount_table_contains, unmount, unmount_hint,
    KernelBinding, MountOptions,
};
pub use error::{FsError, FsResult};
pub use filesystem::FileSystem;
pub use stat::{secs_to_time, time_to_secs, DirEntry, Stat, StatFs, BLOCK_SIZE, DIR_PERM, FILE_PERM};
