//! FUSE binding for the capability contract.
//!
//! This module provides:
//!
//! - [`FuseOperations`]: the `fuser::Filesystem` implementation that routes
//!   kernel callbacks to a [`FileSystem`](crate::FileSystem), mapping inode
//!   numbers to paths
//! - [`FuseBinding`]: the [`KernelBinding`](crate::KernelBinding) used for
//!   real mounts
//!
//! # Example
//!
//! ```ignore
//! use cloudfs_fs::fuse::FuseBinding;
//! use cloudfs_fs::{KernelBinding, MountOptions};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let fs = Arc::new(MyFs::new());
//! let options = MountOptions::new("myfs").read_only(true);
//! FuseBinding.mount(fs, Path::new("/mnt/myfs"), &options)?;
//! ```

mod adapter;
mod inode;
mod session;

pub use adapter::{with_dot_entries, FuseOperations};
pub use inode::{InodeTable, ROOT_INO};
pub use session::{fuse_mount_options, spawn_mount, FuseBinding};
