//! # cloudfs-profile
//!
//! Profile lifecycle and mount orchestration for CloudFS.
//!
//! A profile is a named instance of a [`Service`]: a directory under the
//! application root holding `config.json`, a `VERSION` marker and a
//! `cache/` directory. Starting a profile validates its configuration,
//! asks the service for a filesystem, a mount point and a list of
//! workers, checks the mount point, runs the worker barrier and finally
//! mounts the filesystem on the calling thread.
//!
//! ## Example
//!
//! ```no_run
//! use cloudfs_profile::ServiceRegistry;
//! use std::path::Path;
//!
//! let registry = ServiceRegistry::builtin("/home/alice/CloudFS");
//! let profile = registry.profile(Path::new("/home/alice/.cloudfs"), "demo", "alice")?;
//! if !profile.exists() {
//!     profile.create()?;
//! }
//! profile.start(false, true)?;
//! # Ok::<(), cloudfs_profile::ProfileError>(())
//! ```

pub mod demo;
mod error;
mod logging;
pub mod mount;
mod profile;
mod registry;
mod schema;
mod service;
pub mod worker;

pub use error::{HookError, ProfileError, Result};
pub use logging::SessionLog;
pub use profile::{
    read_version, validate_name, Profile, CACHE_DIR, CONFIG_FILE, RESERVED_NAME, VERSION_FILE,
};
pub use registry::{ProfileEntry, ServiceRegistry};
pub use schema::{ConfigSchema, SchemaError, ValueKind};
pub use service::{ProfileContext, Service, StartPlan};
pub use worker::{ShutdownSignal, Worker, WorkerContext, WorkerResult};
