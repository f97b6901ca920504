//! The extension points a concrete service provides.

use crate::error::HookError;
use crate::logging::SessionLog;
use crate::schema::ConfigSchema;
use crate::worker::Worker;
use cloudfs_fs::FileSystem;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// A storage backend that profiles can be created for.
///
/// The core owns the profile directory, the config file and the mount
/// lifecycle; the service supplies the config shape and the three hooks.
pub trait Service: Send + Sync {
    /// Identifier used in paths and on the command line.
    fn name(&self) -> &str;

    /// Human-readable name.
    fn label(&self) -> &str;

    /// Version string written to each new profile's `VERSION` file.
    fn version(&self) -> &str;

    /// Configuration of a freshly created profile.
    fn default_config(&self) -> Value;

    /// Shape every persisted configuration must have.
    fn schema(&self) -> ConfigSchema;

    /// Called before the profile directory is created, with the default
    /// configuration. Returns the configuration to persist.
    ///
    /// This is where interactive authentication or credential storage
    /// belongs.
    fn create(&self, ctx: &ProfileContext, config: Value) -> Result<Value, HookError>;

    /// Called before the profile directory is deleted, to release external
    /// state such as stored credentials.
    fn remove(&self, ctx: &ProfileContext) -> Result<(), HookError>;

    /// Prepare a session from the loaded configuration.
    fn start(&self, ctx: &ProfileContext, config: &Value) -> Result<StartPlan, HookError>;
}

/// Where a profile lives and how it is being run.
#[derive(Debug, Clone)]
pub struct ProfileContext {
    pub service_name: String,
    pub profile_name: String,
    pub profile_path: PathBuf,
    pub cache_path: PathBuf,
    pub read_only: bool,
    pub log: SessionLog,
}

/// Everything a service hands back from [`Service::start`].
pub struct StartPlan {
    /// The capability object served for the session.
    pub filesystem: Arc<dyn FileSystem>,
    /// Directory to mount at.
    pub mount_point: PathBuf,
    /// Workers to run around the session, in start order.
    pub workers: Vec<Worker>,
}

impl StartPlan {
    pub fn new(filesystem: Arc<dyn FileSystem>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            filesystem,
            mount_point: mount_point.into(),
            workers: Vec::new(),
        }
    }

    /// Append a worker.
    pub fn worker(mut self, worker: Worker) -> Self {
        self.workers.push(worker);
        self
    }
}

impl std::fmt::Debug for StartPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartPlan")
            .field("mount_point", &self.mount_point)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
