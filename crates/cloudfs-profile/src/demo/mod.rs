//! Bundled `demo` service.
//!
//! Serves a small writable tree kept in the profile's cache database. It
//! needs no account, which makes it the reference for writing real
//! services.

mod fs;

pub use fs::{DemoFs, ENTRIES_TABLE};

use crate::error::HookError;
use crate::schema::{ConfigSchema, ValueKind};
use crate::service::{ProfileContext, Service, StartPlan};
use crate::worker::Worker;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Database file inside the profile cache.
pub const METADATA_DB: &str = "metadata.db";

/// Seconds between cache statistics reports when not configured.
pub const DEFAULT_REFRESH_SECS: u64 = 60;

/// The `demo` service. Mounts each profile at `<mount root>/<profile>`.
#[derive(Debug, Clone)]
pub struct DemoService {
    mount_root: PathBuf,
}

impl DemoService {
    pub fn new(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }
}

impl Service for DemoService {
    fn name(&self) -> &str {
        "demo"
    }

    fn label(&self) -> &str {
        "Demo Service"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn default_config(&self) -> Value {
        json!({ "limit": 10 })
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("limit", ValueKind::Integer)
            .optional("refresh_interval_secs", ValueKind::Integer)
    }

    fn create(&self, ctx: &ProfileContext, config: Value) -> Result<Value, HookError> {
        ctx.log.debug("No account needed");
        Ok(config)
    }

    fn remove(&self, ctx: &ProfileContext) -> Result<(), HookError> {
        ctx.log.debug("No credentials to release");
        Ok(())
    }

    fn start(&self, ctx: &ProfileContext, config: &Value) -> Result<StartPlan, HookError> {
        let limit = config
            .get("limit")
            .and_then(Value::as_u64)
            .ok_or_else(|| HookError::msg("'limit' must be a non-negative integer"))?;
        let refresh = config
            .get("refresh_interval_secs")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_REFRESH_SECS)
            .max(1);

        std::fs::create_dir_all(&ctx.cache_path)?;
        let fs = Arc::new(
            DemoFs::open(ctx.cache_path.join(METADATA_DB), limit)?.read_only(ctx.read_only),
        );

        let prepare = {
            let fs = Arc::clone(&fs);
            Worker::joined("prepare", move |wctx| {
                fs.prepare()?;
                wctx.log().debug(format!("Cache ready, {} entries", fs.entry_count()?));
                Ok(())
            })
        };
        let refresher = {
            let fs = Arc::clone(&fs);
            Worker::detached("refresher", move |wctx| {
                while !wctx.shutdown().wait_timeout(Duration::from_secs(refresh)) {
                    match (fs.entry_count(), fs.total_size()) {
                        (Ok(count), Ok(size)) => wctx
                            .log()
                            .debug(format!("Cache holds {} entries, {} bytes", count, size)),
                        (Err(e), _) | (_, Err(e)) => {
                            wctx.log().warn(format!("Cache statistics unavailable: {}", e))
                        }
                    }
                }
                Ok(())
            })
        };

        Ok(StartPlan::new(fs, self.mount_root.join(&ctx.profile_name))
            .worker(prepare)
            .worker(refresher))
    }
}
