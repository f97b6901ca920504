//! Profile lifecycle: create, load, start, remove.

use crate::error::{ProfileError, Result};
use crate::logging::SessionLog;
use crate::mount::{check_mount_point, run_session};
use crate::service::{ProfileContext, Service};
use cloudfs_fs::{KernelBinding, MountOptions};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Name of the persisted configuration file.
pub const CONFIG_FILE: &str = "config.json";

/// Name of the version marker file.
pub const VERSION_FILE: &str = "VERSION";

/// Name of the cache subdirectory.
pub const CACHE_DIR: &str = "cache";

/// Reserved placeholder that can never be a profile name.
pub const RESERVED_NAME: &str = "None";

/// A named, persisted instance of a service.
///
/// Lives at `<app-root>/<service>/<profile>/` with `config.json`, `VERSION`
/// and a `cache/` directory.
pub struct Profile {
    service: Arc<dyn Service>,
    profile_name: String,
    profile_path: PathBuf,
    cache_path: PathBuf,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("service", &self.service.name())
            .field("profile_name", &self.profile_name)
            .field("profile_path", &self.profile_path)
            .finish()
    }
}

/// Check that `name` can be used as a profile name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.contains('/') {
        return Err(ProfileError::Initialization(
            "'/' in profile name is not allowed!".to_string(),
        ));
    }
    if name == RESERVED_NAME {
        return Err(ProfileError::Initialization(format!(
            "Profile name can not be '{}'!",
            RESERVED_NAME
        )));
    }
    if name.is_empty() || name == "." || name == ".." {
        return Err(ProfileError::Initialization(format!(
            "Profile name '{}' is not allowed!",
            name
        )));
    }
    Ok(())
}

impl Profile {
    /// Bind a profile name to a service. Nothing is touched on disk.
    pub fn new(app_root: &Path, service: Arc<dyn Service>, profile_name: &str) -> Result<Self> {
        validate_name(profile_name)?;
        let profile_path = app_root.join(service.name()).join(profile_name);
        let cache_path = profile_path.join(CACHE_DIR);
        Ok(Self {
            service,
            profile_name: profile_name.to_string(),
            profile_path,
            cache_path,
        })
    }

    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn profile_path(&self) -> &Path {
        &self.profile_path
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn config_path(&self) -> PathBuf {
        self.profile_path.join(CONFIG_FILE)
    }

    pub fn exists(&self) -> bool {
        self.profile_path.exists()
    }

    fn describe(&self) -> String {
        format!("'{}' - '{}'", self.service.name(), self.profile_name)
    }

    fn context(&self, read_only: bool, log: SessionLog) -> ProfileContext {
        ProfileContext {
            service_name: self.service.name().to_string(),
            profile_name: self.profile_name.clone(),
            profile_path: self.profile_path.clone(),
            cache_path: self.cache_path.clone(),
            read_only,
            log,
        }
    }

    fn session_log(&self, verbose: bool) -> SessionLog {
        SessionLog::new(self.service.label(), &self.profile_name, verbose)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Read and validate the persisted configuration.
    pub fn load_config(&self) -> Result<Value> {
        let path = self.config_path();
        let text = fs::read_to_string(&path).map_err(|e| {
            ProfileError::Starting(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Value = serde_json::from_str(&text).map_err(|e| {
            ProfileError::Starting(format!("Malformed config {}: {}", path.display(), e))
        })?;
        self.service.schema().validate(&config).map_err(|e| {
            ProfileError::Starting(format!("Invalid config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Validate `config` and write it atomically.
    pub fn save_config(&self, config: &Value) -> Result<()> {
        self.service
            .schema()
            .validate(config)
            .map_err(|e| ProfileError::Creation(format!("Invalid config: {}", e)))?;
        write_config(&self.profile_path, config).map_err(|e| {
            ProfileError::Creation(format!(
                "Failed to write {}: {}",
                self.config_path().display(),
                e
            ))
        })
    }

    /// Version recorded when the profile was created.
    pub fn version(&self) -> Option<String> {
        read_version(&self.profile_path)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the profile on disk.
    ///
    /// The service hook runs first, so a hook failure leaves nothing behind.
    /// If writing the directory tree fails part way, the partial tree is
    /// removed before the error is returned.
    pub fn create(&self) -> Result<()> {
        if self.exists() {
            return Err(ProfileError::Creation(format!(
                "Profile {} already exists",
                self.describe()
            )));
        }

        let log = self.session_log(log::log_enabled!(log::Level::Debug));
        let ctx = self.context(false, log.clone());
        let config = self
            .service
            .create(&ctx, self.service.default_config())
            .map_err(|e| ProfileError::Creation(format!("Profile {}: {}", self.describe(), e)))?;
        self.service
            .schema()
            .validate(&config)
            .map_err(|e| ProfileError::Creation(format!("Invalid config: {}", e)))?;

        if let Err(e) = self.materialize(&config) {
            let _ = fs::remove_dir_all(&self.profile_path);
            return Err(e);
        }
        log.debug(format!("Created {}", self.profile_path.display()));
        Ok(())
    }

    fn materialize(&self, config: &Value) -> Result<()> {
        let creation = |e: std::io::Error| {
            ProfileError::Creation(format!(
                "Failed to create {}: {}",
                self.profile_path.display(),
                e
            ))
        };
        fs::create_dir_all(&self.profile_path).map_err(creation)?;
        fs::create_dir(&self.cache_path).map_err(creation)?;
        fs::write(
            self.profile_path.join(VERSION_FILE),
            format!("{}\n", self.service.version()),
        )
        .map_err(creation)?;
        self.save_config(config)
    }

    /// Remove the profile.
    ///
    /// The service hook runs first; the directory tree is deleted whatever
    /// its outcome. Removing a profile that does not exist is a no-op.
    pub fn remove(&self) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }

        let log = self.session_log(log::log_enabled!(log::Level::Debug));
        let hook = self.service.remove(&self.context(false, log));
        let _ = fs::remove_dir_all(&self.profile_path);

        hook.map_err(|e| ProfileError::Removal(format!("Profile {}: {}", self.describe(), e)))
    }

    /// Start the profile and mount it through FUSE.
    ///
    /// Blocks until the filesystem is unmounted.
    pub fn start(&self, verbose: bool, read_only: bool) -> Result<()> {
        self.start_with(&cloudfs_fs::fuse::FuseBinding, verbose, read_only)
    }

    /// Start the profile through an arbitrary kernel binding.
    pub fn start_with<B>(&self, binding: &B, verbose: bool, read_only: bool) -> Result<()>
    where
        B: KernelBinding + ?Sized,
    {
        if !self.exists() {
            return Err(ProfileError::Starting(format!(
                "Profile {} does not exist",
                self.describe()
            )));
        }

        let log = self.session_log(verbose);
        let config = self.load_config()?;
        log.debug(format!("Loaded config {}", config));

        let ctx = self.context(read_only, log.clone());
        let plan = self
            .service
            .start(&ctx, &config)
            .map_err(|e| ProfileError::Starting(format!("Profile {}: {}", self.describe(), e)))?;

        check_mount_point(binding, &plan.mount_point, &log)?;

        let options = MountOptions::new(format!(
            "cloudfs-{}:{}",
            self.service.name(),
            self.profile_name
        ))
        .read_only(read_only);
        run_session(binding, plan, &options, &log)
    }
}

/// Write `config` as `config.json` in `dir`, indented by four spaces.
fn write_config(dir: &Path, config: &Value) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(config, &mut serializer)?;
    buf.push(b'\n');

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&buf)?;
    temp.as_file().sync_all()?;
    temp.persist(dir.join(CONFIG_FILE)).map_err(|e| e.error)?;
    Ok(())
}

/// Read the trimmed `VERSION` marker of a profile directory.
pub fn read_version(profile_path: &Path) -> Option<String> {
    fs::read_to_string(profile_path.join(VERSION_FILE))
        .ok()
        .map(|v| v.trim().to_string())
}
