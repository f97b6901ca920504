//! Service lookup by name and profile discovery.

use crate::demo::DemoService;
use crate::error::{ProfileError, Result};
use crate::profile::{read_version, Profile};
use crate::service::Service;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Services known to the application, keyed by name.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<dyn Service>>,
}

/// A profile found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub service_name: String,
    /// Service label, when the service is registered.
    pub service_label: Option<String>,
    pub profile_name: String,
    /// Content of the `VERSION` marker, if readable.
    pub version: Option<String>,
    pub path: PathBuf,
}

impl ServiceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every bundled service.
    pub fn builtin(mount_root: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DemoService::new(mount_root)));
        registry
    }

    /// Add a service, replacing any service of the same name.
    pub fn register(&mut self, service: Arc<dyn Service>) -> &mut Self {
        self.services.insert(service.name().to_string(), service);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get(name).cloned()
    }

    /// Registered service names, sorted.
    pub fn list_services(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    /// Build a profile of a registered service.
    pub fn profile(
        &self,
        app_root: &Path,
        service_name: &str,
        profile_name: &str,
    ) -> Result<Profile> {
        let service = self.get(service_name).ok_or_else(|| {
            ProfileError::Initialization(format!(
                "Unknown service '{}' (available: {})",
                service_name,
                self.list_services().join(", ")
            ))
        })?;
        Profile::new(app_root, service, profile_name)
    }

    /// Every `<app-root>/<service>/<profile>` directory, sorted.
    ///
    /// A missing application root yields no profiles.
    pub fn profiles(&self, app_root: &Path) -> io::Result<Vec<ProfileEntry>> {
        let mut entries = Vec::new();
        for service_dir in sorted_dirs(app_root)? {
            let service_name = file_name(&service_dir);
            let service_label = self.get(&service_name).map(|s| s.label().to_string());
            for profile_dir in sorted_dirs(&service_dir)? {
                entries.push(ProfileEntry {
                    service_name: service_name.clone(),
                    service_label: service_label.clone(),
                    profile_name: file_name(&profile_dir),
                    version: read_version(&profile_dir),
                    path: profile_dir,
                });
            }
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.services.keys()).finish()
    }
}

fn sorted_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut dirs = Vec::new();
    for entry in read {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
