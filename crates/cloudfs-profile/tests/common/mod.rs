#![allow(dead_code)]

use cloudfs_fs::fuse::{FuseOperations, ROOT_INO};
use cloudfs_fs::{FileSystem, FsError, FsResult, KernelBinding, MountOptions, Stat};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// What the fake kernel saw during one mount.
#[derive(Debug, Clone)]
pub struct Session {
    pub mount_point: PathBuf,
    pub options: MountOptions,
    pub was_mount_point: bool,
    pub root_listing: Vec<String>,
}

/// Kernel binding that records mounts instead of performing them.
#[derive(Default)]
pub struct FakeBinding {
    mounted: Mutex<HashSet<PathBuf>>,
    pub sessions: Mutex<Vec<Session>>,
    pub unmounts: Mutex<Vec<PathBuf>>,
    pub events: Option<Arc<Mutex<Vec<String>>>>,
    pub fail_with: Option<io::ErrorKind>,
}

impl FakeBinding {
    pub fn with_events(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            ..Self::default()
        }
    }

    /// Pretend `path` is already mounted by someone else.
    pub fn occupy(&self, path: &Path) {
        self.mounted.lock().insert(path.to_path_buf());
    }
}

impl KernelBinding for FakeBinding {
    fn mount(
        &self,
        fs: Arc<dyn FileSystem>,
        mount_point: &Path,
        options: &MountOptions,
    ) -> io::Result<()> {
        if let Some(events) = &self.events {
            events.lock().push("mount".to_string());
        }
        self.mounted.lock().insert(mount_point.to_path_buf());
        let was_mount_point = self.is_mount_point(mount_point)?;

        let mut ops = FuseOperations::new(fs);
        let root_listing = ops
            .list_dir(ROOT_INO, 0)
            .map_err(|e| io::Error::from_raw_os_error(e.errno()))?
            .into_iter()
            .map(|(_, _, name)| name)
            .collect();

        self.sessions.lock().push(Session {
            mount_point: mount_point.to_path_buf(),
            options: options.clone(),
            was_mount_point,
            root_listing,
        });

        match self.fail_with {
            Some(kind) => Err(io::Error::new(kind, "session crashed")),
            None => {
                self.mounted.lock().remove(mount_point);
                Ok(())
            }
        }
    }

    fn unmount(&self, mount_point: &Path) -> io::Result<()> {
        self.unmounts.lock().push(mount_point.to_path_buf());
        self.mounted.lock().remove(mount_point);
        Ok(())
    }

    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        Ok(self.mounted.lock().contains(path))
    }
}

/// A filesystem with nothing but an empty root.
pub struct EmptyFs;

impl FileSystem for EmptyFs {
    fn getattr(&self, path: &Path, _fh: Option<u64>) -> FsResult<Stat> {
        if path == Path::new("/") {
            Ok(Stat::dir(SystemTime::now()))
        } else {
            Err(FsError::NotFound)
        }
    }
}
