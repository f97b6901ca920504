//! Mounting through `fuser`.

use super::adapter::FuseOperations;
use crate::binding::{self, KernelBinding, MountOptions};
use crate::filesystem::FileSystem;
use fuser::MountOption;
use log::{debug, error, info};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Kernel binding backed by `fuser`.
///
/// [`KernelBinding::mount`] serves callbacks on the calling thread. While it
/// runs, SIGINT, SIGTERM and SIGHUP unmount the mount point so the session
/// ends cleanly instead of leaving a dead mount behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuseBinding;

impl KernelBinding for FuseBinding {
    fn mount(
        &self,
        fs: Arc<dyn FileSystem>,
        mount_point: &Path,
        options: &MountOptions,
    ) -> io::Result<()> {
        let ops = FuseOperations::new(fs);
        let fuse_options = fuse_mount_options(options);

        debug!(
            "Mounting '{}' at {} (read_only={})",
            options.fs_name,
            mount_point.display(),
            options.read_only
        );

        let watcher = SignalWatcher::spawn(mount_point)?;
        let result = fuser::mount2(ops, mount_point, &fuse_options);
        watcher.stop();

        result.map_err(|e| io::Error::new(e.kind(), format!("FUSE session failed: {}", e)))
    }
}

/// Mount in the background and return the session handle.
///
/// The filesystem stays mounted until the returned `BackgroundSession` is
/// dropped or joined.
pub fn spawn_mount(
    fs: Arc<dyn FileSystem>,
    mount_point: &Path,
    options: &MountOptions,
) -> io::Result<fuser::BackgroundSession> {
    let ops = FuseOperations::new(fs);
    debug!(
        "Mounting '{}' at {} (background)",
        options.fs_name,
        mount_point.display()
    );
    fuser::spawn_mount2(ops, mount_point, &fuse_mount_options(options))
        .map_err(|e| io::Error::new(e.kind(), format!("FUSE mount failed: {}", e)))
}

/// Translate mount options into `fuser` options.
pub fn fuse_mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut fuse_options = vec![
        MountOption::FSName(options.fs_name.clone()),
        MountOption::Subtype("cloudfs".to_string()),
        MountOption::DefaultPermissions,
        if options.read_only {
            MountOption::RO
        } else {
            MountOption::RW
        },
    ];
    if options.auto_unmount {
        fuse_options.push(MountOption::AutoUnmount);
    }
    fuse_options
}

/// Unmounts a mount point when a termination signal arrives.
struct SignalWatcher {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalWatcher {
    fn spawn(mount_point: &Path) -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
        let handle = signals.handle();
        let mount_point: PathBuf = mount_point.to_path_buf();

        let thread = thread::Builder::new()
            .name("cloudfs-signals".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!(
                        "Received signal {}, unmounting {}",
                        signal,
                        mount_point.display()
                    );
                    if let Err(e) = binding::unmount(&mount_point) {
                        error!("Unmount of {} failed: {}", mount_point.display(), e);
                    }
                }
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    fn stop(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
