//! Mount-point validation and the mount session.

use crate::error::{ProfileError, Result};
use crate::logging::SessionLog;
use crate::service::StartPlan;
use crate::worker::start_workers;
use cloudfs_fs::{unmount_hint, KernelBinding, MountOptions};
use std::fs;
use std::io;
use std::path::Path;

/// Check that `mount_point` can receive a new mount.
///
/// A missing directory is created along with its parents. The path must be
/// absolute, a directory, empty, and not already mounted. I/O failures are
/// reported with the command that unmounts a stale session by hand.
pub fn check_mount_point<B>(binding: &B, mount_point: &Path, log: &SessionLog) -> Result<()>
where
    B: KernelBinding + ?Sized,
{
    if !mount_point.is_absolute() {
        return Err(ProfileError::Starting(format!(
            "Mountpoint '{}' is not an absolute path",
            mount_point.display()
        )));
    }

    inspect(binding, mount_point, log).map_err(|e| match e {
        Check::Rejected(message) => ProfileError::Starting(message),
        Check::Io(e) => ProfileError::Starting(format!(
            "{}, unmount manually with \"{}\"",
            e,
            unmount_hint(mount_point)
        )),
    })
}

enum Check {
    Rejected(String),
    Io(io::Error),
}

impl From<io::Error> for Check {
    fn from(e: io::Error) -> Self {
        Check::Io(e)
    }
}

fn inspect<B>(binding: &B, mount_point: &Path, log: &SessionLog) -> std::result::Result<(), Check>
where
    B: KernelBinding + ?Sized,
{
    let shown = mount_point.display();

    if !mount_point.exists() {
        log.info(format!("Mountpoint '{}' does not exist, creating...", shown));
        fs::create_dir_all(mount_point)?;
    }

    if !fs::metadata(mount_point)?.is_dir() {
        return Err(Check::Rejected(format!(
            "Mountpoint '{}' is not a directory",
            shown
        )));
    }

    if fs::read_dir(mount_point)?.next().is_some() {
        return Err(Check::Rejected(format!("Mountpoint '{}' is not empty", shown)));
    }

    if binding.is_mount_point(mount_point)? {
        return Err(Check::Rejected(format!(
            "Mountpoint '{}' is already a mountpoint",
            shown
        )));
    }

    Ok(())
}

/// Run a mount session for a started service.
///
/// Workers pass the startup barrier first, then `binding` serves the
/// filesystem on the calling thread until it is unmounted. If the session
/// fails, an explicit unmount is attempted before the error is returned.
/// Detached workers are stopped once the session is over.
pub fn run_session<B>(
    binding: &B,
    plan: StartPlan,
    options: &MountOptions,
    log: &SessionLog,
) -> Result<()>
where
    B: KernelBinding + ?Sized,
{
    let StartPlan {
        filesystem,
        mount_point,
        workers,
    } = plan;

    let running = start_workers(workers, log)?;

    log.info(format!(
        "Mounting at '{}'{}",
        mount_point.display(),
        if options.read_only { " (read-only)" } else { "" }
    ));
    let result = match binding.mount(filesystem, &mount_point, options) {
        Ok(()) => {
            log.info(format!("Unmounted '{}'", mount_point.display()));
            Ok(())
        }
        Err(e) => {
            log.error(format!("Session at '{}' failed: {}", mount_point.display(), e));
            if let Err(unmount_err) = binding.unmount(&mount_point) {
                log.warn(format!(
                    "Unmount failed ({}), unmount manually with \"{}\"",
                    unmount_err,
                    unmount_hint(&mount_point)
                ));
            }
            Err(ProfileError::Starting(format!(
                "Mount session at '{}' failed: {}",
                mount_point.display(),
                e
            )))
        }
    };

    running.shutdown(log);
    result
}
