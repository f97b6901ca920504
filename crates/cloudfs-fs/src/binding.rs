//! Kernel virtual-filesystem binding abstraction.
//!
//! The orchestrator talks to the kernel only through [`KernelBinding`], so
//! the mount sequence can be exercised without a FUSE device.

use crate::filesystem::FileSystem;
use log::debug;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

/// Mount table of the calling process (Linux).
const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Options surfaced to the kernel binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Mount read-only.
    pub read_only: bool,
    /// Unmount automatically when the serving process exits.
    pub auto_unmount: bool,
    /// Filesystem name shown in the mount table.
    pub fs_name: String,
}

impl MountOptions {
    /// Read-write, auto-unmounting options with the given display name.
    pub fn new(fs_name: impl Into<String>) -> Self {
        Self {
            read_only: false,
            auto_unmount: true,
            fs_name: fs_name.into(),
        }
    }

    /// Set the read-only flag.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// A facility that serves a [`FileSystem`] at a directory.
pub trait KernelBinding {
    /// Mount `fs` at `mount_point` and serve callbacks on the calling thread
    /// until the filesystem is unmounted.
    fn mount(
        &self,
        fs: Arc<dyn FileSystem>,
        mount_point: &Path,
        options: &MountOptions,
    ) -> io::Result<()>;

    /// Unmount `mount_point`.
    fn unmount(&self, mount_point: &Path) -> io::Result<()> {
        unmount(mount_point)
    }

    /// Whether `path` is currently an active mount point.
    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        is_mount_point(path)
    }
}

/// Whether `path` is an active mount point.
///
/// Consults the process mount table when available, otherwise compares the
/// directory's device and inode with its parent's.
pub fn is_mount_point(path: &Path) -> io::Result<bool> {
    let path = fs::canonicalize(path)?;
    match fs::read_to_string(MOUNTINFO) {
        Ok(table) => Ok(mount_table_contains(&table, &path)),
        Err(err) => {
            debug!("{} unavailable ({}), comparing devices", MOUNTINFO, err);
            is_device_boundary(&path)
        }
    }
}

/// Whether a `mountinfo`-formatted table lists `path` as a mount point.
pub fn mount_table_contains(table: &str, path: &Path) -> bool {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .any(|field| Path::new(&unescape_octal(field)) == path)
}

/// Whether `path` sits on a different device than its parent, or is the
/// root of its device.
pub fn is_device_boundary(path: &Path) -> io::Result<bool> {
    let meta = fs::metadata(path)?;
    let parent = fs::metadata(path.join(".."))?;
    Ok(meta.dev() != parent.dev() || meta.ino() == parent.ino())
}

/// Unmount a FUSE mount point with the platform's unmount command.
pub fn unmount(mount_point: &Path) -> io::Result<()> {
    let mut command = if cfg!(target_os = "linux") {
        let mut command = Command::new("fusermount");
        command.arg("-u");
        command
    } else {
        Command::new("umount")
    };
    command.arg(mount_point);
    debug!("Running {:?}", command);

    let status = command.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{:?} exited with {}", command, status),
        ))
    }
}

/// The command an operator should run to unmount `mount_point` by hand.
pub fn unmount_hint(mount_point: &Path) -> String {
    if cfg!(target_os = "linux") {
        format!("fusermount -u '{}'", mount_point.display())
    } else {
        format!("umount '{}'", mount_point.display())
    }
}

/// Decode the `\NNN` octal escapes used by the kernel for mount paths.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&field[i + 1..i + 4], 8) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TABLE: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
35 22 0:31 / /home/alice/My\\040Drive rw,nosuid,nodev shared:20 - fuse.demo demo rw
";

    #[test]
    fn table_lookup_matches_mount_field() {
        assert!(mount_table_contains(TABLE, Path::new("/")));
        assert!(mount_table_contains(TABLE, Path::new("/home/alice/My Drive")));
        assert!(!mount_table_contains(TABLE, Path::new("/home/alice")));
    }

    #[test]
    fn octal_escapes_are_decoded() {
        assert_eq!(unescape_octal("/a\\040b\\011c"), "/a b\tc");
        assert_eq!(unescape_octal("/plain"), "/plain");
        assert_eq!(unescape_octal("/trailing\\04"), "/trailing\\04");
    }

    #[test]
    fn plain_directory_is_not_a_mount_point() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("mnt");
        fs::create_dir(&dir).unwrap();

        assert!(!is_mount_point(&dir).unwrap());
        assert!(!is_device_boundary(&dir).unwrap());
    }

    #[test]
    fn filesystem_root_is_a_device_boundary() {
        assert!(is_device_boundary(Path::new("/")).unwrap());
    }

    #[test]
    fn hint_names_the_mount_point() {
        assert!(unmount_hint(Path::new("/mnt/x")).contains("'/mnt/x'"));
    }
}
