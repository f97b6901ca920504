use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Block size used for `st_blocks` accounting.
pub const BLOCK_SIZE: u32 = 512;

/// Permission bits reported for directories.
pub const DIR_PERM: u16 = 0o755;

/// Permission bits reported for regular files.
pub const FILE_PERM: u16 = 0o644;

/// Attributes of a file or directory.
///
/// Only two kinds of node exist: directories (`0755`) and regular files
/// (`0644`). Derived fields such as the block count are computed, never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Whether the node is a directory.
    pub is_dir: bool,
    /// Size in bytes.
    pub size: u64,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
}

impl Stat {
    /// Attributes for a directory with all timestamps set to `time`.
    pub fn dir(time: SystemTime) -> Self {
        Self {
            is_dir: true,
            size: 0,
            atime: time,
            mtime: time,
            ctime: time,
        }
    }

    /// Attributes for a regular file with all timestamps set to `time`.
    pub fn file(size: u64, time: SystemTime) -> Self {
        Self {
            is_dir: false,
            size,
            atime: time,
            mtime: time,
            ctime: time,
        }
    }

    /// Build attributes from timestamps in seconds since the Unix epoch.
    pub fn from_secs(is_dir: bool, size: u64, atime: f64, mtime: f64, ctime: f64) -> Self {
        Self {
            is_dir,
            size,
            atime: secs_to_time(atime),
            mtime: secs_to_time(mtime),
            ctime: secs_to_time(ctime),
        }
    }

    /// Whether the node is a regular file.
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// `st_mode` including the file type bits.
    pub fn mode(&self) -> u32 {
        if self.is_dir {
            libc::S_IFDIR as u32 | DIR_PERM as u32
        } else {
            libc::S_IFREG as u32 | FILE_PERM as u32
        }
    }

    /// Permission bits without the file type.
    pub fn perm(&self) -> u16 {
        if self.is_dir {
            DIR_PERM
        } else {
            FILE_PERM
        }
    }

    /// Number of 512-byte blocks, rounded up.
    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(BLOCK_SIZE as u64)
    }

    /// Hard link count.
    pub fn nlink(&self) -> u32 {
        1
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (no separators).
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl DirEntry {
    /// A regular file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    /// A directory entry.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Filesystem statistics, as in `statvfs(3)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    /// Total data blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Free blocks available to unprivileged users.
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

/// Convert seconds since the Unix epoch to a `SystemTime`.
pub fn secs_to_time(secs: f64) -> SystemTime {
    if secs.is_finite() && secs > 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(secs)
    } else {
        UNIX_EPOCH
    }
}

/// Convert a `SystemTime` to seconds since the Unix epoch.
pub fn time_to_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_and_file_modes_are_fixed() {
        let now = SystemTime::now();
        let dir = Stat::dir(now);
        let file = Stat::file(10, now);

        assert_eq!(dir.mode(), libc::S_IFDIR as u32 | 0o755);
        assert_eq!(file.mode(), libc::S_IFREG as u32 | 0o644);
        assert!(dir.is_dir && !dir.is_file());
        assert!(file.is_file());
        assert_eq!(file.nlink(), 1);
    }

    #[test]
    fn blocks_round_up() {
        let now = SystemTime::now();
        assert_eq!(Stat::file(0, now).blocks(), 0);
        assert_eq!(Stat::file(1, now).blocks(), 1);
        assert_eq!(Stat::file(512, now).blocks(), 1);
        assert_eq!(Stat::file(513, now).blocks(), 2);
    }

    #[test]
    fn seconds_conversion() {
        let stat = Stat::from_secs(false, 3, 1.5, 2.0, 0.0);
        assert_eq!(time_to_secs(stat.atime), 1.5);
        assert_eq!(time_to_secs(stat.mtime), 2.0);
        assert_eq!(stat.ctime, UNIX_EPOCH);
    }
}
