//! `fuser::Filesystem` implementation over the path-based capability
//! contract.
//!
//! Apart from translating inode numbers to paths, the only transformation
//! applied here is the `.`/`..` prefix on directory listings.

use super::inode::InodeTable;
use crate::error::{FsError, FsResult};
use crate::filesystem::FileSystem;
use crate::stat::{DirEntry, Stat, BLOCK_SIZE};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr,
    Request, TimeOrNow,
};
use log::{debug, trace, warn};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Time-to-live for cached attributes and entries.
const TTL: Duration = Duration::from_secs(1);

/// Prefix a listing with the `.` and `..` entries.
///
/// Entries named `.` or `..` supplied by the implementation are dropped so
/// the reserved pair appears exactly once, first and in that order.
pub fn with_dot_entries(listing: Vec<DirEntry>) -> Vec<DirEntry> {
    let mut entries = Vec::with_capacity(listing.len() + 2);
    entries.push(DirEntry::dir("."));
    entries.push(DirEntry::dir(".."));
    entries.extend(
        listing
            .into_iter()
            .filter(|e| e.name != "." && e.name != ".."),
    );
    entries
}

/// Kernel callback adapter for a [`FileSystem`].
pub struct FuseOperations {
    fs: Arc<dyn FileSystem>,
    inodes: InodeTable,
    /// User ID reported as owner of every node.
    uid: u32,
    /// Group ID reported as owner of every node.
    gid: u32,
}

impl FuseOperations {
    /// Wrap a filesystem. Nodes are reported as owned by the current user.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self {
            fs,
            inodes: InodeTable::new(),
            uid,
            gid,
        }
    }

    /// The wrapped filesystem.
    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    fn path(&self, ino: u64) -> FsResult<PathBuf> {
        self.inodes
            .path(ino)
            .map(Path::to_path_buf)
            .ok_or(FsError::NotFound)
    }

    fn child(&self, parent: u64, name: &OsStr) -> FsResult<PathBuf> {
        self.inodes.child(parent, name).ok_or(FsError::NotFound)
    }

    /// Convert attributes into the kernel representation.
    pub fn file_attr(&self, ino: u64, stat: &Stat) -> FileAttr {
        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.blocks(),
            atime: stat.atime,
            mtime: stat.mtime,
            ctime: stat.ctime,
            crtime: stat.ctime,
            kind: if stat.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: stat.perm(),
            nlink: stat.nlink(),
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Attributes of a known inode.
    pub fn attr_of(&self, ino: u64, fh: Option<u64>) -> FsResult<FileAttr> {
        let path = self.path(ino)?;
        let stat = self.fs.getattr(&path, fh)?;
        Ok(self.file_attr(ino, &stat))
    }

    /// Attributes of a path for an entry reply, counting one kernel lookup.
    fn attr_of_path(&mut self, path: &Path) -> FsResult<FileAttr> {
        let stat = self.fs.getattr(path, None)?;
        let ino = self.inodes.lookup(path);
        Ok(self.file_attr(ino, &stat))
    }

    /// Resolve `name` in `parent`.
    pub fn lookup_entry(&mut self, parent: u64, name: &OsStr) -> FsResult<FileAttr> {
        let path = self.child(parent, name)?;
        self.attr_of_path(&path)
    }

    /// Listing of a directory inode as `(ino, kind, name)` triples,
    /// starting with `.` and `..`.
    pub fn list_dir(&mut self, ino: u64, fh: u64) -> FsResult<Vec<(u64, FileType, String)>> {
        let path = self.path(ino)?;
        let listing = with_dot_entries(self.fs.readdir(&path, fh)?);

        let mut entries = Vec::with_capacity(listing.len());
        for entry in listing {
            let entry_ino = match entry.name.as_str() {
                "." => ino,
                ".." => self.inodes.parent(ino),
                name => self.inodes.ino(&path.join(name)),
            };
            let kind = if entry.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            entries.push((entry_ino, kind, entry.name));
        }
        Ok(entries)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_setattr(
        &self,
        path: &Path,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        fh: Option<u64>,
    ) -> FsResult<()> {
        if let Some(mode) = mode {
            self.fs.chmod(path, mode)?;
        }
        if uid.is_some() || gid.is_some() {
            self.fs.chown(path, uid, gid)?;
        }
        if let Some(size) = size {
            self.fs.truncate(path, size, fh)?;
        }
        if atime.is_some() || mtime.is_some() {
            self.fs
                .utimens(path, atime.map(resolve_time), mtime.map(resolve_time))?;
        }
        Ok(())
    }
}

fn resolve_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn xattr_name(name: &OsStr) -> String {
    name.to_string_lossy().into_owned()
}

fn reply_xattr(reply: ReplyXattr, size: u32, data: &[u8]) {
    if size == 0 {
        reply.size(data.len() as u32);
    } else if data.len() > size as usize {
        reply.error(libc::ERANGE);
    } else {
        reply.data(data);
    }
}

impl Filesystem for FuseOperations {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        debug!("init");
        self.fs.init().map_err(|e| e.errno())
    }

    fn destroy(&mut self) {
        debug!("destroy");
        self.fs.destroy();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!("lookup(parent={}, name={:?})", parent, name);
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!("forget(ino={}, nlookup={})", ino, nlookup);
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        trace!("getattr(ino={})", ino);
        match self.attr_of(ino, fh) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        trace!("setattr(ino={}, size={:?})", ino, size);
        let result = self.path(ino).and_then(|path| {
            self.apply_setattr(&path, mode, uid, gid, size, atime, mtime, fh)?;
            self.attr_of(ino, fh)
        });
        match result {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        trace!("readlink(ino={})", ino);
        match self.path(ino).and_then(|path| self.fs.readlink(&path)) {
            Ok(target) => reply.data(target.as_os_str().as_encoded_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        trace!("mknod(parent={}, name={:?})", parent, name);
        let result = self.child(parent, name).and_then(|path| {
            self.fs.mknod(&path, mode, rdev)?;
            self.attr_of_path(&path)
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        trace!("mkdir(parent={}, name={:?})", parent, name);
        let result = self.child(parent, name).and_then(|path| {
            self.fs.mkdir(&path, mode)?;
            self.attr_of_path(&path)
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!("unlink(parent={}, name={:?})", parent, name);
        let result = self.child(parent, name).and_then(|path| {
            self.fs.unlink(&path)?;
            self.inodes.remove(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!("rmdir(parent={}, name={:?})", parent, name);
        let result = self.child(parent, name).and_then(|path| {
            self.fs.rmdir(&path)?;
            self.inodes.remove(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        trace!("symlink(parent={}, name={:?})", parent, link_name);
        let result = self.child(parent, link_name).and_then(|path| {
            self.fs.symlink(&path, target)?;
            self.attr_of_path(&path)
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        trace!("rename({:?} -> {:?})", name, newname);
        let result = self.child(parent, name).and_then(|old| {
            let new = self.child(newparent, newname)?;
            self.fs.rename(&old, &new)?;
            self.inodes.rename(&old, &new);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        trace!("link(ino={}, name={:?})", ino, newname);
        let result = self.path(ino).and_then(|existing| {
            let link = self.child(newparent, newname)?;
            self.fs.link(&link, &existing)?;
            self.attr_of_path(&link)
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!("open(ino={}, flags={:#x})", ino, flags);
        match self.path(ino).and_then(|path| self.fs.open(&path, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!("read(ino={}, offset={}, size={})", ino, offset, size);
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self
            .path(ino)
            .and_then(|path| self.fs.read(&path, size, offset as u64, fh))
        {
            Ok(data) => reply.data(&data),
            Err(e) => {
                warn!("read: inode {} failed: {}", ino, e);
                reply.error(e.errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!("write(ino={}, offset={}, len={})", ino, offset, data.len());
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self
            .path(ino)
            .and_then(|path| self.fs.write(&path, data, offset as u64, fh))
        {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        match self.path(ino).and_then(|path| self.fs.flush(&path, fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.path(ino).and_then(|path| self.fs.release(&path, fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        match self.path(ino).and_then(|path| self.fs.fsync(&path, datasync, fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!("opendir(ino={})", ino);
        match self.path(ino).and_then(|path| self.fs.opendir(&path)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!("readdir(ino={}, offset={})", ino, offset);
        let entries = match self.list_dir(ino, fh) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        // Skip to offset and add entries until buffer is full
        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset.max(0) as usize)
        {
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        match self.path(ino).and_then(|path| self.fs.releasedir(&path, fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn fsyncdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        match self
            .path(ino)
            .and_then(|path| self.fs.fsyncdir(&path, datasync, fh))
        {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        trace!("statfs");
        let path = self.path(ino).unwrap_or_else(|_| PathBuf::from("/"));
        match self.fs.statfs(&path) {
            Ok(s) => reply.statfs(
                s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize,
            ),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let result = self
            .path(ino)
            .and_then(|path| self.fs.setxattr(&path, &xattr_name(name), value, flags));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        match self
            .path(ino)
            .and_then(|path| self.fs.getxattr(&path, &xattr_name(name)))
        {
            Ok(value) => reply_xattr(reply, size, &value),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        match self.path(ino).and_then(|path| self.fs.listxattr(&path)) {
            Ok(names) => {
                let mut data = Vec::new();
                for name in names {
                    data.extend_from_slice(name.as_bytes());
                    data.push(0);
                }
                reply_xattr(reply, size, &data);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        match self
            .path(ino)
            .and_then(|path| self.fs.removexattr(&path, &xattr_name(name)))
        {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.path(ino).and_then(|path| self.fs.access(&path, mask)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        trace!("create(parent={}, name={:?})", parent, name);
        let result = self.child(parent, name).and_then(|path| {
            let fh = self.fs.create(&path, mode, flags)?;
            Ok((self.attr_of_path(&path)?, fh))
        });
        match result {
            Ok((attr, fh)) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }
}
