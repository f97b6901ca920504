use cloudfs_fs::{time_to_secs, DirEntry, FileSystem, FsError, FsResult, Stat, StatFs, BLOCK_SIZE};
use cloudfs_store::{Columns, Database, Row, StoreError, Value};
use log::{debug, error, trace};
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Table holding every file and directory below the root.
pub const ENTRIES_TABLE: &str = "entries";

/// Free space reported by `statfs`, in blocks.
const FREE_BLOCKS: u64 = 1 << 21;

const NAME_MAX: u32 = 255;

/// Largest file the store accepts; SQLite blobs top out near 1 GiB.
pub const MAX_FILE_SIZE: u64 = 1 << 30;

fn entry_columns() -> Columns {
    Columns::new()
        .column("path", "TEXT PRIMARY KEY")
        .column("parent", "TEXT NOT NULL")
        .column("is_dir", "INTEGER NOT NULL")
        .column("size", "INTEGER NOT NULL")
        .column("atime", "REAL NOT NULL")
        .column("mtime", "REAL NOT NULL")
        .column("ctime", "REAL NOT NULL")
        .optional("data", "BLOB")
}

/// Filesystem whose tree lives in a SQLite database.
///
/// The root is implicit. `limit` caps the number of entries below it;
/// creating more reports `ENOSPC`.
pub struct DemoFs {
    db: Database,
    columns: Arc<Columns>,
    select: String,
    limit: u64,
    read_only: bool,
    created: SystemTime,
    next_fh: AtomicU64,
    // Serializes check-then-write sequences across callbacks.
    write_lock: Mutex<()>,
}

impl DemoFs {
    pub fn new(db: Database, limit: u64) -> Self {
        let columns = Arc::new(entry_columns());
        let select = format!(
            "SELECT {} FROM {}",
            columns.names().join(", "),
            ENTRIES_TABLE
        );
        Self {
            db,
            columns,
            select,
            limit,
            read_only: false,
            created: SystemTime::now(),
            next_fh: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Open (or create) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, limit: u64) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?, limit))
    }

    /// Reject every mutating operation with `EROFS`.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Create the entries table and its parent index if missing.
    pub fn prepare(&self) -> Result<(), StoreError> {
        self.db.create_table(ENTRIES_TABLE, &self.columns, false)?;
        self.db.create_index(ENTRIES_TABLE, "parent")
    }

    /// Number of entries below the root.
    pub fn entry_count(&self) -> Result<u64, StoreError> {
        self.scalar(&format!("SELECT COUNT(*) FROM {}", ENTRIES_TABLE))
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> Result<u64, StoreError> {
        self.scalar(&format!(
            "SELECT COALESCE(SUM(size), 0) FROM {}",
            ENTRIES_TABLE
        ))
    }

    fn scalar(&self, sql: &str) -> Result<u64, StoreError> {
        let value = self.db.fetch_one(sql, &[])?;
        Ok(match value.as_deref() {
            Some([Value::Integer(n)]) => (*n).max(0) as u64,
            _ => 0,
        })
    }

    // =========================================================================
    // Row access
    // =========================================================================

    fn entry(&self, path: &Path) -> FsResult<Option<Row>> {
        self.db
            .fetch_row(
                &self.columns,
                &format!("{} WHERE path = ?1", self.select),
                &[key(path)],
            )
            .map_err(store_error)
    }

    fn require(&self, path: &Path) -> FsResult<Row> {
        self.entry(path)?.ok_or(FsError::NotFound)
    }

    fn children(&self, dir: &Path) -> FsResult<Vec<Row>> {
        self.db
            .fetch_rows(
                &self.columns,
                &format!("{} WHERE parent = ?1 ORDER BY path", self.select),
                &[key(dir)],
            )
            .map_err(store_error)
    }

    /// Whether `path` is the root or an existing directory.
    fn is_directory(&self, path: &Path) -> FsResult<bool> {
        if is_root(path) {
            return Ok(true);
        }
        Ok(self.entry(path)?.map(|row| is_dir_row(&row)).unwrap_or(false))
    }

    fn writable(&self) -> FsResult<()> {
        if self.read_only {
            Err(FsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn insert(&self, path: &Path, is_dir: bool) -> FsResult<()> {
        let parent = parent_of(path).ok_or(FsError::AlreadyExists)?;
        if self.entry(path)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        if !is_root(&parent) {
            match self.entry(&parent)? {
                Some(row) if is_dir_row(&row) => {}
                Some(_) => return Err(FsError::NotADirectory),
                None => return Err(FsError::NotFound),
            }
        }
        if self.entry_count().map_err(store_error)? >= self.limit {
            return Err(FsError::NoSpace);
        }

        let now = Value::Real(time_to_secs(SystemTime::now()));
        let row = Row::from_named(
            &self.columns,
            [
                ("path", key(path)),
                ("parent", key(&parent)),
                ("is_dir", Value::Integer(is_dir as i64)),
                ("size", Value::Integer(0)),
                ("atime", now.clone()),
                ("mtime", now.clone()),
                ("ctime", now),
            ],
        )
        .map_err(store_error)?;
        self.db
            .insert_rows(ENTRIES_TABLE, &self.columns, &[row])
            .map_err(store_error)?;
        debug!("Created {} {}", if is_dir { "directory" } else { "file" }, path.display());
        Ok(())
    }

    fn file(&self, path: &Path) -> FsResult<Row> {
        let row = self.require(path)?;
        if is_dir_row(&row) {
            return Err(FsError::IsADirectory);
        }
        Ok(row)
    }

    fn store_data(&self, path: &Path, data: Vec<u8>) -> FsResult<()> {
        let now = Value::Real(time_to_secs(SystemTime::now()));
        let size = Value::Integer(data.len() as i64);
        self.db
            .execute(
                &format!(
                    "UPDATE {} SET data = ?1, size = ?2, mtime = ?3, ctime = ?3 WHERE path = ?4",
                    ENTRIES_TABLE
                ),
                &[Value::Blob(data), size, now, key(path)],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> FsResult<()> {
        self.db
            .execute(
                &format!("DELETE FROM {} WHERE path = ?1", ENTRIES_TABLE),
                &[key(path)],
            )
            .map_err(store_error)?;
        Ok(())
    }
}

impl FileSystem for DemoFs {
    fn destroy(&self) {
        debug!("Demo filesystem released");
    }

    fn statfs(&self, _path: &Path) -> FsResult<StatFs> {
        let count = self.entry_count().map_err(store_error)?;
        let used = self.total_size().map_err(store_error)?.div_ceil(BLOCK_SIZE as u64);
        Ok(StatFs {
            blocks: used + FREE_BLOCKS,
            bfree: FREE_BLOCKS,
            bavail: FREE_BLOCKS,
            files: self.limit,
            ffree: self.limit.saturating_sub(count),
            bsize: BLOCK_SIZE,
            namelen: NAME_MAX,
            frsize: BLOCK_SIZE,
        })
    }

    fn getattr(&self, path: &Path, _fh: Option<u64>) -> FsResult<Stat> {
        if is_root(path) {
            return Ok(Stat::dir(self.created));
        }
        let row = self.require(path)?;
        Ok(Stat::from_secs(
            is_dir_row(&row),
            row.integer("size").unwrap_or(0).max(0) as u64,
            row.real("atime").unwrap_or(0.0),
            row.real("mtime").unwrap_or(0.0),
            row.real("ctime").unwrap_or(0.0),
        ))
    }

    fn utimens(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        if is_root(path) {
            return Ok(());
        }
        self.writable()?;
        let _guard = self.write_lock.lock();
        let row = self.require(path)?;
        let atime = atime.map(time_to_secs).or_else(|| row.real("atime"));
        let mtime = mtime.map(time_to_secs).or_else(|| row.real("mtime"));
        self.db
            .execute(
                &format!(
                    "UPDATE {} SET atime = ?1, mtime = ?2, ctime = ?3 WHERE path = ?4",
                    ENTRIES_TABLE
                ),
                &[
                    Value::Real(atime.unwrap_or(0.0)),
                    Value::Real(mtime.unwrap_or(0.0)),
                    Value::Real(time_to_secs(SystemTime::now())),
                    key(path),
                ],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn opendir(&self, path: &Path) -> FsResult<u64> {
        if !self.is_directory(path)? {
            return Err(if self.entry(path)?.is_some() {
                FsError::NotADirectory
            } else {
                FsError::NotFound
            });
        }
        Ok(0)
    }

    fn readdir(&self, path: &Path, _fh: u64) -> FsResult<Vec<DirEntry>> {
        if !self.is_directory(path)? {
            return Err(FsError::NotADirectory);
        }
        let entries = self
            .children(path)?
            .iter()
            .filter_map(|row| {
                let name = Path::new(row.text("path")?).file_name()?;
                Some(DirEntry {
                    name: name.to_string_lossy().into_owned(),
                    is_dir: is_dir_row(row),
                })
            })
            .collect();
        Ok(entries)
    }

    fn mkdir(&self, path: &Path, _mode: u32) -> FsResult<()> {
        self.writable()?;
        let _guard = self.write_lock.lock();
        self.insert(path, true)
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.writable()?;
        if is_root(path) {
            return Err(FsError::PermissionDenied);
        }
        let _guard = self.write_lock.lock();
        let row = self.require(path)?;
        if !is_dir_row(&row) {
            return Err(FsError::NotADirectory);
        }
        if !self.children(path)?.is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.delete(path)
    }

    fn rename(&self, old: &Path, new: &Path) -> FsResult<()> {
        self.writable()?;
        if is_root(old) || is_root(new) {
            return Err(FsError::PermissionDenied);
        }
        if old == new {
            return Ok(());
        }
        if new.starts_with(old) {
            return Err(FsError::Os(libc::EINVAL));
        }

        let _guard = self.write_lock.lock();
        let source = self.require(old)?;
        let new_parent = parent_of(new).ok_or(FsError::PermissionDenied)?;
        if !self.is_directory(&new_parent)? {
            return Err(FsError::NotFound);
        }

        if let Some(target) = self.entry(new)? {
            match (is_dir_row(&source), is_dir_row(&target)) {
                (true, false) => return Err(FsError::NotADirectory),
                (false, true) => return Err(FsError::IsADirectory),
                (true, true) if !self.children(new)?.is_empty() => {
                    return Err(FsError::NotEmpty)
                }
                _ => self.delete(new)?,
            }
        }

        let moved = self
            .db
            .fetch_all(
                &format!(
                    "SELECT path FROM {} WHERE path = ?1 OR path LIKE ?2 ESCAPE '\\'",
                    ENTRIES_TABLE
                ),
                &[key(old), Value::Text(format!("{}/%", escape_like(&text_key(old))))],
            )
            .map_err(store_error)?;

        let now = Value::Real(time_to_secs(SystemTime::now()));
        let mut batch = Vec::with_capacity(moved.len());
        for values in moved {
            let Some(Value::Text(path)) = values.into_iter().next() else {
                continue;
            };
            let path = PathBuf::from(path);
            let renamed = match path.strip_prefix(old) {
                Ok(rest) if rest.as_os_str().is_empty() => new.to_path_buf(),
                Ok(rest) => new.join(rest),
                Err(_) => continue,
            };
            let parent = parent_of(&renamed).unwrap_or_else(|| PathBuf::from("/"));
            batch.push(vec![key(&renamed), key(&parent), now.clone(), key(&path)]);
        }
        self.db
            .execute_many(
                &format!(
                    "UPDATE {} SET path = ?1, parent = ?2, ctime = ?3 WHERE path = ?4",
                    ENTRIES_TABLE
                ),
                &batch,
            )
            .map_err(store_error)?;
        debug!("Renamed {} -> {}", old.display(), new.display());
        Ok(())
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        self.writable()?;
        let _guard = self.write_lock.lock();
        self.file(path)?;
        self.delete(path)
    }

    fn create(&self, path: &Path, _mode: u32, _flags: i32) -> FsResult<u64> {
        self.writable()?;
        let _guard = self.write_lock.lock();
        self.insert(path, false)?;
        Ok(self.next_fh.fetch_add(1, Ordering::Relaxed))
    }

    fn open(&self, path: &Path, _flags: i32) -> FsResult<u64> {
        self.file(path)?;
        Ok(self.next_fh.fetch_add(1, Ordering::Relaxed))
    }

    fn read(&self, path: &Path, size: u32, offset: u64, _fh: u64) -> FsResult<Vec<u8>> {
        let row = self.file(path)?;
        let data = row.blob("data").unwrap_or(&[]);
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        trace!("read {} [{}..{}]", path.display(), start, end);
        Ok(data[start..end].to_vec())
    }

    fn write(&self, path: &Path, data: &[u8], offset: u64, _fh: u64) -> FsResult<usize> {
        self.writable()?;
        let _guard = self.write_lock.lock();
        let row = self.file(path)?;
        let mut content = row.blob("data").map(<[u8]>::to_vec).unwrap_or_default();
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or(FsError::Os(libc::EFBIG))?;
        let (offset, end) = (offset as usize, end as usize);
        if content.len() < end {
            content.resize(end, 0);
        }
        content[offset..end].copy_from_slice(data);
        self.store_data(path, content)?;
        Ok(data.len())
    }

    fn truncate(&self, path: &Path, length: u64, _fh: Option<u64>) -> FsResult<()> {
        self.writable()?;
        if length > MAX_FILE_SIZE {
            return Err(FsError::Os(libc::EFBIG));
        }
        let _guard = self.write_lock.lock();
        let row = self.file(path)?;
        let mut content = row.blob("data").map(<[u8]>::to_vec).unwrap_or_default();
        content.resize(length as usize, 0);
        self.store_data(path, content)
    }
}

fn store_error(e: StoreError) -> FsError {
    error!("Metadata store error: {}", e);
    FsError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
}

fn is_root(path: &Path) -> bool {
    path.parent().is_none()
}

fn is_dir_row(row: &Row) -> bool {
    row.integer("is_dir").unwrap_or(0) != 0
}

fn parent_of(path: &Path) -> Option<PathBuf> {
    path.parent().map(Path::to_path_buf)
}

fn text_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn key(path: &Path) -> Value {
    Value::Text(text_key(path))
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo(limit: u64) -> DemoFs {
        let fs = DemoFs::new(Database::in_memory().unwrap(), limit);
        fs.prepare().unwrap();
        fs
    }

    fn names(fs: &DemoFs, dir: &str) -> Vec<String> {
        fs.readdir(Path::new(dir), 0)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    #[test]
    fn fresh_root_is_empty() {
        let fs = demo(10);
        assert!(fs.getattr(Path::new("/"), None).unwrap().is_dir);
        assert!(fs.readdir(Path::new("/"), 0).unwrap().is_empty());
        assert!(matches!(
            fs.getattr(Path::new("/missing"), None),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn write_read_and_truncate() {
        let fs = demo(10);
        let path = Path::new("/notes.txt");
        let fh = fs.create(path, 0o644, 0).unwrap();

        assert_eq!(fs.write(path, b"hello world", 0, fh).unwrap(), 11);
        assert_eq!(fs.write(path, b"W", 6, fh).unwrap(), 1);
        assert_eq!(fs.read(path, 100, 0, fh).unwrap(), b"hello World");
        assert_eq!(fs.read(path, 3, 6, fh).unwrap(), b"Wor");
        assert!(fs.read(path, 3, 100, fh).unwrap().is_empty());

        fs.truncate(path, 5, Some(fh)).unwrap();
        let stat = fs.getattr(path, None).unwrap();
        assert_eq!(stat.size, 5);
        assert_eq!(stat.blocks(), 1);
        assert_eq!(fs.read(path, 100, 0, fh).unwrap(), b"hello");
    }

    #[test]
    fn sparse_write_zero_fills() {
        let fs = demo(10);
        let path = Path::new("/sparse");
        fs.create(path, 0o644, 0).unwrap();
        fs.write(path, b"x", 3, 0).unwrap();
        assert_eq!(fs.read(path, 10, 0, 0).unwrap(), b"\0\0\0x");
    }

    #[test]
    fn directories_nest_and_must_be_empty_to_remove() {
        let fs = demo(10);
        fs.mkdir(Path::new("/docs"), 0o755).unwrap();
        fs.create(Path::new("/docs/a.txt"), 0o644, 0).unwrap();

        assert_eq!(names(&fs, "/"), vec!["docs"]);
        assert_eq!(names(&fs, "/docs"), vec!["a.txt"]);
        assert!(matches!(fs.rmdir(Path::new("/docs")), Err(FsError::NotEmpty)));
        assert!(matches!(
            fs.unlink(Path::new("/docs")),
            Err(FsError::IsADirectory)
        ));
        assert!(matches!(
            fs.create(Path::new("/nope/a.txt"), 0o644, 0),
            Err(FsError::NotFound)
        ));

        fs.unlink(Path::new("/docs/a.txt")).unwrap();
        fs.rmdir(Path::new("/docs")).unwrap();
        assert!(names(&fs, "/").is_empty());
    }

    #[test]
    fn limit_caps_entries() {
        let fs = demo(2);
        fs.create(Path::new("/a"), 0o644, 0).unwrap();
        fs.mkdir(Path::new("/b"), 0o755).unwrap();
        let err = fs.create(Path::new("/c"), 0o644, 0).unwrap_err();
        assert_eq!(err.errno(), libc::ENOSPC);

        let stat = fs.statfs(Path::new("/")).unwrap();
        assert_eq!(stat.files, 2);
        assert_eq!(stat.ffree, 0);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let fs = demo(10);
        fs.create(Path::new("/a"), 0o644, 0).unwrap();
        assert!(matches!(
            fs.create(Path::new("/a"), 0o644, 0),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn rename_moves_subtree() {
        let fs = demo(10);
        fs.mkdir(Path::new("/docs"), 0o755).unwrap();
        fs.mkdir(Path::new("/docs/sub"), 0o755).unwrap();
        fs.create(Path::new("/docs/sub/a.txt"), 0o644, 0).unwrap();
        fs.write(Path::new("/docs/sub/a.txt"), b"data", 0, 0).unwrap();
        fs.create(Path::new("/docs_other"), 0o644, 0).unwrap();

        fs.rename(Path::new("/docs"), Path::new("/archive")).unwrap();

        assert_eq!(names(&fs, "/"), vec!["archive", "docs_other"]);
        assert_eq!(names(&fs, "/archive/sub"), vec!["a.txt"]);
        assert_eq!(
            fs.read(Path::new("/archive/sub/a.txt"), 10, 0, 0).unwrap(),
            b"data"
        );
        assert!(matches!(
            fs.getattr(Path::new("/docs"), None),
            Err(FsError::NotFound)
        ));
        assert_eq!(
            fs.rename(Path::new("/archive"), Path::new("/archive/sub/x"))
                .unwrap_err()
                .errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn rename_replaces_file() {
        let fs = demo(10);
        fs.create(Path::new("/a"), 0o644, 0).unwrap();
        fs.write(Path::new("/a"), b"new", 0, 0).unwrap();
        fs.create(Path::new("/b"), 0o644, 0).unwrap();

        fs.rename(Path::new("/a"), Path::new("/b")).unwrap();

        assert_eq!(names(&fs, "/"), vec!["b"]);
        assert_eq!(fs.read(Path::new("/b"), 10, 0, 0).unwrap(), b"new");
    }

    #[test]
    fn utimens_keeps_unset_times() {
        let fs = demo(10);
        let path = Path::new("/a");
        fs.create(path, 0o644, 0).unwrap();
        let before = fs.getattr(path, None).unwrap();

        let atime = cloudfs_fs::secs_to_time(1_000.0);
        fs.utimens(path, Some(atime), None).unwrap();

        let after = fs.getattr(path, None).unwrap();
        assert_eq!(time_to_secs(after.atime), 1_000.0);
        assert_eq!(after.mtime, before.mtime);
    }

    #[test]
    fn read_only_rejects_mutation() {
        let fs = DemoFs::new(Database::in_memory().unwrap(), 10).read_only(true);
        fs.prepare().unwrap();
        assert!(matches!(
            fs.create(Path::new("/a"), 0o644, 0),
            Err(FsError::ReadOnly)
        ));
        assert!(matches!(
            fs.mkdir(Path::new("/d"), 0o755),
            Err(FsError::ReadOnly)
        ));
        assert!(fs.readdir(Path::new("/"), 0).unwrap().is_empty());
    }

    #[test]
    fn oversized_files_are_refused() {
        let fs = demo(10);
        let path = Path::new("/big");
        let fh = fs.create(path, 0o644, 0).unwrap();

        assert!(matches!(
            fs.truncate(path, 1u64 << 46, None),
            Err(FsError::Os(libc::EFBIG))
        ));
        assert!(matches!(
            fs.write(path, b"x", MAX_FILE_SIZE, fh),
            Err(FsError::Os(libc::EFBIG))
        ));
        assert!(matches!(
            fs.write(path, b"x", u64::MAX, fh),
            Err(FsError::Os(libc::EFBIG))
        ));
        assert_eq!(fs.getattr(path, None).unwrap().size, 0);
    }
}
