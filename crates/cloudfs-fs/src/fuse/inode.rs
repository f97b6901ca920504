use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Inode number of the mount root.
pub const ROOT_INO: u64 = 1;

/// Bidirectional mapping between kernel inode numbers and paths.
///
/// The capability contract is path-based while the kernel speaks inodes;
/// numbers are handed out on first sight of a path. An inode handed to the
/// kernel in an entry reply is dropped once the kernel forgets every lookup
/// of it. Numbers that only ever appeared in a directory listing carry no
/// kernel reference and stay until their path is removed.
#[derive(Debug)]
pub struct InodeTable {
    paths: HashMap<u64, PathBuf>,
    inodes: HashMap<PathBuf, u64>,
    lookups: HashMap<u64, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Create a table holding only the root.
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(ROOT_INO, root.clone());
        inodes.insert(root, ROOT_INO);
        Self {
            paths,
            inodes,
            lookups: HashMap::new(),
            next: ROOT_INO + 1,
        }
    }

    /// Path of an inode.
    pub fn path(&self, ino: u64) -> Option<&Path> {
        self.paths.get(&ino).map(PathBuf::as_path)
    }

    /// Inode of a path, allocating one if the path is new.
    pub fn ino(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_path_buf());
        self.inodes.insert(path.to_path_buf(), ino);
        ino
    }

    /// Inode of a path handed to the kernel, counting one lookup.
    pub fn lookup(&mut self, path: &Path) -> u64 {
        let ino = self.ino(path);
        *self.lookups.entry(ino).or_default() += 1;
        ino
    }

    /// Drop `nlookup` kernel references; the inode goes away at zero.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(count) = self.lookups.get_mut(&ino) else {
            return;
        };
        *count = count.saturating_sub(nlookup);
        if *count == 0 {
            self.lookups.remove(&ino);
            if let Some(path) = self.paths.remove(&ino) {
                self.inodes.remove(&path);
            }
        }
    }

    /// Path of `name` inside the directory `parent`.
    pub fn child(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|dir| dir.join(name))
    }

    /// Inode of the parent directory. The root is its own parent.
    pub fn parent(&mut self, ino: u64) -> u64 {
        let parent = self
            .path(ino)
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        match parent {
            Some(parent) => self.ino(&parent),
            None => ROOT_INO,
        }
    }

    /// Forget a path and everything below it.
    pub fn remove(&mut self, path: &Path) {
        let stale: Vec<PathBuf> = self
            .inodes
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in stale {
            if let Some(ino) = self.inodes.remove(&p) {
                self.paths.remove(&ino);
                self.lookups.remove(&ino);
            }
        }
    }

    /// Move a path and everything below it, keeping inode numbers.
    pub fn rename(&mut self, old: &Path, new: &Path) {
        self.remove(new);

        let moved: Vec<(PathBuf, u64)> = self
            .inodes
            .iter()
            .filter(|(p, _)| p.starts_with(old))
            .map(|(p, &ino)| (p.clone(), ino))
            .collect();
        for (path, ino) in moved {
            let renamed = match path.strip_prefix(old) {
                Ok(rest) if rest.as_os_str().is_empty() => new.to_path_buf(),
                Ok(rest) => new.join(rest),
                Err(_) => continue,
            };
            self.inodes.remove(&path);
            self.inodes.insert(renamed.clone(), ino);
            self.paths.insert(ino, renamed);
        }
    }

    /// Number of known inodes, root included.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the table is empty (never true, the root is permanent).
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_preallocated() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO), Some(Path::new("/")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn inodes_are_stable() {
        let mut table = InodeTable::new();
        let a = table.ino(Path::new("/a"));
        let b = table.ino(Path::new("/a/b"));
        assert_ne!(a, b);
        assert_eq!(table.ino(Path::new("/a")), a);
        assert_eq!(table.child(a, OsStr::new("b")).unwrap(), Path::new("/a/b"));
        assert_eq!(table.parent(b), a);
        assert_eq!(table.parent(a), ROOT_INO);
        assert_eq!(table.parent(ROOT_INO), ROOT_INO);
    }

    #[test]
    fn rename_moves_descendants() {
        let mut table = InodeTable::new();
        let dir = table.ino(Path::new("/docs"));
        let file = table.ino(Path::new("/docs/a.txt"));
        let sibling = table.ino(Path::new("/docsx"));

        table.rename(Path::new("/docs"), Path::new("/archive"));

        assert_eq!(table.path(dir), Some(Path::new("/archive")));
        assert_eq!(table.path(file), Some(Path::new("/archive/a.txt")));
        assert_eq!(table.path(sibling), Some(Path::new("/docsx")));
    }

    #[test]
    fn remove_forgets_subtree() {
        let mut table = InodeTable::new();
        let dir = table.ino(Path::new("/docs"));
        let file = table.ino(Path::new("/docs/a.txt"));

        table.remove(Path::new("/docs"));

        assert!(table.path(dir).is_none());
        assert!(table.path(file).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn forget_drops_inode_after_last_lookup() {
        let mut table = InodeTable::new();
        let file = table.lookup(Path::new("/a.txt"));
        assert_eq!(table.lookup(Path::new("/a.txt")), file);

        table.forget(file, 1);
        assert_eq!(table.path(file), Some(Path::new("/a.txt")));

        table.forget(file, 1);
        assert!(table.path(file).is_none());
        assert_eq!(table.len(), 1);

        table.forget(ROOT_INO, 10);
        assert_eq!(table.path(ROOT_INO), Some(Path::new("/")));
    }

    #[test]
    fn forget_ignores_listing_only_inodes() {
        let mut table = InodeTable::new();
        let listed = table.ino(Path::new("/listed"));
        table.forget(listed, 1);
        assert_eq!(table.path(listed), Some(Path::new("/listed")));
    }
}
