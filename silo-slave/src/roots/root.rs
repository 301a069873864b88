//! A single storage root

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::RootError;

/// One independently mounted storage location
///
/// The path is canonical. Capacity figures are read from the filesystem on
/// every call; only the root's own mtime is cached, and `touch` refreshes it.
#[derive(Debug)]
pub struct Root {
    path: PathBuf,
    last_modified: AtomicU64,
}

impl Root {
    /// Resolve `path` to a canonical directory
    pub fn new(path: impl AsRef<Path>) -> Result<Self, RootError> {
        let requested = path.as_ref();
        let path = fs::canonicalize(requested).map_err(|source| RootError::Unresolvable {
            path: requested.to_path_buf(),
            source,
        })?;

        let metadata = fs::metadata(&path).map_err(|source| RootError::Unresolvable {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(RootError::NotADirectory(path));
        }

        let last_modified = metadata.modified().map(system_time_millis).unwrap_or(0);

        Ok(Self {
            path,
            last_modified: AtomicU64::new(last_modified),
        })
    }

    /// Canonical path of this root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes available to unprivileged writers
    pub fn disk_space_available(&self) -> u64 {
        fs2::available_space(&self.path).unwrap_or_else(|e| {
            tracing::warn!(root = %self.path.display(), error = %e, "Failed to query free space");
            0
        })
    }

    /// Total size of the filesystem holding this root
    pub fn disk_space_capacity(&self) -> u64 {
        fs2::total_space(&self.path).unwrap_or_else(|e| {
            tracing::warn!(root = %self.path.display(), error = %e, "Failed to query capacity");
            0
        })
    }

    /// Cached modification time in milliseconds since the epoch
    pub fn last_modified(&self) -> u64 {
        self.last_modified.load(Ordering::Relaxed)
    }

    /// Mark this root as just written to
    pub fn touch(&self) -> io::Result<()> {
        let now = SystemTime::now();
        self.last_modified
            .store(system_time_millis(now), Ordering::Relaxed);
        File::open(&self.path)?.set_modified(now)
    }

    /// Absolute location of a root-relative path
    pub fn file(&self, relative: &Path) -> PathBuf {
        self.path.join(relative)
    }

    /// Whether this root holds anything at `relative` (symlinks count)
    pub fn contains(&self, relative: &Path) -> bool {
        fs::symlink_metadata(self.file(relative)).is_ok()
    }

    /// Identifier of the filesystem holding this root
    #[cfg(unix)]
    pub fn device_id(&self) -> Option<u64> {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(&self.path).ok().map(|m| m.dev())
    }

    /// Identifier of the filesystem holding this root
    #[cfg(not(unix))]
    pub fn device_id(&self) -> Option<u64> {
        None
    }
}

impl PartialEq for Root {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Root {}

/// Milliseconds since the Unix epoch, clamped to zero for earlier times
pub fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_canonicalizes() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();

        let root = Root::new(temp.path().join("a").join("..").join("a")).unwrap();
        assert_eq!(root.path(), fs::canonicalize(temp.path().join("a")).unwrap());
    }

    #[test]
    fn test_new_rejects_missing_path() {
        let temp = TempDir::new().unwrap();
        let result = Root::new(temp.path().join("missing"));
        assert!(matches!(result, Err(RootError::Unresolvable { .. })));
    }

    #[test]
    fn test_new_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(Root::new(&file), Err(RootError::NotADirectory(_))));
    }

    #[test]
    fn test_capacity_is_live() {
        let temp = TempDir::new().unwrap();
        let root = Root::new(temp.path()).unwrap();
        assert!(root.disk_space_capacity() > 0);
        assert!(root.disk_space_capacity() >= root.disk_space_available());
    }

    #[test]
    fn test_touch_advances_mtime() {
        let temp = TempDir::new().unwrap();
        let root = Root::new(temp.path()).unwrap();
        let before = root.last_modified();
        std::thread::sleep(std::time::Duration::from_millis(5));
        root.touch().unwrap();
        assert!(root.last_modified() >= before);
        assert!(root.last_modified() > 0);
    }

    #[test]
    fn test_contains() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("dir/file.bin"), b"data").unwrap();

        let root = Root::new(temp.path()).unwrap();
        assert!(root.contains(Path::new("dir")));
        assert!(root.contains(Path::new("dir/file.bin")));
        assert!(!root.contains(Path::new("dir/other.bin")));
    }
}
