//! Filesystem operations spanning every root
//!
//! A relative path may exist in several roots at once. Delete and rename act
//! on every copy; checksum, SFV, and ID3 reads use the first root holding it.
//! Everything here blocks, so async callers run it on the blocking pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use silo_common::CHECKSUM_BUFFER_SIZE;

use super::FileError;
use crate::roots::RootCollection;

/// Remove a file, symlink, or directory tree
///
/// Uses `symlink_metadata` so a symlink is removed rather than its target.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() && !meta.file_type().is_symlink() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Remove empty directories above `path`, stopping at `root`
pub fn prune_empty_parents(root: &Path, path: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // fails once a directory still has entries
        if fs::remove_dir(dir).is_err() {
            break;
        }
        tracing::debug!(dir = %dir.display(), "Removed empty directory");
        current = dir.parent();
    }
}

/// Delete `relative` from every root that holds it
pub fn delete(roots: &RootCollection, relative: &Path) -> Result<(), FileError> {
    let holders = roots.roots_for(relative);
    if holders.is_empty() {
        return Err(FileError::NotFound(relative.display().to_string()));
    }

    for root in holders {
        let target = root.file(relative);
        remove_path(&target).map_err(|e| FileError::from_io(&target, e))?;
        tracing::debug!(path = %target.display(), "Deleted");
        prune_empty_parents(root.path(), &target);
    }
    Ok(())
}

/// Rename `from` to `to_dir/to_name` in every root that holds it
///
/// All destinations are checked before anything moves.
pub fn rename(
    roots: &RootCollection,
    from: &Path,
    to_dir: &Path,
    to_name: &str,
) -> Result<(), FileError> {
    let holders = roots.roots_for(from);
    if holders.is_empty() {
        return Err(FileError::NotFound(from.display().to_string()));
    }

    let to = to_dir.join(to_name);
    let moves: Vec<(PathBuf, PathBuf, PathBuf)> = holders
        .iter()
        .map(|root| (root.file(from), root.file(to_dir), root.file(&to)))
        .collect();

    for (_, _, dest) in &moves {
        if fs::symlink_metadata(dest).is_ok() {
            return Err(FileError::Exists(to.display().to_string()));
        }
    }

    for (source, dest_dir, dest) in moves {
        fs::create_dir_all(&dest_dir).map_err(|e| FileError::from_io(&dest_dir, e))?;
        fs::rename(&source, &dest).map_err(|e| FileError::from_io(&source, e))?;
        tracing::debug!(from = %source.display(), to = %dest.display(), "Renamed");
    }
    Ok(())
}

/// CRC32 of the whole file, read from the first root holding it
pub fn checksum(roots: &RootCollection, relative: &Path) -> Result<u32, FileError> {
    let path = roots
        .find_file(relative)
        .map_err(|_| FileError::NotFound(relative.display().to_string()))?;
    crc32_file(&path).map_err(|e| FileError::from_io(&path, e))
}

/// CRC32 of a file on disk
pub fn crc32_file(path: &Path) -> io::Result<u32> {
    use std::io::Read;

    let mut file = fs::File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHECKSUM_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roots::{MostFree, RootOptions};
    use silo_common::ErrorKind;
    use tempfile::TempDir;

    fn collection(dirs: &[&TempDir]) -> RootCollection {
        let paths: Vec<PathBuf> = dirs.iter().map(|d| d.path().to_path_buf()).collect();
        let options = RootOptions {
            allow_shared_mounts: true,
            ..RootOptions::default()
        };
        RootCollection::from_paths(&paths, Box::new(MostFree), options).unwrap()
    }

    fn write(root: &TempDir, relative: &str, data: &[u8]) {
        let path = root.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_remove_path_file_and_dir() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, b"x").unwrap();
        remove_path(&file).unwrap();
        assert!(!file.exists());

        let dir = temp.path().join("d/e");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("g"), b"y").unwrap();
        remove_path(&temp.path().join("d")).unwrap();
        assert!(!temp.path().join("d").exists());
    }

    #[test]
    fn test_delete_everywhere_and_prune() {
        let r1 = TempDir::new().unwrap();
        let r2 = TempDir::new().unwrap();
        write(&r1, "a/b/file.bin", b"1");
        write(&r2, "a/b/file.bin", b"2");
        write(&r2, "a/keep.txt", b"3");
        let roots = collection(&[&r1, &r2]);

        delete(&roots, Path::new("a/b/file.bin")).unwrap();

        assert!(!r1.path().join("a").exists());
        assert!(!r2.path().join("a/b").exists());
        assert!(r2.path().join("a/keep.txt").exists());
        assert!(r1.path().exists());
    }

    #[test]
    fn test_delete_directory_tree() {
        let r1 = TempDir::new().unwrap();
        write(&r1, "rel/CD1/x.mp3", b"1");
        write(&r1, "rel/x.nfo", b"2");
        let roots = collection(&[&r1]);

        delete(&roots, Path::new("rel")).unwrap();
        assert!(!r1.path().join("rel").exists());
    }

    #[test]
    fn test_delete_missing() {
        let r1 = TempDir::new().unwrap();
        let roots = collection(&[&r1]);
        let err = delete(&roots, Path::new("ghost")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_rename_in_every_root() {
        let r1 = TempDir::new().unwrap();
        let r2 = TempDir::new().unwrap();
        write(&r1, "in/a.bin", b"1");
        write(&r2, "in/a.bin", b"2");
        let roots = collection(&[&r1, &r2]);

        rename(&roots, Path::new("in/a.bin"), Path::new("out/new"), "b.bin").unwrap();

        assert_eq!(fs::read(r1.path().join("out/new/b.bin")).unwrap(), b"1");
        assert_eq!(fs::read(r2.path().join("out/new/b.bin")).unwrap(), b"2");
        assert!(!r1.path().join("in/a.bin").exists());
    }

    #[test]
    fn test_rename_onto_existing() {
        let r1 = TempDir::new().unwrap();
        let r2 = TempDir::new().unwrap();
        write(&r1, "a.bin", b"1");
        write(&r2, "a.bin", b"2");
        write(&r2, "b.bin", b"taken");
        let roots = collection(&[&r1, &r2]);

        let err = rename(&roots, Path::new("a.bin"), Path::new(""), "b.bin").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exists);
        // nothing moved
        assert!(r1.path().join("a.bin").exists());
        assert!(!r1.path().join("b.bin").exists());
    }

    #[test]
    fn test_rename_missing() {
        let r1 = TempDir::new().unwrap();
        let roots = collection(&[&r1]);
        let err = rename(&roots, Path::new("x"), Path::new(""), "y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_checksum() {
        let r1 = TempDir::new().unwrap();
        let data: Vec<u8> = (0..100_000u32).map(|i| (i * 7) as u8).collect();
        write(&r1, "c.bin", &data);
        write(&r1, "empty", b"");
        let roots = collection(&[&r1]);

        assert_eq!(
            checksum(&roots, Path::new("c.bin")).unwrap(),
            crc32fast::hash(&data)
        );
        assert_eq!(checksum(&roots, Path::new("empty")).unwrap(), 0);
        assert_eq!(
            checksum(&roots, Path::new("none")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
