//! The set of roots a slave stores files in

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use silo_common::protocol::{DiskStatus, LightRemoteInode};
use tokio::sync::Semaphore;

use super::root::system_time_millis;
use super::selection::{Candidate, DiskSelection};
use super::{Root, RootError};

/// Collection-wide behavior switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RootOptions {
    /// Permit several roots on one filesystem
    pub allow_shared_mounts: bool,
    /// List roots in parallel rather than one after another
    pub concurrent_listing: bool,
    /// Parallel listing workers (0 = one per root, capped by CPU count)
    pub listing_workers: usize,
}

/// What one root holds for one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootListing {
    pub entries: Vec<LightRemoteInode>,
    /// Modification time of the directory in this root (ms since epoch)
    pub mtime: u64,
}

/// Merged view of one directory across every root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    /// Entries in name order; names clashing case-insensitively keep the first root's entry
    pub entries: Vec<LightRemoteInode>,
    /// Newest mtime of the directory across roots
    pub dir_mtime: u64,
}

/// Lists one directory of one root; `Ok(None)` when the root lacks it
pub type RootLister = Arc<dyn Fn(&Root, &Path) -> io::Result<Option<RootListing>> + Send + Sync>;

/// Validated set of roots with a placement strategy
#[derive(Debug)]
pub struct RootCollection {
    roots: Vec<Arc<Root>>,
    selection: Box<dyn DiskSelection>,
    options: RootOptions,
    listing_permits: Arc<Semaphore>,
}

impl RootCollection {
    /// Build from configured paths, creating missing root directories first
    pub fn from_paths(
        paths: &[PathBuf],
        selection: Box<dyn DiskSelection>,
        options: RootOptions,
    ) -> Result<Self, RootError> {
        let mut roots = Vec::with_capacity(paths.len());
        for path in paths {
            if !path.exists() {
                tracing::info!(root = %path.display(), "Creating missing root directory");
                fs::create_dir_all(path).map_err(|source| RootError::Unresolvable {
                    path: path.clone(),
                    source,
                })?;
            }
            roots.push(Root::new(path)?);
        }
        Self::new(roots, selection, options)
    }

    /// Validate and wrap already constructed roots
    pub fn new(
        roots: Vec<Root>,
        selection: Box<dyn DiskSelection>,
        options: RootOptions,
    ) -> Result<Self, RootError> {
        if roots.is_empty() {
            return Err(RootError::Empty);
        }
        validate_roots(&roots, options.allow_shared_mounts)?;

        let workers = if options.listing_workers > 0 {
            options.listing_workers
        } else {
            let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
            roots.len().min(cpus)
        };

        for root in &roots {
            tracing::info!(root = %root.path().display(), "Using root");
        }

        Ok(Self {
            roots: roots.into_iter().map(Arc::new).collect(),
            selection,
            options,
            listing_permits: Arc::new(Semaphore::new(workers)),
        })
    }

    /// All roots in configuration order
    pub fn roots(&self) -> impl Iterator<Item = &Root> {
        self.roots.iter().map(|root| &**root)
    }

    /// Number of roots
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Always false for a validated collection
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Name of the active placement strategy
    pub fn selection_name(&self) -> &'static str {
        self.selection.name()
    }

    /// Root a new file under `dir` should be written to
    ///
    /// Free space is measured for this call only.
    pub fn root_for_write(&self, dir: &Path) -> Result<&Root, RootError> {
        let candidates: Vec<Candidate<'_>> = self
            .roots()
            .map(|root| Candidate {
                root,
                available: root.disk_space_available(),
            })
            .collect();

        self.selection
            .select(&candidates, dir)
            .and_then(|index| candidates.get(index))
            .map(|candidate| candidate.root)
            .ok_or_else(|| RootError::NoAvailableRoot(dir.display().to_string()))
    }

    /// Every root currently holding `path`
    pub fn roots_for(&self, path: &Path) -> Vec<&Root> {
        self.roots().filter(|root| root.contains(path)).collect()
    }

    /// Absolute path of `path` in the first root holding it
    pub fn find_file(&self, path: &Path) -> Result<PathBuf, RootError> {
        self.roots()
            .find(|root| root.contains(path))
            .map(|root| root.file(path))
            .ok_or_else(|| RootError::NotFound(path.display().to_string()))
    }

    /// Whether any root holds `path`
    pub fn exists(&self, path: &Path) -> bool {
        self.roots().any(|root| root.contains(path))
    }

    /// Free and total space summed over all roots, measured now
    pub fn disk_status(&self) -> DiskStatus {
        self.roots().fold(
            DiskStatus {
                available: 0,
                capacity: 0,
            },
            |acc, root| DiskStatus {
                available: acc.available.saturating_add(root.disk_space_available()),
                capacity: acc.capacity.saturating_add(root.disk_space_capacity()),
            },
        )
    }

    /// Newest mtime of `path` across roots, `None` if no root holds it
    pub fn last_modified_for(&self, path: &Path) -> Option<u64> {
        self.roots()
            .filter_map(|root| fs::symlink_metadata(root.file(path)).ok())
            .filter_map(|metadata| metadata.modified().ok())
            .map(system_time_millis)
            .max()
    }

    /// Merged listing of `dir`, `None` when no root holds it
    pub async fn list_dir(&self, dir: &Path) -> io::Result<Option<DirListing>> {
        self.list_dir_with(dir, Arc::new(list_root)).await
    }

    /// Merged listing using a custom per-root lister
    pub async fn list_dir_with(
        &self,
        dir: &Path,
        lister: RootLister,
    ) -> io::Result<Option<DirListing>> {
        let results = if self.options.concurrent_listing && self.roots.len() > 1 {
            self.list_concurrently(dir, lister).await?
        } else {
            let roots = self.roots.clone();
            let dir = dir.to_path_buf();
            tokio::task::spawn_blocking(move || {
                roots
                    .iter()
                    .map(|root| lister(&**root, dir.as_path()))
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(io::Error::other)?
        };

        let mut listings = Vec::with_capacity(results.len());
        for result in results {
            if let Some(listing) = result? {
                listings.push(listing);
            }
        }

        if listings.is_empty() {
            return Ok(None);
        }
        Ok(Some(merge_listings(listings)))
    }

    /// One blocking task per root, bounded by the listing permits
    async fn list_concurrently(
        &self,
        dir: &Path,
        lister: RootLister,
    ) -> io::Result<Vec<io::Result<Option<RootListing>>>> {
        let tasks = self.roots.iter().map(|root| {
            let root = Arc::clone(root);
            let dir = dir.to_path_buf();
            let lister = Arc::clone(&lister);
            let permits = Arc::clone(&self.listing_permits);
            async move {
                let _permit = permits.acquire_owned().await.map_err(io::Error::other)?;
                tokio::task::spawn_blocking(move || lister(&*root, dir.as_path()))
                    .await
                    .map_err(io::Error::other)?
            }
        });

        Ok(join_all(tasks).await)
    }
}

/// Reject overlapping roots and, unless allowed, roots sharing a filesystem
fn validate_roots(roots: &[Root], allow_shared_mounts: bool) -> Result<(), RootError> {
    for (i, first) in roots.iter().enumerate() {
        for second in &roots[i + 1..] {
            if first.path().starts_with(second.path()) || second.path().starts_with(first.path())
            {
                return Err(RootError::Overlap {
                    first: first.path().to_path_buf(),
                    second: second.path().to_path_buf(),
                });
            }

            if !allow_shared_mounts
                && let (Some(a), Some(b)) = (first.device_id(), second.device_id())
                && a == b
            {
                return Err(RootError::SharedMount {
                    first: first.path().to_path_buf(),
                    second: second.path().to_path_buf(),
                });
            }
        }
    }
    Ok(())
}

/// Read one directory of one root
///
/// Symlinks are skipped; they are never reported to the master.
pub fn list_root(root: &Root, dir: &Path) -> io::Result<Option<RootListing>> {
    let path = root.file(dir);
    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) if metadata.is_dir() => metadata,
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(&path)? {
        let entry = entry?;
        let entry_metadata = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if entry_metadata.file_type().is_symlink() {
            tracing::warn!(path = %entry.path().display(), "Skipping symlink");
            continue;
        }

        let is_dir = entry_metadata.is_dir();
        entries.push(LightRemoteInode {
            name,
            is_dir,
            length: if is_dir { 0 } else { entry_metadata.len() },
            last_modified: entry_metadata.modified().map(system_time_millis).unwrap_or(0),
        });
    }

    Ok(Some(RootListing {
        entries,
        mtime: metadata.modified().map(system_time_millis).unwrap_or(0),
    }))
}

/// Merge per-root listings in root order
fn merge_listings(listings: Vec<RootListing>) -> DirListing {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut dir_mtime = 0;

    for listing in listings {
        dir_mtime = dir_mtime.max(listing.mtime);
        for entry in listing.entries {
            if seen.insert(entry.name.to_lowercase()) {
                entries.push(entry);
            }
        }
    }
    entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));

    DirListing {
        entries,
        dir_mtime,
    }
}
