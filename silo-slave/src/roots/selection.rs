//! Disk selection strategies
//!
//! A strategy picks the root a new file is written to. Strategies are
//! registered by name and resolved once at startup; the resulting box is
//! handed to the [`RootCollection`](super::RootCollection).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::{Root, RootError};

/// A root together with its free space, measured for one placement decision
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub root: &'a Root,
    pub available: u64,
}

/// Strategy mapping a target directory to the best root
pub trait DiskSelection: Send + Sync + fmt::Debug {
    /// Registered name of this strategy
    fn name(&self) -> &'static str;

    /// Index into `candidates` of the chosen root, or `None` if none is usable
    fn select(&self, candidates: &[Candidate<'_>], dir: &Path) -> Option<usize>;
}

/// Root with the most free space; roots with no space are never chosen
#[derive(Debug, Default, Clone, Copy)]
pub struct MostFree;

impl DiskSelection for MostFree {
    fn name(&self) -> &'static str {
        "mostfree"
    }

    fn select(&self, candidates: &[Candidate<'_>], _dir: &Path) -> Option<usize> {
        most_free(candidates.iter().enumerate())
    }
}

/// Prefer roots that already hold the target directory, then most free space
///
/// Keeps a release's files together on one disk where possible.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExistingDir;

impl DiskSelection for ExistingDir {
    fn name(&self) -> &'static str {
        "existingdir"
    }

    fn select(&self, candidates: &[Candidate<'_>], dir: &Path) -> Option<usize> {
        let holding = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.root.file(dir).is_dir());
        most_free(holding).or_else(|| most_free(candidates.iter().enumerate()))
    }
}

/// First candidate with the strictly largest non-zero free space
fn most_free<'a, 'r: 'a>(
    candidates: impl Iterator<Item = (usize, &'a Candidate<'r>)>,
) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (index, candidate) in candidates {
        if candidate.available == 0 {
            continue;
        }
        if best.is_none_or(|(_, space)| candidate.available > space) {
            best = Some((index, candidate.available));
        }
    }
    best.map(|(index, _)| index)
}

/// Builds a fresh strategy instance
pub type SelectionFactory = fn() -> Box<dyn DiskSelection>;

/// Name to factory table of disk selection strategies
pub struct SelectionRegistry {
    factories: HashMap<&'static str, SelectionFactory>,
}

impl SelectionRegistry {
    /// Registry with no strategies
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the built-in strategies
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("mostfree", || Box::new(MostFree));
        registry.register("existingdir", || Box::new(ExistingDir));
        registry
    }

    /// Add or replace a strategy
    pub fn register(&mut self, name: &'static str, factory: SelectionFactory) {
        self.factories.insert(name, factory);
    }

    /// Instantiate the strategy registered under `name` (case-insensitive)
    pub fn create(&self, name: &str) -> Result<Box<dyn DiskSelection>, RootError> {
        let key = name.to_ascii_lowercase();
        self.factories
            .get(key.as_str())
            .map(|factory| factory())
            .ok_or_else(|| RootError::UnknownStrategy(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for SelectionRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn roots(count: usize) -> (Vec<TempDir>, Vec<Root>) {
        let dirs: Vec<TempDir> = (0..count).map(|_| TempDir::new().unwrap()).collect();
        let roots = dirs.iter().map(|d| Root::new(d.path()).unwrap()).collect();
        (dirs, roots)
    }

    fn candidates<'a>(roots: &'a [Root], space: &[u64]) -> Vec<Candidate<'a>> {
        roots
            .iter()
            .zip(space)
            .map(|(root, &available)| Candidate { root, available })
            .collect()
    }

    #[test]
    fn test_most_free_picks_largest() {
        let (_dirs, roots) = roots(3);
        let chosen = MostFree.select(&candidates(&roots, &[10, 30, 20]), Path::new("x"));
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_most_free_reevaluates_each_call() {
        let (_dirs, roots) = roots(2);
        assert_eq!(
            MostFree.select(&candidates(&roots, &[10, 5]), Path::new("x")),
            Some(0)
        );
        assert_eq!(
            MostFree.select(&candidates(&roots, &[10, 50]), Path::new("x")),
            Some(1)
        );
    }

    #[test]
    fn test_most_free_tie_keeps_first() {
        let (_dirs, roots) = roots(2);
        let chosen = MostFree.select(&candidates(&roots, &[7, 7]), Path::new("x"));
        assert_eq!(chosen, Some(0));
    }

    #[test]
    fn test_most_free_full_disks() {
        let (_dirs, roots) = roots(2);
        assert_eq!(
            MostFree.select(&candidates(&roots, &[0, 0]), Path::new("x")),
            None
        );
    }

    #[test]
    fn test_existing_dir_prefers_holder() {
        let (dirs, roots) = roots(2);
        std::fs::create_dir(dirs[0].path().join("release")).unwrap();

        let chosen = ExistingDir.select(&candidates(&roots, &[10, 100]), Path::new("release"));
        assert_eq!(chosen, Some(0));

        let chosen = ExistingDir.select(&candidates(&roots, &[10, 100]), Path::new("other"));
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_existing_dir_skips_full_holder() {
        let (dirs, roots) = roots(2);
        std::fs::create_dir(dirs[0].path().join("release")).unwrap();

        let chosen = ExistingDir.select(&candidates(&roots, &[0, 100]), Path::new("release"));
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_registry() {
        let registry = SelectionRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["existingdir", "mostfree"]);
        assert_eq!(registry.create("MostFree").unwrap().name(), "mostfree");
        assert!(matches!(
            registry.create("random"),
            Err(RootError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_registry_custom_strategy() {
        #[derive(Debug)]
        struct Last;
        impl DiskSelection for Last {
            fn name(&self) -> &'static str {
                "last"
            }
            fn select(&self, candidates: &[Candidate<'_>], _dir: &Path) -> Option<usize> {
                candidates.len().checked_sub(1)
            }
        }

        let mut registry = SelectionRegistry::empty();
        registry.register("last", || Box::new(Last));
        let (_dirs, roots) = roots(3);
        let strategy = registry.create("last").unwrap();
        assert_eq!(
            strategy.select(&candidates(&roots, &[1, 2, 3]), Path::new("x")),
            Some(2)
        );
    }
}
