use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// deduplicating set of filesystem paths
///
/// each member carries a "materialized" flag, set once the archive builder has
/// emitted an entry for it. inserting a path that is already present is a
/// no-op and never clears the flag. iteration is in sorted path order so the
/// archive layout is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSet {
    entries: BTreeMap<PathBuf, bool>,
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// add a path, returning true if it was not already present
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.entries.contains_key(&path) {
            return false;
        }
        self.entries.insert(path, false);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// whether an archive entry has already been written for this path
    pub fn is_materialized(&self, path: &Path) -> bool {
        self.entries.get(path).copied().unwrap_or(false)
    }

    /// flag a path as emitted, inserting it if needed
    pub fn mark_materialized(&mut self, path: impl Into<PathBuf>) {
        self.entries.insert(path.into(), true);
    }

    /// members not yet emitted, in sorted order
    pub fn pending(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, done)| !**done)
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: Into<PathBuf>> Extend<P> for PathSet {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        for path in iter {
            self.insert(path);
        }
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for PathSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut set = PathSet::new();
        set.extend(iter);
        set
    }
}
