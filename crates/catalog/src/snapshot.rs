//! Library snapshots and the differ that compares them.

use crate::ContentHash;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Content-addressed picture of the library tree: every regular file's
/// relative path mapped to the hash of its bytes.
///
/// Iteration is ordered by path. An empty snapshot is valid and is what a
/// library that has never been reconciled looks like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(BTreeMap<PathBuf, ContentHash>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&ContentHash> {
        self.0.get(path.as_ref())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.0.contains_key(path.as_ref())
    }

    /// Record `path` with `hash`, returning the hash it previously had.
    pub fn insert(&mut self, path: impl Into<PathBuf>, hash: ContentHash) -> Option<ContentHash> {
        self.0.insert(path.into(), hash)
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<ContentHash> {
        self.0.remove(path.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &ContentHash)> {
        self.0.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.0.keys()
    }
}
impl FromIterator<(PathBuf, ContentHash)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (PathBuf, ContentHash)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
impl Extend<(PathBuf, ContentHash)> for Snapshot {
    fn extend<I: IntoIterator<Item = (PathBuf, ContentHash)>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}
impl IntoIterator for Snapshot {
    type Item = (PathBuf, ContentHash);
    type IntoIter = std::collections::btree_map::IntoIter<PathBuf, ContentHash>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
impl From<BTreeMap<PathBuf, ContentHash>> for Snapshot {
    fn from(map: BTreeMap<PathBuf, ContentHash>) -> Self {
        Self(map)
    }
}

/// One classified change between two snapshots.
///
/// `new_path` is only ever set for moves, where `path` is where the content
/// used to live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub hash: ContentHash,
    pub path: PathBuf,
    pub new_path: Option<PathBuf>,
}
impl FileChange {
    pub fn added(path: impl Into<PathBuf>, hash: ContentHash) -> Self {
        Self { hash, path: path.into(), new_path: None }
    }

    pub fn removed(path: impl Into<PathBuf>, hash: ContentHash) -> Self {
        Self { hash, path: path.into(), new_path: None }
    }

    pub fn moved(hash: ContentHash, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            hash,
            path: from.into(),
            new_path: Some(to.into()),
        }
    }
}

/// Result of [`compare`].
///
/// `added` and `removed` are ordered by path, `moved` by destination path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<FileChange>,
    pub removed: Vec<FileChange>,
    pub moved: Vec<FileChange>,
}
impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }

    pub fn added_paths(&self) -> impl Iterator<Item = &Path> {
        self.added.iter().map(|change| change.path.as_path())
    }

    /// Hashes of every catalog item this diff touches without creating it:
    /// the union of moved and removed hashes.
    ///
    /// With duplicate content the same hash can be both moved and removed
    /// (one copy renamed, another deleted); it's only listed once here.
    pub fn affected_hashes(&self) -> BTreeSet<ContentHash> {
        self.moved.iter().chain(self.removed.iter()).map(|change| change.hash).collect()
    }
}

/// Classify every path that differs between `old` and `new`.
///
/// A path that vanished from `old` and a path that appeared in `new` with the
/// same content hash are one move, not a delete and a create. When several
/// vanished and appeared paths share a hash, they're paired off in ascending
/// path order; whatever is left over on either side is a plain removal or
/// addition.
///
/// A path present in both snapshots never appears in the diff, even if its
/// content changed.
///
/// ```
/// use tome_catalog::{ContentHash, FileChange, Snapshot, compare};
///
/// let old: Snapshot = [("a.epub".into(), ContentHash::of(b"a"))].into_iter().collect();
/// let new: Snapshot = [("b.epub".into(), ContentHash::of(b"a"))].into_iter().collect();
/// let diff = compare(&old, &new);
/// assert_eq!(diff.moved, vec![FileChange::moved(ContentHash::of(b"a"), "a.epub", "b.epub")]);
/// assert!(diff.added.is_empty() && diff.removed.is_empty());
/// ```
pub fn compare(old: &Snapshot, new: &Snapshot) -> Diff {
    // Snapshots iterate in path order, so every queue is already sorted.
    let mut vanished: HashMap<ContentHash, VecDeque<&PathBuf>> = HashMap::new();
    for (path, hash) in old.iter() {
        if !new.contains(path) {
            vanished.entry(*hash).or_default().push_back(path);
        }
    }

    let mut diff = Diff::default();
    for (path, hash) in new.iter().filter(|(path, _)| !old.contains(path)) {
        match vanished.get_mut(hash).and_then(VecDeque::pop_front) {
            Some(from) => diff.moved.push(FileChange::moved(*hash, from.clone(), path.clone())),
            None => diff.added.push(FileChange::added(path.clone(), *hash)),
        }
    }

    diff.removed = vanished
        .into_iter()
        .flat_map(|(hash, paths)| paths.into_iter().map(move |path| FileChange::removed(path.clone(), hash)))
        .collect();
    diff.removed.sort_by(|a, b| a.path.cmp(&b.path));
    diff
}
