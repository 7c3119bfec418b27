//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Failures can be
/// injected per file (reads), per directory (listing) or for the whole
/// backend.
///
/// # Examples
///
/// ```
/// use tome_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("books/dune.epub", b"spice"),
/// ]);
/// assert_eq!(backend.read(Path::new("books/dune.epub")).await?, b"spice");
///
/// backend.fail_reads_for("books/dune.epub").await;
/// assert!(backend.read(Path::new("books/dune.epub")).await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    unreadable: RwLock<HashSet<PathBuf>>,
    unlistable: RwLock<HashSet<PathBuf>>,
    root_unavailable: AtomicBool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // MockBackend is intended to be used in tests; a panic is the
                // error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            unreadable: RwLock::new(HashSet::new()),
            unlistable: RwLock::new(HashSet::new()),
            root_unavailable: AtomicBool::new(false),
        }
    }

    /// Make every listing fail as if the library root had disappeared.
    pub fn with_unavailable_root(self) -> Self {
        self.root_unavailable.store(true, Ordering::SeqCst);
        self
    }

    /// Make reads of `path` fail with a permission error. The file is still
    /// listed.
    pub async fn fail_reads_for(&self, path: impl AsRef<Path>) {
        let Ok(validated) = validate_path(path.as_ref()) else {
            panic!("MockBackend::fail_reads_for: invalid path {}", path.as_ref().display());
        };
        self.unreadable.write().await.insert(validated);
    }

    /// Make listing of directory `dir` fail. Nothing below it is listed, and
    /// the stream yields a single non-fatal
    /// [`UnlistableDirectory`](ErrorKind::UnlistableDirectory) in its place.
    pub async fn fail_listing_for(&self, dir: impl AsRef<Path>) {
        let Ok(validated) = validate_path(dir.as_ref()) else {
            panic!("MockBackend::fail_listing_for: invalid path {}", dir.as_ref().display());
        };
        self.unlistable.write().await.insert(validated);
    }

    fn file_info(&self, path: &Path, size: u64, inserted: UtcDateTime) -> FileInfo {
        FileInfo::new(path, size, inserted)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> FileInfoStream<'_> {
        if self.root_unavailable.load(Ordering::SeqCst) {
            let err = exn::Exn::from(ErrorKind::RootUnavailable(PathBuf::from(&self.name)));
            return Box::pin(futures::stream::once(async { Err(err) }));
        }

        Box::pin(stream! {
            // Snapshot entries under the read lock, then drop it before
            // yielding to avoid holding the lock across yield points.
            let unlistable: Vec<PathBuf> = self.unlistable.read().await.iter().cloned().collect();
            let entries: Vec<(PathBuf, (UtcDateTime, u64))> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| !unlistable.iter().any(|dir| path.starts_with(dir)))
                    .map(|(path, (inserted, data))| (path.clone(), (*inserted, data.len() as u64)))
                    .collect()
            };
            for dir in unlistable {
                yield Err(exn::Exn::from(ErrorKind::UnlistableDirectory(dir)));
            }
            for (path, (inserted, size)) in entries {
                yield Ok(self.file_info(&path, size, inserted));
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        if self.unreadable.read().await.contains(&path) {
            exn::bail!(ErrorKind::PermissionDenied(path));
        }
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn listed_paths(backend: &MockBackend) -> Vec<PathBuf> {
        let mut paths: Vec<_> = backend.list_stream().map(|item| item.unwrap().path.clone()).collect().await;
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn test_with_files() {
        let backend = MockBackend::with_files([
            ("books/dune.epub", Vec::from(*b"spice")),
            ("comics/saga/01.cbz", Vec::from(*b"panels")),
        ]);
        assert_eq!(listed_paths(&backend).await, vec![PathBuf::from("books/dune.epub"), PathBuf::from("comics/saga/01.cbz")]);
        assert_eq!(backend.read(Path::new("comics/saga/01.cbz")).await.unwrap(), b"panels");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let backend = MockBackend::with_files([("books/dune.epub", Vec::from(*b"spice"))]);
        backend.fail_reads_for("books/dune.epub").await;
        let err = backend.read(Path::new("books/dune.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        // Still listed.
        assert_eq!(listed_paths(&backend).await, vec![PathBuf::from("books/dune.epub")]);
    }

    #[tokio::test]
    async fn test_injected_listing_failure() {
        let backend = MockBackend::with_files([
            ("books/dune.epub", Vec::from(*b"spice")),
            ("books/herbert/children.epub", Vec::from(*b"spice")),
            ("booksellers.epub", Vec::from(*b"list")),
            ("comics/saga/01.cbz", Vec::from(*b"panels")),
        ]);
        backend.fail_listing_for("books").await;
        let items: Vec<_> = backend.list_stream().collect().await;

        let errors: Vec<_> = items.iter().filter_map(|i| i.as_ref().err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].is_fatal());
        assert_eq!(errors[0].path(), Some(Path::new("books")));

        let mut files: Vec<_> = items.iter().filter_map(|i| i.as_ref().ok()).map(|f| f.path.clone()).collect();
        files.sort();
        assert_eq!(files, vec![PathBuf::from("booksellers.epub"), PathBuf::from("comics/saga/01.cbz")]);
    }

    #[tokio::test]
    async fn test_unavailable_root() {
        let backend = MockBackend::with_files([("books/dune.epub", Vec::from(*b"spice"))]).with_unavailable_root();
        let items: Vec<_> = backend.list_stream().collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}
