//! Content-addressed snapshots of a library tree.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tome_catalog::Snapshot;
use tome_storage::file::Hashed;
use tome_storage::{BackendHandle, FileInfo};
use tracing::instrument;

/// A soft failure encountered while scanning. The rest of the tree is still
/// scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFailure {
    /// Part of the tree couldn't be listed; whatever it contains is missing
    /// from the snapshot. `path` is the directory (or entry) that failed, when
    /// the backend could tell.
    Listing { path: Option<PathBuf>, reason: String },
    /// A file was listed but couldn't be read.
    Read { path: PathBuf, reason: String },
    /// A file whose name isn't valid UTF-8. The catalog can't store it, so it
    /// is left out of the snapshot.
    UnsupportedName { path: PathBuf },
}
impl ScanFailure {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Listing { path, .. } => path.as_deref(),
            Self::Read { path, .. } | Self::UnsupportedName { path } => Some(path),
        }
    }

    /// Part of the tree whose current content is unknown because of this
    /// failure. Anything recorded under it last time still stands.
    pub fn unseen(&self) -> Option<&Path> {
        match self {
            Self::Listing { path, .. } => path.as_deref(),
            Self::Read { path, .. } => Some(path),
            Self::UnsupportedName { .. } => None,
        }
    }
}

/// Outcome of one scan: everything that could be hashed, and everything that
/// couldn't.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub snapshot: Snapshot,
    pub failures: Vec<ScanFailure>,
}
impl Scan {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Paths that were listed but couldn't be read.
    pub fn unreadable(&self) -> impl Iterator<Item = &Path> {
        self.failures.iter().filter_map(|failure| match failure {
            ScanFailure::Read { path, .. } => Some(path.as_path()),
            _ => None,
        })
    }
}

#[async_trait]
pub trait Snapshotter: Send + Sync {
    /// Hash every regular file in the library.
    ///
    /// Returns an error only if the library can't be enumerated at all (or
    /// the scan was cancelled); failures below the root are reported in
    /// [`Scan::failures`].
    async fn snapshot(&self, cancel: &CancellationToken) -> Result<Scan>;
}

/// [`Snapshotter`] reading files through a storage backend.
pub struct BackendSnapshotter {
    backend: BackendHandle,
    concurrency: usize,
}

impl BackendSnapshotter {
    pub fn new(backend: BackendHandle, concurrency: usize) -> Self {
        Self { backend, concurrency: concurrency.max(1) }
    }

    async fn hash(&self, file: FileInfo) -> std::result::Result<FileInfo<Hashed>, ScanFailure> {
        match self.backend.read(&file.path).await {
            Ok(data) => {
                let file = file.hashed(&data);
                tracing::debug!(path = %file.path.display(), hash = %file.hash, "hashed file");
                Ok(file)
            },
            Err(err) => Err(ScanFailure::Read { path: file.path.clone(), reason: err.to_string() }),
        }
    }
}

#[async_trait]
impl Snapshotter for BackendSnapshotter {
    #[instrument(skip_all, fields(backend = self.backend.name()))]
    async fn snapshot(&self, cancel: &CancellationToken) -> Result<Scan> {
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let mut failures = Vec::new();

        // Discovery first, so a root that vanished fails the scan before any
        // file is read.
        let mut files = Vec::new();
        let mut listing = self.backend.list_stream();
        while let Some(entry) = listing.next().await {
            match entry {
                Ok(file) if file.path.to_str().is_none() => {
                    tracing::warn!(path = %file.path.display(), "skipping file with non-UTF-8 name");
                    failures.push(ScanFailure::UnsupportedName { path: file.path.clone() });
                },
                Ok(file) => files.push(file),
                Err(err) if err.is_fatal() => return Err(err).or_raise(|| ErrorKind::Scan),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unlistable directory");
                    failures.push(ScanFailure::Listing { path: err.path().map(Path::to_path_buf), reason: err.to_string() });
                },
            }
        }
        drop(listing);
        tracing::debug!(files = files.len(), "discovery complete");

        let mut snapshot = Snapshot::new();
        let mut pending = files.into_iter();
        let mut processing = FuturesUnordered::new();
        loop {
            while processing.len() < self.concurrency {
                let Some(file) = pending.next() else {
                    break;
                };
                if cancel.is_cancelled() {
                    exn::bail!(ErrorKind::Cancelled);
                }
                processing.push(self.hash(file));
            }
            match processing.next().await {
                Some(Ok(file)) => {
                    let (path, hash) = file.into_entry();
                    snapshot.insert(path, hash);
                },
                Some(Err(failure)) => {
                    tracing::warn!(?failure, "skipping unreadable file");
                    failures.push(failure);
                },
                None => break,
            }
        }

        tracing::info!(files = snapshot.len(), failures = failures.len(), "scan complete");
        Ok(Scan { snapshot, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tome_catalog::ContentHash;
    use tome_storage::backend::{LocalBackend, MockBackend};

    fn snapshotter(backend: MockBackend) -> BackendSnapshotter {
        BackendSnapshotter::new(Arc::new(backend), 2)
    }

    #[tokio::test]
    async fn test_snapshot() {
        let scan = snapshotter(MockBackend::with_files([
            ("books/dune.epub", b"dune".to_vec()),
            ("comics/saga/01.cbz", b"saga".to_vec()),
            ("manga/akira/01.cbz", b"akira".to_vec()),
        ]))
        .snapshot(&CancellationToken::new())
        .await
        .unwrap();
        assert!(!scan.is_partial());
        let entries: Vec<_> = scan.snapshot.into_iter().collect();
        assert_eq!(
            entries,
            vec![
                (PathBuf::from("books/dune.epub"), ContentHash::of(b"dune")),
                (PathBuf::from("comics/saga/01.cbz"), ContentHash::of(b"saga")),
                (PathBuf::from("manga/akira/01.cbz"), ContentHash::of(b"akira")),
            ]
        );
    }

    #[tokio::test]
    async fn test_identical_content_hashes_identically() {
        let scan = snapshotter(MockBackend::with_files([("a/one.epub", b"same"), ("b/two.epub", b"same")]))
            .snapshot(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scan.snapshot.get("a/one.epub"), scan.snapshot.get("b/two.epub"));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_soft() {
        let backend = MockBackend::with_files([("books/a.epub", b"a"), ("books/b.epub", b"b")]);
        backend.fail_reads_for("books/b.epub").await;
        let scan = snapshotter(backend).snapshot(&CancellationToken::new()).await.unwrap();
        assert_eq!(scan.snapshot.len(), 1);
        assert!(scan.snapshot.contains("books/a.epub"));
        assert_eq!(scan.unreadable().collect::<Vec<_>>(), vec![Path::new("books/b.epub")]);
    }

    #[tokio::test]
    async fn test_unlistable_directory_is_soft() {
        let backend = MockBackend::with_files([("books/a.epub", b"a"), ("comics/b.cbz", b"b")]);
        backend.fail_listing_for("books").await;
        let scan = snapshotter(backend).snapshot(&CancellationToken::new()).await.unwrap();
        assert_eq!(scan.snapshot.paths().collect::<Vec<_>>(), vec![&PathBuf::from("comics/b.cbz")]);
        let [failure] = scan.failures.as_slice() else {
            panic!("expected one failure, got {:?}", scan.failures);
        };
        assert!(matches!(failure, ScanFailure::Listing { .. }));
        assert_eq!(failure.unseen(), Some(Path::new("books")));
        assert_eq!(scan.unreadable().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_is_soft() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let odd = Path::new("books").join(OsStr::from_bytes(b"caf\xe9.epub"));
        let backend =
            MockBackend::with_files([(odd.clone(), b"odd".to_vec()), (PathBuf::from("books/dune.epub"), b"dune".to_vec())]);
        let scan = snapshotter(backend).snapshot(&CancellationToken::new()).await.unwrap();
        assert_eq!(scan.snapshot.paths().collect::<Vec<_>>(), vec![&PathBuf::from("books/dune.epub")]);
        assert_eq!(scan.failures, vec![ScanFailure::UnsupportedName { path: odd }]);
        assert_eq!(scan.failures[0].unseen(), None);
    }

    #[tokio::test]
    async fn test_unavailable_root_is_fatal() {
        let err = snapshotter(MockBackend::default().with_unavailable_root())
            .snapshot(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Scan);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = snapshotter(MockBackend::with_files([("books/a.epub", b"a")])).snapshot(&cancel).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", dir.path()).unwrap();
        let scan = BackendSnapshotter::new(Arc::new(backend), 4).snapshot(&CancellationToken::new()).await.unwrap();
        assert_eq!(scan, Scan::default());
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", dir.path().join("gone")).unwrap();
        let err = BackendSnapshotter::new(Arc::new(backend), 4).snapshot(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Scan);
    }

    #[tokio::test]
    async fn test_directories_are_not_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("books/empty")).unwrap();
        std::fs::write(dir.path().join("books/dune.epub"), b"dune").unwrap();
        let backend = LocalBackend::new("local", dir.path()).unwrap();
        let scan = BackendSnapshotter::new(Arc::new(backend), 4).snapshot(&CancellationToken::new()).await.unwrap();
        assert_eq!(scan.snapshot.paths().collect::<Vec<_>>(), vec![&PathBuf::from("books/dune.epub")]);
    }
}
