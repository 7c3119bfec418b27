//! The reconciliation pass: scan, diff, extract, then apply everything to the
//! catalog in one transaction.

use crate::error::{ErrorKind, Result};
use crate::extract::{BackendExtractor, MetadataExtractor};
use crate::mapper;
use crate::snapshot::{BackendSnapshotter, Scan, ScanFailure, Snapshotter};
use derive_more::Display;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::UtcDateTime;
use tokio_util::sync::CancellationToken;
use tome_catalog::{CatalogItem, ContentHash, Diff, Session, Snapshot, compare};
use tome_config::SyncConfig;
use tome_storage::BackendHandle;
use tracing::instrument;

/// Stages of a pass, in the order they're entered.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[display("scanning")]
    Scanning,
    #[display("diffing")]
    Diffing,
    #[display("extracting")]
    Extracting,
    #[display("resolving authors")]
    ResolvingAuthors,
    #[display("persisting")]
    Persisting,
    #[display("committed")]
    Committed,
}

fn enter(phase: Phase) {
    tracing::info!(%phase, "entering phase");
}

/// Summary of one committed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Paths that appeared since the last pass.
    pub added: usize,
    /// Catalog items created for them.
    pub created: usize,
    /// Added paths left out of the catalog and of the recorded snapshot.
    pub skipped: Vec<PathBuf>,
    /// Catalog items repointed to a new path.
    pub moved: usize,
    /// Catalog items marked deleted.
    pub removed: usize,
    pub scan_failures: Vec<ScanFailure>,
}

enum Action<'a> {
    Move(&'a Path),
    Remove,
}

struct Record<'a> {
    hash: ContentHash,
    path: &'a Path,
    action: Action<'a>,
    claimed: bool,
}

/// Existing items changed by a diff, with their changes applied.
#[derive(Debug, Default)]
struct Updates {
    items: Vec<CatalogItem>,
    moved: usize,
    removed: usize,
}

/// Pair active catalog items with the moved and removed records of `diff`.
///
/// An item is matched on (hash, path) first. One that still has no record,
/// and whose path is gone from `snapshot`, is matched by hash alone when
/// exactly one unclaimed record carries that hash. Everything else is left
/// as it is.
fn plan_updates(fetched: Vec<CatalogItem>, diff: &Diff, snapshot: &Snapshot, now: UtcDateTime) -> Updates {
    let mut records: Vec<Record<'_>> = diff
        .moved
        .iter()
        .filter_map(|change| {
            let to = change.new_path.as_deref()?;
            Some(Record { hash: change.hash, path: &change.path, action: Action::Move(to), claimed: false })
        })
        .chain(diff.removed.iter().map(|change| Record {
            hash: change.hash,
            path: &change.path,
            action: Action::Remove,
            claimed: false,
        }))
        .collect();

    let mut assigned: Vec<Option<usize>> = vec![None; fetched.len()];
    for (item, slot) in fetched.iter().zip(assigned.iter_mut()) {
        if let Some(index) =
            records.iter().position(|r| !r.claimed && r.hash == item.hash && r.path == item.path.as_path())
        {
            records[index].claimed = true;
            *slot = Some(index);
        }
    }
    for (item, slot) in fetched.iter().zip(assigned.iter_mut()) {
        if slot.is_some() || snapshot.contains(&item.path) {
            continue;
        }
        let mut candidates = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.claimed && r.hash == item.hash)
            .map(|(index, _)| index);
        let (Some(index), None) = (candidates.next(), candidates.next()) else {
            continue;
        };
        tracing::debug!(id = %item.id, path = %item.path.display(), "matched catalog item by hash alone");
        records[index].claimed = true;
        *slot = Some(index);
    }

    let mut updates = Updates::default();
    for (mut item, slot) in fetched.into_iter().zip(assigned) {
        let Some(index) = slot else {
            tracing::debug!(id = %item.id, path = %item.path.display(), "no change record for catalog item");
            continue;
        };
        match records[index].action {
            Action::Move(to) => {
                tracing::debug!(id = %item.id, from = %item.path.display(), to = %to.display(), "moving catalog item");
                item.path = to.to_path_buf();
                updates.moved += 1;
            },
            Action::Remove => {
                tracing::debug!(id = %item.id, path = %item.path.display(), "deleting catalog item");
                item.mark_deleted(now);
                updates.removed += 1;
            },
        }
        updates.items.push(item);
    }
    updates
}

/// Brings the catalog in line with the library.
///
/// The file tree is the source of truth. Each pass compares it against the
/// snapshot recorded by the previous pass and applies the difference to the
/// catalog: new documents are extracted and created, removed ones are marked
/// deleted and moved ones are repointed. All catalog writes, including the
/// new snapshot, happen in a single transaction; if any of them fails the
/// catalog and the recorded snapshot stay exactly as they were.
pub struct Reconciler {
    snapshotter: Arc<dyn Snapshotter>,
    extractor: Arc<dyn MetadataExtractor>,
    session: Arc<dyn Session>,
}

impl Reconciler {
    pub fn new(snapshotter: Arc<dyn Snapshotter>, extractor: Arc<dyn MetadataExtractor>, session: Arc<dyn Session>) -> Self {
        Self { snapshotter, extractor, session }
    }

    /// Scan and extract through `backend`.
    pub fn from_backend(backend: BackendHandle, session: Arc<dyn Session>, config: &SyncConfig) -> Self {
        Self::new(
            Arc::new(BackendSnapshotter::new(Arc::clone(&backend), config.concurrency)),
            Arc::new(BackendExtractor::new(backend, config)),
            session,
        )
    }

    async fn load_snapshot(&self) -> Result<Snapshot> {
        let mut tx = self.session.begin().await.or_raise(|| ErrorKind::LoadSnapshot)?;
        let snapshot = tx.get_library_snapshot().await.or_raise(|| ErrorKind::LoadSnapshot)?;
        if let Err(err) = tx.rollback().await {
            tracing::warn!(error = ?err, "failed to end read-only transaction");
        }
        Ok(snapshot)
    }

    /// Run one pass.
    ///
    /// Cancellation is honoured until the catalog transaction begins; from
    /// then on the pass runs to commit or rollback.
    #[instrument(skip_all)]
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<Report> {
        enter(Phase::Scanning);
        let Scan { snapshot: mut current, failures } = self.snapshotter.snapshot(cancel).await?;
        let unreadable = failures.iter().any(|failure| !matches!(failure, ScanFailure::UnsupportedName { .. }));
        if current.is_empty() && unreadable {
            tracing::error!(failures = failures.len(), "nothing in the library could be read");
            exn::bail!(ErrorKind::Scan);
        }
        for failure in &failures {
            tracing::warn!(?failure, "scan incomplete");
        }

        let previous = self.load_snapshot().await?;
        // Whatever couldn't be listed or read this time isn't gone.
        let unseen: Vec<&Path> = failures.iter().filter_map(ScanFailure::unseen).collect();
        if !unseen.is_empty() {
            for (path, hash) in previous.iter() {
                if !current.contains(path) && unseen.iter().any(|scope| path.starts_with(scope)) {
                    tracing::debug!(path = %path.display(), "keeping previous hash of unseen file");
                    current.insert(path.clone(), *hash);
                }
            }
        }

        enter(Phase::Diffing);
        let diff = compare(&previous, &current);
        tracing::info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            moved = diff.moved.len(),
            "library changes",
        );

        enter(Phase::Extracting);
        let added: Vec<PathBuf> = diff.added_paths().map(Path::to_path_buf).collect();
        let extraction = self.extractor.extract(&added, cancel).await?;
        let names = mapper::unique_author_names(extraction.metadata.values());

        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let mut tx = self.session.begin().await.or_raise(|| ErrorKind::Transaction)?;

        enter(Phase::ResolvingAuthors);
        let authors = if names.is_empty() {
            Vec::new()
        } else {
            tx.get_or_create_authors(&names).await.or_raise(|| ErrorKind::ResolveAuthors)?
        };
        let mapping = mapper::build_items(&extraction.metadata, &authors, &current)?;

        enter(Phase::Persisting);
        let mut skipped: Vec<PathBuf> = extraction.unparseable;
        skipped.extend(mapping.skipped.into_iter().map(|skip| skip.path));
        skipped.sort();
        // Left out so the next pass sees them as added again.
        for path in &skipped {
            current.remove(path);
        }

        if !mapping.items.is_empty() {
            tx.create_library_items(&mapping.items).await.or_raise(|| ErrorKind::CreateItems)?;
        }

        let hashes: Vec<ContentHash> = diff.affected_hashes().into_iter().collect();
        let updates = if hashes.is_empty() {
            Updates::default()
        } else {
            let fetched = tx.get_library_items_by_hash(&hashes).await.or_raise(|| ErrorKind::FetchItems)?;
            plan_updates(fetched, &diff, &current, UtcDateTime::now())
        };
        if !updates.items.is_empty() {
            tx.update_library_items(&updates.items).await.or_raise(|| ErrorKind::UpdateItems)?;
        }

        tx.replace_snapshot(&current).await.or_raise(|| ErrorKind::ReplaceSnapshot)?;
        tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        enter(Phase::Committed);

        let report = Report {
            added: diff.added.len(),
            created: mapping.items.len(),
            skipped,
            moved: updates.moved,
            removed: updates.removed,
            scan_failures: failures,
        };
        tracing::info!(
            added = report.added,
            created = report.created,
            skipped = report.skipped.len(),
            moved = report.moved,
            removed = report.removed,
            scan_failures = report.scan_failures.len(),
            "reconciliation complete",
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeSet;
    use tome_cache::Database;
    use tome_catalog::{CatalogItemRepo, ItemKind, MemoryCatalog, Operation, SnapshotRepo};
    use tome_config::ExtractErrorPolicy;
    use tome_extract::fixtures::EpubBuilder;
    use tome_storage::backend::{LocalBackend, MockBackend};

    fn epub(title: &str, authors: &[&str]) -> Vec<u8> {
        authors
            .iter()
            .fold(EpubBuilder::new().title(title), |builder, author| builder.creator(*author))
            .build()
            .unwrap()
    }

    fn hash(bytes: &[u8]) -> ContentHash {
        ContentHash::of(bytes)
    }

    fn reconciler(backend: MockBackend, catalog: &MemoryCatalog, policy: ExtractErrorPolicy) -> Reconciler {
        let config = SyncConfig { concurrency: 2, on_extract_error: policy };
        Reconciler::from_backend(Arc::new(backend), Arc::new(catalog.clone()), &config)
    }

    /// Three cataloged files a, b and c. On disk, b has since been renamed
    /// to d, c deleted and e added.
    struct Scenario {
        catalog: MemoryCatalog,
        backend: BackendHandle,
        previous: Snapshot,
        items: Vec<CatalogItem>,
        a: Vec<u8>,
        b: Vec<u8>,
        c: Vec<u8>,
        e: Vec<u8>,
    }

    impl Scenario {
        fn new() -> Self {
            // Previously cataloged content isn't valid EPUB, so extraction
            // would fail loudly if it were attempted on anything but e.
            let (a, b, c) = (b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec());
            let e = epub("Epsilon", &["Eve Writer"]);
            let previous: Snapshot = [
                (PathBuf::from("books/a.epub"), hash(&a)),
                (PathBuf::from("books/b.epub"), hash(&b)),
                (PathBuf::from("books/c.epub"), hash(&c)),
            ]
            .into_iter()
            .collect();
            let items = vec![
                CatalogItem::new("Alpha", ItemKind::Book, "books/a.epub", hash(&a)),
                CatalogItem::new("Beta", ItemKind::Book, "books/b.epub", hash(&b)),
                CatalogItem::new("Gamma", ItemKind::Book, "books/c.epub", hash(&c)),
            ];
            let catalog = MemoryCatalog::default().with_snapshot(previous.clone()).with_items(items.clone());
            let backend = Arc::new(MockBackend::with_files([
                ("books/a.epub", a.clone()),
                ("books/d.epub", b.clone()),
                ("books/e.epub", e.clone()),
            ]));
            Self { catalog, backend, previous, items, a, b, c, e }
        }

        fn reconciler(&self) -> Reconciler {
            let config = SyncConfig { concurrency: 2, on_extract_error: ExtractErrorPolicy::Abort };
            Reconciler::from_backend(Arc::clone(&self.backend), Arc::new(self.catalog.clone()), &config)
        }
    }

    #[tokio::test]
    async fn test_reconcile() {
        let scenario = Scenario::new();
        let report = scenario.reconciler().reconcile(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            report,
            Report { added: 1, created: 1, skipped: vec![], moved: 1, removed: 1, scan_failures: vec![] }
        );

        let catalog = &scenario.catalog;
        assert_eq!(catalog.author_queries().await, vec![vec!["Eve Writer".to_string()]]);
        let queried: Vec<BTreeSet<ContentHash>> =
            catalog.hash_queries().await.into_iter().map(|hashes| hashes.into_iter().collect()).collect();
        assert_eq!(queried, vec![BTreeSet::from([hash(&scenario.b), hash(&scenario.c)])]);

        let expected: Snapshot = [
            (PathBuf::from("books/a.epub"), hash(&scenario.a)),
            (PathBuf::from("books/d.epub"), hash(&scenario.b)),
            (PathBuf::from("books/e.epub"), hash(&scenario.e)),
        ]
        .into_iter()
        .collect();
        assert_eq!(catalog.snapshot().await, expected);

        let items = catalog.items().await;
        let [a, c, d, e] = items.as_slice() else {
            panic!("expected four items, got {items:?}");
        };
        assert_eq!(a, &scenario.items[0]);
        assert_eq!(c.id, scenario.items[2].id);
        assert!(c.status.deleted_at().is_some());
        assert_eq!(c.path, Path::new("books/c.epub"));
        assert_eq!(d.id, scenario.items[1].id);
        assert_eq!(d.path, Path::new("books/d.epub"));
        assert!(d.is_active());
        assert_eq!(e.title, "Epsilon");
        assert_eq!(e.kind, ItemKind::Book);
        assert_eq!(e.hash, hash(&scenario.e));
        assert_eq!(e.author_ids, vec![catalog.authors().await[0].id]);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let scenario = Scenario::new();
        let reconciler = scenario.reconciler();
        reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        let items = scenario.catalog.items().await;
        let snapshot = scenario.catalog.snapshot().await;
        let before = scenario.catalog.calls().await.len();

        let report = reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        assert_eq!(report, Report::default());
        assert_eq!(scenario.catalog.items().await, items);
        assert_eq!(scenario.catalog.snapshot().await, snapshot);
        assert_eq!(
            scenario.catalog.calls().await[before..],
            [
                Operation::Begin,
                Operation::GetLibrarySnapshot,
                Operation::Rollback,
                Operation::Begin,
                Operation::ReplaceSnapshot,
                Operation::Commit,
            ]
        );
    }

    #[rstest]
    #[case(Operation::Begin, ErrorKind::LoadSnapshot)]
    #[case(Operation::GetLibrarySnapshot, ErrorKind::LoadSnapshot)]
    #[case(Operation::GetOrCreateAuthors, ErrorKind::ResolveAuthors)]
    #[case(Operation::CreateLibraryItems, ErrorKind::CreateItems)]
    #[case(Operation::GetLibraryItemsByHash, ErrorKind::FetchItems)]
    #[case(Operation::UpdateLibraryItems, ErrorKind::UpdateItems)]
    #[case(Operation::ReplaceSnapshot, ErrorKind::ReplaceSnapshot)]
    #[case(Operation::Commit, ErrorKind::Transaction)]
    #[tokio::test]
    async fn test_persistence_failure_changes_nothing(#[case] operation: Operation, #[case] expected: ErrorKind) {
        let scenario = Scenario::new();
        scenario.catalog.fail_on(operation).await;
        let err = scenario.reconciler().reconcile(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(*err, expected);
        assert!(err.is_retryable());
        assert_eq!(scenario.catalog.snapshot().await, scenario.previous);
        assert_eq!(scenario.catalog.items().await, scenario.items);
        assert!(scenario.catalog.authors().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_items_are_skipped() {
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::with_files([
            ("books/valid.epub", epub("The Left Hand of Darkness", &["Ursula K. Le Guin"])),
            ("books/untitled.epub", epub("X", &["Ursula K. Le Guin"])),
            ("comics/anonymous.epub", epub("Anonymous", &[])),
        ]);
        let reconciler = reconciler(backend, &catalog, ExtractErrorPolicy::Abort);

        let report = reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.added, 3);
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, vec![PathBuf::from("books/untitled.epub"), PathBuf::from("comics/anonymous.epub")]);
        let snapshot = catalog.snapshot().await;
        assert_eq!(snapshot.paths().collect::<Vec<_>>(), vec![&PathBuf::from("books/valid.epub")]);
        let items = catalog.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "The Left Hand of Darkness");

        // Skipped documents are retried on every pass.
        let report = reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.created, 0);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(catalog.items().await.len(), 1);
    }

    #[tokio::test]
    async fn test_authors_resolved_once() {
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::with_files([
            ("books/good-omens.epub", epub("Good Omens", &["Terry Pratchett", "Neil Gaiman"])),
            ("books/mort.epub", epub("Mort", &["Terry Pratchett"])),
            ("manga/sandman.epub", epub("The Sandman", &["Neil Gaiman"])),
        ]);
        let report = reconciler(backend, &catalog, ExtractErrorPolicy::Abort)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.created, 3);
        assert_eq!(
            catalog.author_queries().await,
            vec![vec!["Neil Gaiman".to_string(), "Terry Pratchett".to_string()]]
        );
        assert_eq!(catalog.authors().await.len(), 2);
        let items = catalog.items().await;
        assert_eq!(items[2].kind, ItemKind::Manga);
    }

    #[tokio::test]
    async fn test_broken_document_aborts_before_writing() {
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::with_files([
            ("books/broken.epub", b"not a zip".to_vec()),
            ("books/mort.epub", epub("Mort", &["Terry Pratchett"])),
        ]);
        let err = reconciler(backend, &catalog, ExtractErrorPolicy::Abort)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Extract);
        assert!(!err.is_retryable());
        assert_eq!(catalog.calls().await, vec![Operation::Begin, Operation::GetLibrarySnapshot, Operation::Rollback]);
        assert!(catalog.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_broken_document_skipped() {
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::with_files([
            ("books/broken.epub", b"not a zip".to_vec()),
            ("books/mort.epub", epub("Mort", &["Terry Pratchett"])),
            ("comics/saga.cbz", b"PK".to_vec()),
        ]);
        let report = reconciler(backend, &catalog, ExtractErrorPolicy::Skip)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, vec![PathBuf::from("books/broken.epub"), PathBuf::from("comics/saga.cbz")]);
        assert_eq!(catalog.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_root() {
        let catalog = MemoryCatalog::default();
        let err = reconciler(MockBackend::default().with_unavailable_root(), &catalog, ExtractErrorPolicy::Abort)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Scan);
        assert!(catalog.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_readable() {
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::with_files([("books/mort.epub", epub("Mort", &["Terry Pratchett"]))]);
        backend.fail_reads_for("books/mort.epub").await;
        let err = reconciler(backend, &catalog, ExtractErrorPolicy::Abort)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Scan);
        assert!(catalog.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_not_removed() {
        let scenario = Scenario::new();
        let backend = MockBackend::with_files([
            ("books/a.epub", scenario.a.clone()),
            ("books/b.epub", scenario.b.clone()),
            ("books/c.epub", scenario.c.clone()),
        ]);
        backend.fail_reads_for("books/c.epub").await;

        let report = reconciler(backend, &scenario.catalog, ExtractErrorPolicy::Abort)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.scan_failures.len(), 1);
        assert_eq!(report.scan_failures[0].path(), Some(Path::new("books/c.epub")));
        assert_eq!(scenario.catalog.snapshot().await, scenario.previous);
        assert_eq!(scenario.catalog.items().await, scenario.items);
    }

    #[tokio::test]
    async fn test_unlistable_directory_is_not_removed() {
        let scenario = Scenario::new();
        let akira = epub("Akira", &["Katsuhiro Otomo"]);
        let backend = MockBackend::with_files([
            ("books/a.epub", scenario.a.clone()),
            ("books/b.epub", scenario.b.clone()),
            ("manga/akira.epub", akira.clone()),
        ]);
        backend.fail_listing_for("books").await;

        let report = reconciler(backend, &scenario.catalog, ExtractErrorPolicy::Abort)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((report.added, report.created, report.moved, report.removed), (1, 1, 0, 0));
        assert_eq!(report.scan_failures.len(), 1);
        assert_eq!(report.scan_failures[0].unseen(), Some(Path::new("books")));

        // Everything recorded under books/ stands, c included.
        let mut expected = scenario.previous.clone();
        expected.insert("manga/akira.epub", hash(&akira));
        assert_eq!(scenario.catalog.snapshot().await, expected);
        let items = scenario.catalog.items().await;
        assert_eq!(items[..3], scenario.items[..]);
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(CatalogItem::is_active));
    }

    #[tokio::test]
    async fn test_listing_failure_of_a_sibling_prefix_does_not_shield() {
        let scenario = Scenario::new();
        let backend = MockBackend::with_files([
            ("books/a.epub", scenario.a.clone()),
            ("books/b.epub", scenario.b.clone()),
            ("booksellers/list.txt", b"list".to_vec()),
        ]);
        backend.fail_listing_for("booksellers").await;

        let report = reconciler(backend, &scenario.catalog, ExtractErrorPolicy::Abort)
            .reconcile(&CancellationToken::new())
            .await
            .unwrap();
        // Prefixes match whole components: books/c.epub isn't under booksellers/.
        assert_eq!(report.removed, 1);
        assert!(!scenario.catalog.snapshot().await.contains("books/c.epub"));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let scenario = Scenario::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = scenario.reconciler().reconcile(&cancel).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Cancelled);
        assert!(scenario.catalog.calls().await.is_empty());
        assert_eq!(scenario.catalog.snapshot().await, scenario.previous);
    }

    /// Cancels once extraction has finished, as a shutdown signal arriving
    /// mid-pass would.
    struct CancelAfterExtract {
        inner: Arc<dyn MetadataExtractor>,
        cancel: CancellationToken,
    }

    #[async_trait::async_trait]
    impl MetadataExtractor for CancelAfterExtract {
        async fn extract(&self, paths: &[PathBuf], cancel: &CancellationToken) -> Result<crate::Extraction> {
            let extraction = self.inner.extract(paths, cancel).await;
            self.cancel.cancel();
            extraction
        }
    }

    #[tokio::test]
    async fn test_cancelled_after_extraction() {
        let scenario = Scenario::new();
        let cancel = CancellationToken::new();
        let config = SyncConfig { concurrency: 2, on_extract_error: ExtractErrorPolicy::Abort };
        let extractor = CancelAfterExtract {
            inner: Arc::new(BackendExtractor::new(Arc::clone(&scenario.backend), &config)),
            cancel: cancel.clone(),
        };
        let reconciler = Reconciler::new(
            Arc::new(BackendSnapshotter::new(Arc::clone(&scenario.backend), 2)),
            Arc::new(extractor),
            Arc::new(scenario.catalog.clone()),
        );

        let err = reconciler.reconcile(&cancel).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Cancelled);
        // Only the read-only snapshot load; no write transaction was opened.
        assert_eq!(
            scenario.catalog.calls().await,
            vec![Operation::Begin, Operation::GetLibrarySnapshot, Operation::Rollback]
        );
        assert_eq!(scenario.catalog.snapshot().await, scenario.previous);
        assert_eq!(scenario.catalog.items().await, scenario.items);
        assert!(scenario.catalog.authors().await.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_non_utf8_name_does_not_block_sqlite() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("books")).unwrap();
        std::fs::write(root.join("books/earthsea.epub"), epub("A Wizard of Earthsea", &["Ursula K. Le Guin"])).unwrap();
        let odd = Path::new("books").join(OsStr::from_bytes(b"caf\xe9.epub"));
        std::fs::write(root.join(&odd), epub("Cafe", &["Someone Else"])).unwrap();

        let db = Database::connect_in_memory().await.unwrap();
        let backend: BackendHandle = Arc::new(LocalBackend::new("local", root).unwrap());
        let reconciler = Reconciler::from_backend(backend, Arc::new(db.session()), &SyncConfig::default());
        let cancel = CancellationToken::new();

        let report = reconciler.reconcile(&cancel).await.unwrap();
        assert_eq!((report.added, report.created), (1, 1));
        assert_eq!(report.scan_failures, vec![ScanFailure::UnsupportedName { path: odd.clone() }]);

        // Stays out of the snapshot, so later passes don't trip over it either.
        let report = reconciler.reconcile(&cancel).await.unwrap();
        assert_eq!((report.added, report.created, report.removed), (0, 0, 0));
        assert_eq!(report.scan_failures, vec![ScanFailure::UnsupportedName { path: odd }]);
    }

    #[tokio::test]
    async fn test_local_library_into_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("books")).unwrap();
        std::fs::create_dir_all(root.join("manga")).unwrap();
        std::fs::write(root.join("books/earthsea.epub"), epub("A Wizard of Earthsea", &["Ursula K. Le Guin"])).unwrap();
        let akira = epub("Akira", &["Katsuhiro Otomo"]);
        std::fs::write(root.join("manga/akira.epub"), &akira).unwrap();

        let db = Database::connect_in_memory().await.unwrap();
        let backend: BackendHandle = Arc::new(LocalBackend::new("local", root).unwrap());
        let reconciler = Reconciler::from_backend(backend, Arc::new(db.session()), &SyncConfig::default());
        let cancel = CancellationToken::new();

        let report = reconciler.reconcile(&cancel).await.unwrap();
        assert_eq!((report.added, report.created), (2, 2));

        std::fs::create_dir_all(root.join("books/le-guin")).unwrap();
        std::fs::rename(root.join("books/earthsea.epub"), root.join("books/le-guin/earthsea.epub")).unwrap();
        std::fs::remove_file(root.join("manga/akira.epub")).unwrap();
        let report = reconciler.reconcile(&cancel).await.unwrap();
        assert_eq!((report.added, report.created, report.moved, report.removed), (0, 0, 1, 1));

        let session = db.session();
        let mut tx = session.begin().await.unwrap();
        let snapshot = tx.get_library_snapshot().await.unwrap();
        let moved = PathBuf::from("books/le-guin/earthsea.epub");
        assert_eq!(snapshot.paths().collect::<Vec<_>>(), vec![&moved]);
        let Some(earthsea) = snapshot.get(&moved).copied() else {
            panic!("moved file missing from snapshot");
        };
        let items = tx.get_library_items_by_hash(&[earthsea]).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "A Wizard of Earthsea");
        assert_eq!(items[0].path, moved);
        let deleted = tx.get_library_items_by_hash(&[hash(&akira)]).await.unwrap();
        assert!(deleted.is_empty(), "deleted items are not active");
        drop(tx);

        assert_eq!(reconciler.reconcile(&cancel).await.unwrap(), Report::default());
    }

    #[test]
    fn test_duplicate_content_is_paired_by_path() {
        let h = hash(b"twin");
        let previous: Snapshot =
            [(PathBuf::from("a/one.epub"), h), (PathBuf::from("a/two.epub"), h)].into_iter().collect();
        let current: Snapshot =
            [(PathBuf::from("b/one.epub"), h), (PathBuf::from("a/two.epub"), h)].into_iter().collect();
        let diff = compare(&previous, &current);
        let one = CatalogItem::new("One", ItemKind::Book, "a/one.epub", h);
        let two = CatalogItem::new("Two", ItemKind::Book, "a/two.epub", h);

        let updates = plan_updates(vec![one.clone(), two], &diff, &current, UtcDateTime::now());
        assert_eq!((updates.moved, updates.removed), (1, 0));
        assert_eq!(updates.items.len(), 1);
        assert_eq!(updates.items[0].id, one.id);
        assert_eq!(updates.items[0].path, Path::new("b/one.epub"));
    }

    #[test]
    fn test_match_by_hash_alone() {
        // The catalog item's path drifted from the recorded snapshot.
        let h = hash(b"drift");
        let previous: Snapshot = [(PathBuf::from("books/recorded.epub"), h)].into_iter().collect();
        let current = Snapshot::new();
        let diff = compare(&previous, &current);
        let item = CatalogItem::new("Drift", ItemKind::Book, "books/elsewhere.epub", h);

        let now = UtcDateTime::now();
        let updates = plan_updates(vec![item.clone()], &diff, &current, now);
        assert_eq!(updates.removed, 1);
        assert_eq!(updates.items[0].id, item.id);
        assert_eq!(updates.items[0].status.deleted_at(), Some(now));
    }

    #[test]
    fn test_ambiguous_hash_is_left_alone() {
        let h = hash(b"twin");
        let previous: Snapshot =
            [(PathBuf::from("a/one.epub"), h), (PathBuf::from("a/two.epub"), h)].into_iter().collect();
        let current = Snapshot::new();
        let diff = compare(&previous, &current);
        let stray = CatalogItem::new("Stray", ItemKind::Book, "c/three.epub", h);

        let updates = plan_updates(vec![stray], &diff, &current, UtcDateTime::now());
        assert!(updates.items.is_empty());
    }
}
