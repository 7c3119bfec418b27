//! In-memory catalog for testing.

use crate::error::{ErrorKind, Result};
use crate::repo::{AuthorRepo, CatalogItemRepo, Session, SnapshotRepo, Transaction};
use crate::{Author, CatalogItem, ContentHash, Snapshot, Uuid};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Catalog operations that can be observed and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Begin,
    GetLibrarySnapshot,
    ReplaceSnapshot,
    GetOrCreateAuthors,
    CreateLibraryItems,
    GetLibraryItemsByHash,
    UpdateLibraryItems,
    Commit,
    Rollback,
}

#[derive(Debug, Clone, Default)]
struct State {
    snapshot: Snapshot,
    authors: Vec<Author>,
    items: BTreeMap<Uuid, CatalogItem>,
}

#[derive(Debug, Default)]
struct Control {
    failing: HashSet<Operation>,
    calls: Vec<Operation>,
    hash_queries: Vec<Vec<ContentHash>>,
    author_queries: Vec<Vec<String>>,
}

/// In-memory [`Session`] with the same transactional semantics as the
/// SQLite catalog: a transaction works on a private copy of the catalog that
/// only replaces the shared state on commit, and only one transaction is
/// open at a time.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the catalog through another.
///
/// # Examples
///
/// ```
/// use tome_catalog::{MemoryCatalog, Operation, Session, SnapshotRepo};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let catalog = MemoryCatalog::default();
/// catalog.fail_on(Operation::ReplaceSnapshot).await;
/// let mut tx = catalog.begin().await.unwrap();
/// assert!(tx.get_library_snapshot().await.unwrap().is_empty());
/// assert!(tx.replace_snapshot(&Default::default()).await.is_err());
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<State>>,
    control: Arc<Mutex<Control>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryCatalog {
    fn seed(&mut self) -> &mut State {
        match Arc::get_mut(&mut self.state) {
            Some(state) => state.get_mut(),
            // MemoryCatalog is intended to be used in tests; a panic is the
            // error result.
            None => panic!("MemoryCatalog: seed the catalog before cloning it"),
        }
    }

    /// Start from a previously recorded snapshot.
    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.seed().snapshot = snapshot;
        self
    }

    pub fn with_authors(mut self, authors: impl IntoIterator<Item = Author>) -> Self {
        self.seed().authors.extend(authors);
        self
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = CatalogItem>) -> Self {
        self.seed().items.extend(items.into_iter().map(|item| (item.id, item)));
        self
    }

    /// Make every future call of `operation` fail.
    pub async fn fail_on(&self, operation: Operation) {
        self.control.lock().await.failing.insert(operation);
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn authors(&self) -> Vec<Author> {
        self.state.lock().await.authors.clone()
    }

    /// Every item ever created, deleted ones included, ordered by path.
    pub async fn items(&self) -> Vec<CatalogItem> {
        let mut items: Vec<_> = self.state.lock().await.items.values().cloned().collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        items
    }

    /// Operations called so far, in order.
    pub async fn calls(&self) -> Vec<Operation> {
        self.control.lock().await.calls.clone()
    }

    /// Arguments of every [`get_library_items_by_hash`](CatalogItemRepo::get_library_items_by_hash) call.
    pub async fn hash_queries(&self) -> Vec<Vec<ContentHash>> {
        self.control.lock().await.hash_queries.clone()
    }

    /// Arguments of every [`get_or_create_authors`](AuthorRepo::get_or_create_authors) call.
    pub async fn author_queries(&self) -> Vec<Vec<String>> {
        self.control.lock().await.author_queries.clone()
    }
}

async fn record(control: &Mutex<Control>, operation: Operation) -> Result<()> {
    let mut control = control.lock().await;
    control.calls.push(operation);
    if control.failing.contains(&operation) {
        tracing::debug!(?operation, "injected catalog failure");
        exn::bail!(ErrorKind::Persistence);
    }
    Ok(())
}

#[async_trait]
impl Session for MemoryCatalog {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.writer.clone().lock_owned().await;
        record(&self.control, Operation::Begin).await?;
        let working = self.state.lock().await.clone();
        Ok(Box::new(MemoryTransaction {
            working,
            shared: Arc::clone(&self.state),
            control: Arc::clone(&self.control),
            _guard: guard,
        }))
    }
}

pub struct MemoryTransaction {
    working: State,
    shared: Arc<Mutex<State>>,
    control: Arc<Mutex<Control>>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl SnapshotRepo for MemoryTransaction {
    async fn get_library_snapshot(&mut self) -> Result<Snapshot> {
        record(&self.control, Operation::GetLibrarySnapshot).await?;
        Ok(self.working.snapshot.clone())
    }

    async fn replace_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        record(&self.control, Operation::ReplaceSnapshot).await?;
        self.working.snapshot = snapshot.clone();
        Ok(())
    }
}

#[async_trait]
impl AuthorRepo for MemoryTransaction {
    async fn get_or_create_authors(&mut self, names: &[String]) -> Result<Vec<Author>> {
        record(&self.control, Operation::GetOrCreateAuthors).await?;
        self.control.lock().await.author_queries.push(names.to_vec());
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let author = match self.working.authors.iter().find(|a| &a.name == name) {
                Some(existing) => existing.clone(),
                None => {
                    let created = Author::new(name.clone());
                    self.working.authors.push(created.clone());
                    created
                },
            };
            resolved.push(author);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl CatalogItemRepo for MemoryTransaction {
    async fn create_library_items(&mut self, items: &[CatalogItem]) -> Result<()> {
        record(&self.control, Operation::CreateLibraryItems).await?;
        for item in items {
            if self.working.items.contains_key(&item.id) {
                exn::bail!(ErrorKind::Persistence);
            }
            self.working.items.insert(item.id, item.clone());
        }
        Ok(())
    }

    async fn get_library_items_by_hash(&mut self, hashes: &[ContentHash]) -> Result<Vec<CatalogItem>> {
        record(&self.control, Operation::GetLibraryItemsByHash).await?;
        self.control.lock().await.hash_queries.push(hashes.to_vec());
        let wanted: HashSet<_> = hashes.iter().collect();
        let mut found: Vec<_> = self
            .working
            .items
            .values()
            .filter(|item| item.is_active() && wanted.contains(&item.hash))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    async fn update_library_items(&mut self, items: &[CatalogItem]) -> Result<()> {
        record(&self.control, Operation::UpdateLibraryItems).await?;
        for item in items {
            match self.working.items.get_mut(&item.id) {
                Some(existing) => *existing = item.clone(),
                None => exn::bail!(ErrorKind::ItemNotFound(item.id)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        record(&self.control, Operation::Commit).await?;
        let this = *self;
        *this.shared.lock().await = this.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        record(&self.control, Operation::Rollback).await
    }
}
