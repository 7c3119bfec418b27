//! Persistence interfaces for the catalog.
//!
//! Reconciliation only ever mutates the catalog inside a [`Transaction`]
//! obtained from a [`Session`]. A transaction is committed explicitly; if it's
//! dropped first (early return, `?`, panic) everything it did is rolled back.

use crate::error::Result;
use crate::{Author, CatalogItem, ContentHash, Snapshot};
use async_trait::async_trait;

#[async_trait]
pub trait SnapshotRepo: Send {
    /// The snapshot recorded by the last successful reconciliation, or an
    /// empty snapshot if there never was one.
    async fn get_library_snapshot(&mut self) -> Result<Snapshot>;

    /// Replace the recorded snapshot wholesale.
    async fn replace_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;
}

#[async_trait]
pub trait AuthorRepo: Send {
    /// Resolve every name to an author, creating the ones that don't exist
    /// yet. Idempotent by name: calling it twice with the same names returns
    /// the same identities.
    async fn get_or_create_authors(&mut self, names: &[String]) -> Result<Vec<Author>>;
}

#[async_trait]
pub trait CatalogItemRepo: Send {
    async fn create_library_items(&mut self, items: &[CatalogItem]) -> Result<()>;

    /// Active items whose content hash is any of `hashes`.
    async fn get_library_items_by_hash(&mut self, hashes: &[ContentHash]) -> Result<Vec<CatalogItem>>;

    /// Persist path and status changes of existing items.
    async fn update_library_items(&mut self, items: &[CatalogItem]) -> Result<()>;
}

/// All repositories, bound to one atomic unit of work.
#[async_trait]
pub trait Transaction: SnapshotRepo + AuthorRepo + CatalogItemRepo {
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Explicit rollback. Dropping the transaction has the same effect, this
    /// just makes it observable.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}
