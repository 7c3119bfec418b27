//! Catalog domain model for a tome library.
//!
//! The catalog tracks every document the library has ever seen, keyed by the
//! content hash of the file it was extracted from. The file tree itself is the
//! source of truth; a [`Snapshot`] records what the tree looked like the last
//! time it was reconciled, and [`compare`] works out what happened since.
//!
//! Persistence is reached only through the traits in [`repo`], so the
//! reconciliation engine can run against SQLite or the in-memory catalog
//! (feature `mock`) alike.

pub mod error;
#[cfg(feature = "mock")]
mod memory;
mod models;
pub mod repo;
mod snapshot;
pub mod validate;

#[cfg(feature = "mock")]
pub use crate::memory::{MemoryCatalog, Operation};
pub use crate::models::{Author, CatalogItem, ItemKind, ItemStatus};
pub use crate::repo::{AuthorRepo, CatalogItemRepo, Session, SnapshotRepo, Transaction};
pub use crate::snapshot::{Diff, FileChange, Snapshot, compare};
pub use tome_storage::ContentHash;
pub use uuid::Uuid;
