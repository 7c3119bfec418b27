//! SQLite persistence for the tome catalog.
//!
//! The database is a cache of what reconciliation has worked out so far: the
//! last recorded [`Snapshot`](tome_catalog::Snapshot) of the library tree, the
//! catalog items extracted from it, and their authors. Everything is reached
//! through the [`tome_catalog::repo`] traits, inside a transaction obtained
//! from [`Database::session`].
//!
//! # Schema
//! - `library_snapshot`: path → content hash, replaced wholesale on every
//!   successful reconciliation.
//! - `library_items`: one row per catalog item, soft-deleted by setting
//!   `deleted_at`. Subjects and languages are JSON arrays.
//! - `authors` / `library_item_authors`: authors are unique by name and
//!   linked to items in credited order.

mod db;
pub mod error;
mod models;
mod session;

pub use crate::db::Database;
pub use crate::session::{SqliteSession, SqliteTransaction};
