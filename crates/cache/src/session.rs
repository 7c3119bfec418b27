//! SQLite implementation of the catalog persistence traits.

use crate::error::{ErrorKind, Result};
use crate::models::{AuthorRow, ItemRow, SnapshotRow};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::{Sqlite, SqlitePool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tome_catalog::error::{ErrorKind as CatalogErrorKind, Result as CatalogResult};
use tome_catalog::repo::{AuthorRepo, CatalogItemRepo, Session, SnapshotRepo, Transaction};
use tome_catalog::{Author, CatalogItem, ContentHash, Snapshot};

/// Hands out [`SqliteTransaction`]s, one at a time.
///
/// Obtained from [`Database::session`](crate::Database::session).
#[derive(Debug, Clone)]
pub struct SqliteSession {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteSession {
    pub(crate) fn new(pool: SqlitePool, writer: Arc<Mutex<()>>) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn begin(&self) -> CatalogResult<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .or_raise(|| ErrorKind::Database)
            .or_raise(|| CatalogErrorKind::Persistence)?;
        tracing::trace!("catalog transaction started");
        Ok(Box::new(SqliteTransaction { tx, _guard: guard }))
    }
}

/// One open database transaction, implementing every catalog repository.
///
/// Dropping it without calling [`commit`](Transaction::commit) rolls back.
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl SqliteTransaction {
    async fn load_snapshot(&mut self) -> Result<Snapshot> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(include_str!("../queries/get_library_snapshot.sql"))
            .fetch_all(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(<(PathBuf, ContentHash)>::try_from).collect()
    }

    async fn store_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(include_str!("../queries/clear_library_snapshot.sql"))
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for (path, hash) in snapshot.iter() {
            let row = SnapshotRow::try_from((path.as_path(), hash))?;
            sqlx::query(include_str!("../queries/insert_snapshot_entry.sql"))
                .bind(row.path)
                .bind(row.hash)
                .execute(&mut *self.tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(())
    }

    async fn resolve_author(&mut self, name: &str) -> Result<Author> {
        let candidate = AuthorRow::from(&Author::new(name));
        sqlx::query(include_str!("../queries/insert_author.sql"))
            .bind(&candidate.id)
            .bind(&candidate.name)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let row: Option<AuthorRow> = sqlx::query_as(include_str!("../queries/get_author_by_name.sql"))
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::InvalidData("author name"))?.try_into()
    }

    async fn insert_authorship(&mut self, item: &CatalogItem) -> Result<()> {
        for (position, author_id) in item.author_ids.iter().enumerate() {
            let position = i64::try_from(position).or_raise(|| ErrorKind::InvalidData("author position"))?;
            sqlx::query(include_str!("../queries/insert_item_author.sql"))
                .bind(item.id.to_string())
                .bind(author_id.to_string())
                .bind(position)
                .execute(&mut *self.tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(())
    }

    async fn insert_item(&mut self, item: &CatalogItem) -> Result<()> {
        let row = ItemRow::try_from(item)?;
        sqlx::query(include_str!("../queries/insert_library_item.sql"))
            .bind(row.id)
            .bind(row.title)
            .bind(row.kind)
            .bind(row.subjects)
            .bind(row.languages)
            .bind(row.description)
            .bind(row.path)
            .bind(row.hash)
            .bind(row.deleted_at)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        self.insert_authorship(item).await
    }

    async fn items_by_hash(&mut self, hashes: &[ContentHash]) -> Result<Vec<CatalogItem>> {
        let hashes = hashes.iter().map(ContentHash::to_string).collect::<Vec<_>>();
        let hashes = serde_json::to_string(&hashes).or_raise(|| ErrorKind::InvalidData("content hashes"))?;
        let rows: Vec<ItemRow> = sqlx::query_as(include_str!("../queries/get_library_items_by_hash.sql"))
            .bind(hashes)
            .fetch_all(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CatalogItem::try_from).collect()
    }

    /// Returns `false` if no item has the given identity.
    async fn update_item(&mut self, item: &CatalogItem) -> Result<bool> {
        let row = ItemRow::try_from(item)?;
        let updated = sqlx::query(include_str!("../queries/update_library_item.sql"))
            .bind(row.title)
            .bind(row.kind)
            .bind(row.subjects)
            .bind(row.languages)
            .bind(row.description)
            .bind(row.path)
            .bind(row.hash)
            .bind(row.deleted_at)
            .bind(&row.id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        if updated == 0 {
            return Ok(false);
        }
        sqlx::query(include_str!("../queries/clear_item_authors.sql"))
            .bind(&row.id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        self.insert_authorship(item).await?;
        Ok(true)
    }
}

#[async_trait]
impl SnapshotRepo for SqliteTransaction {
    async fn get_library_snapshot(&mut self) -> CatalogResult<Snapshot> {
        self.load_snapshot().await.or_raise(|| CatalogErrorKind::Persistence)
    }

    async fn replace_snapshot(&mut self, snapshot: &Snapshot) -> CatalogResult<()> {
        tracing::debug!(entries = snapshot.len(), "replacing library snapshot");
        self.store_snapshot(snapshot).await.or_raise(|| CatalogErrorKind::Persistence)
    }
}

#[async_trait]
impl AuthorRepo for SqliteTransaction {
    async fn get_or_create_authors(&mut self, names: &[String]) -> CatalogResult<Vec<Author>> {
        let mut authors = Vec::with_capacity(names.len());
        for name in names {
            authors.push(self.resolve_author(name).await.or_raise(|| CatalogErrorKind::Persistence)?);
        }
        Ok(authors)
    }
}

#[async_trait]
impl CatalogItemRepo for SqliteTransaction {
    async fn create_library_items(&mut self, items: &[CatalogItem]) -> CatalogResult<()> {
        for item in items {
            self.insert_item(item).await.or_raise(|| CatalogErrorKind::Persistence)?;
        }
        Ok(())
    }

    async fn get_library_items_by_hash(&mut self, hashes: &[ContentHash]) -> CatalogResult<Vec<CatalogItem>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        self.items_by_hash(hashes).await.or_raise(|| CatalogErrorKind::Persistence)
    }

    async fn update_library_items(&mut self, items: &[CatalogItem]) -> CatalogResult<()> {
        for item in items {
            if !self.update_item(item).await.or_raise(|| CatalogErrorKind::Persistence)? {
                exn::bail!(CatalogErrorKind::ItemNotFound(item.id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(self: Box<Self>) -> CatalogResult<()> {
        self.tx
            .commit()
            .await
            .or_raise(|| ErrorKind::Database)
            .or_raise(|| CatalogErrorKind::Persistence)?;
        tracing::trace!("catalog transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CatalogResult<()> {
        self.tx
            .rollback()
            .await
            .or_raise(|| ErrorKind::Database)
            .or_raise(|| CatalogErrorKind::Persistence)?;
        tracing::trace!("catalog transaction rolled back");
        Ok(())
    }
}
