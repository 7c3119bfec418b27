//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for reading a library's file tree. The local filesystem backend
//! is the only production implementation; the mock backend exists for tests.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tome_storage::{ContentHash, backend::StorageBackend, error::Result};
///
/// async fn hash_of(backend: &dyn StorageBackend, path: &Path) -> Result<ContentHash> {
///     let data = backend.read(path).await?;
///     Ok(ContentHash::of(&data))
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Stream metadata for every file below the storage root.
    ///
    /// Yields regular files only; directories are descended into, never
    /// yielded. Errors are yielded in-band so a single unreadable directory
    /// doesn't hide the rest of the tree. A directory that can't be listed is
    /// reported as
    /// [`UnlistableDirectory`](crate::error::ErrorKind::UnlistableDirectory)
    /// carrying its relative path, so callers know which part of the tree went
    /// unseen. [`RootUnavailable`](crate::error::ErrorKind::RootUnavailable)
    /// is always the last item of the stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::StreamExt;
    /// # use tome_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream();
    /// while let Some(item) = stream.next().await {
    ///     match item {
    ///         Ok(info) => println!("{}: {} bytes", info.path.display(), info.size),
    ///         Err(err) if err.is_fatal() => return Err(err),
    ///         Err(err) => eprintln!("skipping: {err}"),
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream(&self) -> FileInfoStream<'_>;

    /// Read file contents.
    ///
    /// Returns the complete file contents as a [`Vec<u8>`].
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
}
