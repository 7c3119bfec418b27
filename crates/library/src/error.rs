//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Every fatal variant names the
//! operation of a reconciliation pass that failed; the underlying storage,
//! extraction or catalog error is kept as its child.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The library tree couldn't be enumerated, or nothing in it could be read.
    #[display("scanning the library failed")]
    Scan,
    #[display("loading the previous snapshot failed")]
    LoadSnapshot,
    #[display("extracting metadata failed")]
    Extract,
    #[display("resolving authors failed")]
    ResolveAuthors,
    #[display("creating catalog items failed")]
    CreateItems,
    #[display("fetching catalog items by hash failed")]
    FetchItems,
    #[display("updating catalog items failed")]
    UpdateItems,
    #[display("replacing the snapshot failed")]
    ReplaceSnapshot,
    /// Beginning or committing the catalog transaction failed.
    #[display("catalog transaction failed")]
    Transaction,
    #[display("reconciliation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing is persisted by a failed pass, so any failure outside of the
    /// documents themselves is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Extract | Self::Cancelled)
    }
}
