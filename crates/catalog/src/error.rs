//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Persistence implementations raise
//! their own error trees into these kinds.

use derive_more::{Display, Error};
use uuid::Uuid;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The persistence layer failed; the current transaction is unusable.
    #[display("catalog persistence error")]
    Persistence,
    /// An update referenced an item the catalog doesn't know about.
    #[display("catalog item not found: {_0}")]
    ItemNotFound(#[error(not(source))] Uuid),
    /// Stored data could not be turned back into a domain value.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence)
    }
}
