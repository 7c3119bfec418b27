//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant except [`Io`](Self::Io) means the document itself is broken;
/// reading it again won't help.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes aren't a readable ZIP archive.
    #[display("not a valid EPUB archive")]
    InvalidArchive,
    /// `META-INF/container.xml` is absent.
    #[display("missing container descriptor")]
    MissingContainer,
    /// The container doesn't name a package document.
    #[display("container descriptor has no root file path")]
    MissingRootFilePath,
    /// The `mimetype` entry is absent or isn't the first entry in the archive.
    #[display("mimetype is not the first archive entry")]
    MimetypeNotFirst,
    /// The `mimetype` entry doesn't contain `application/epub+zip`.
    #[display("invalid mimetype")]
    InvalidMimetype,
    /// The package document named by the container is absent.
    #[display("missing package document: {_0}")]
    MissingPackage(#[error(not(source))] String),
    /// A descriptor isn't well-formed XML, or has the wrong root element.
    #[display("malformed {_0} XML")]
    MalformedXml(#[error(not(source))] &'static str),
    /// Reading an archive entry failed part-way.
    #[display("failed to read archive entry: {_0}")]
    Io(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
