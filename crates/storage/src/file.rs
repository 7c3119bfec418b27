//! File metadata returned by storage backends, before and after hashing.

use crate::ContentHash;
use std::{ops::Deref, path::PathBuf};
use time::UtcDateTime;

// Typestate: a listed file only becomes part of a snapshot once its content
// has been hashed. Mixed collections have to deref to `FileMeta`.

/// File metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}

mod sealed {
    pub trait Sealed {}
}
pub trait HashState: sealed::Sealed {
    type Hash;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered;
impl sealed::Sealed for Discovered {}
impl HashState for Discovered {
    type Hash = ();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashed;
impl sealed::Sealed for Hashed {}
impl HashState for Hashed {
    type Hash = ContentHash;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo<S: HashState = Discovered> {
    meta: FileMeta,
    pub hash: S::Hash,
}
impl<S: HashState> Deref for FileInfo<S> {
    type Target = FileMeta;
    fn deref(&self) -> &FileMeta {
        &self.meta
    }
}

impl FileInfo {
    /// Create a new FileInfo from a listing operation (no hash yet).
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        FileMeta {
            path: path.into(),
            size,
            modified,
        }
        .into()
    }

    /// Hash the file's full contents, moving it into the [`Hashed`] state.
    pub fn hashed(self, data: &[u8]) -> FileInfo<Hashed> {
        FileInfo {
            meta: self.meta,
            hash: ContentHash::of(data),
        }
    }
}
impl FileInfo<Hashed> {
    pub fn into_entry(self) -> (PathBuf, ContentHash) {
        (self.meta.path, self.hash)
    }
}
impl From<FileMeta> for FileInfo<Discovered> {
    fn from(meta: FileMeta) -> Self {
        Self { meta, hash: () }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_keeps_metadata() {
        let now = UtcDateTime::now();
        let info = FileInfo::new("books/a.epub", 3, now).hashed(b"abc");
        assert_eq!(info.path, PathBuf::from("books/a.epub"));
        assert_eq!(info.size, 3);
        assert_eq!(info.modified, now);
        assert_eq!(info.hash, ContentHash::of(b"abc"));
        assert_eq!(info.into_entry(), (PathBuf::from("books/a.epub"), ContentHash::of(b"abc")));
    }
}
