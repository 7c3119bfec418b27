use super::sqlx_hates_paths;
use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tome_catalog::ContentHash;

#[derive(sqlx::FromRow)]
pub(crate) struct SnapshotRow {
    pub(crate) path: String,
    pub(crate) hash: String,
}
impl TryFrom<(&Path, &ContentHash)> for SnapshotRow {
    type Error = Error;
    fn try_from((path, hash): (&Path, &ContentHash)) -> Result<Self, Self::Error> {
        Ok(Self { path: sqlx_hates_paths(path)?, hash: hash.to_string() })
    }
}
impl TryFrom<SnapshotRow> for (PathBuf, ContentHash) {
    type Error = Error;
    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let hash = row.hash.parse::<ContentHash>().or_raise(|| ErrorKind::InvalidData("content hash"))?;
        Ok((PathBuf::from(row.path), hash))
    }
}
