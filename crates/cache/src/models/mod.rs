mod author;
mod item;
mod snapshot;

pub(crate) use self::author::AuthorRow;
pub(crate) use self::item::ItemRow;
pub(crate) use self::snapshot::SnapshotRow;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use tome_catalog::Uuid;

pub(crate) fn sqlx_hates_paths(path: impl AsRef<Path>) -> Result<String> {
    Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
}

pub(crate) fn parse_uuid(value: &str, field: &'static str) -> Result<Uuid> {
    Uuid::parse_str(value).or_raise(|| ErrorKind::InvalidData(field))
}
