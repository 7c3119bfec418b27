use super::{parse_uuid, sqlx_hates_paths};
use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use serde_json::{from_str as from_json, to_string as to_json};
use std::path::PathBuf;
use time::UtcDateTime;
use tome_catalog::{CatalogItem, ContentHash, ItemKind, ItemStatus};

#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) kind: String,
    pub(crate) subjects: String,
    pub(crate) languages: String,
    pub(crate) description: String,
    pub(crate) path: String,
    pub(crate) hash: String,
    #[sqlx(default)]
    pub(crate) deleted_at: Option<i64>,
    /// JSON array, only populated when reading (authors live in their own
    /// table).
    #[sqlx(default)]
    pub(crate) author_ids: Option<String>,
}
impl TryFrom<&CatalogItem> for ItemRow {
    type Error = Error;
    fn try_from(item: &CatalogItem) -> Result<Self, Self::Error> {
        Ok(Self {
            id: item.id.to_string(),
            title: item.title.clone(),
            kind: item.kind.to_string(),
            subjects: to_json(&item.subjects).or_raise(|| ErrorKind::InvalidData("subjects"))?,
            languages: to_json(&item.languages).or_raise(|| ErrorKind::InvalidData("languages"))?,
            description: item.description.clone(),
            path: sqlx_hates_paths(&item.path)?,
            hash: item.hash.to_string(),
            deleted_at: item.status.deleted_at().map(|at| at.unix_timestamp()),
            author_ids: None,
        })
    }
}
impl TryFrom<ItemRow> for CatalogItem {
    type Error = Error;
    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let author_ids = match row.author_ids {
            Some(json) => from_json::<Vec<String>>(&json)
                .or_raise(|| ErrorKind::InvalidData("author ids"))?
                .iter()
                .map(|id| parse_uuid(id, "author id"))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let status = match row.deleted_at {
            None => ItemStatus::Active,
            Some(at) => ItemStatus::Deleted {
                at: UtcDateTime::from_unix_timestamp(at).or_raise(|| ErrorKind::InvalidData("deletion date"))?,
            },
        };
        Ok(Self {
            id: parse_uuid(&row.id, "item id")?,
            title: row.title,
            kind: row.kind.parse::<ItemKind>().ok().ok_or_raise(|| ErrorKind::InvalidData("item kind"))?,
            author_ids,
            subjects: from_json(&row.subjects).or_raise(|| ErrorKind::InvalidData("subjects"))?,
            languages: from_json(&row.languages).or_raise(|| ErrorKind::InvalidData("languages"))?,
            description: row.description,
            path: PathBuf::from(row.path),
            hash: row.hash.parse::<ContentHash>().or_raise(|| ErrorKind::InvalidData("content hash"))?,
            status,
        })
    }
}
