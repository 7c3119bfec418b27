use crate::ContentHash;
use derive_more::Display;
use std::path::PathBuf;
use std::str::FromStr;
use time::UtcDateTime;
use uuid::Uuid;

/// What sort of document a catalog item is.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemKind {
    #[default]
    #[display("book")]
    Book,
    #[display("comic")]
    Comic,
    #[display("manga")]
    Manga,
}
impl FromStr for ItemKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "book" => Ok(Self::Book),
            "comic" => Ok(Self::Comic),
            "manga" => Ok(Self::Manga),
            _ => Err(()),
        }
    }
}

/// Items are never physically removed from the catalog; once their file
/// disappears they're marked deleted instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemStatus {
    #[default]
    Active,
    Deleted {
        at: UtcDateTime,
    },
}
impl ItemStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn deleted_at(&self) -> Option<UtcDateTime> {
        match self {
            Self::Active => None,
            Self::Deleted { at } => Some(*at),
        }
    }
}

/// Author, deduplicated by display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
}
impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7(), name: name.into() }
    }
}

/// A document tracked by the catalog.
///
/// Identity is the `id`; `hash` ties the item to the content it was extracted
/// from and `path` to where that content currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: Uuid,
    pub title: String,
    pub kind: ItemKind,
    /// Ordered as they were credited in the source document.
    pub author_ids: Vec<Uuid>,
    pub subjects: Vec<String>,
    pub languages: Vec<String>,
    pub description: String,
    pub path: PathBuf,
    pub hash: ContentHash,
    pub status: ItemStatus,
}
impl CatalogItem {
    /// New, active item with a freshly generated identity.
    pub fn new(title: impl Into<String>, kind: ItemKind, path: impl Into<PathBuf>, hash: ContentHash) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            kind,
            author_ids: Vec::new(),
            subjects: Vec::new(),
            languages: Vec::new(),
            description: String::new(),
            path: path.into(),
            hash,
            status: ItemStatus::Active,
        }
    }

    pub fn with_authors(mut self, author_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.author_ids = author_ids.into_iter().collect();
        self
    }

    pub fn with_subjects(mut self, subjects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subjects = subjects.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_languages(mut self, languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mark_deleted(&mut self, at: UtcDateTime) {
        self.status = ItemStatus::Deleted { at };
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
