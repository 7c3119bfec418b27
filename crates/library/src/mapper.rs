//! Turning extracted metadata into catalog items.

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use tome_catalog::validate::{self, ValidationError};
use tome_catalog::{Author, CatalogItem, ItemKind, Snapshot};
use tome_extract::models::Metadata;

/// A document that won't be cataloged this time around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: ValidationError,
}

/// Candidates for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    pub items: Vec<CatalogItem>,
    pub skipped: Vec<Skipped>,
}

/// Every usable author name across all extracted documents, once each, in
/// sorted order.
///
/// Names that fail validation are left out here; the documents crediting
/// them are skipped by [`build_items`].
pub fn unique_author_names<'a>(metadata: impl IntoIterator<Item = &'a Metadata>) -> Vec<String> {
    metadata
        .into_iter()
        .flat_map(|md| md.authors.iter())
        .filter(|name| validate::author_name(name).is_ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect()
}

/// Kind is decided by the top-level directory a document lives in.
pub fn infer_kind(path: &Path) -> ItemKind {
    let top = match path.components().next() {
        Some(Component::Normal(top)) => top.to_string_lossy().to_lowercase(),
        _ => return ItemKind::Book,
    };
    match top.as_str() {
        "comics" | "comic" => ItemKind::Comic,
        "manga" => ItemKind::Manga,
        _ => ItemKind::Book,
    }
}

fn candidate(
    path: &Path,
    metadata: &Metadata,
    authors: &HashMap<&str, &Author>,
    snapshot: &Snapshot,
) -> Result<std::result::Result<CatalogItem, ValidationError>> {
    let hash = *snapshot.get(path).ok_or_raise(|| ErrorKind::CreateItems)?;
    let mut author_ids = Vec::with_capacity(metadata.authors.len());
    for name in &metadata.authors {
        if let Err(invalid) = validate::author_name(name) {
            return Ok(Err(invalid));
        }
        author_ids.push(authors.get(name.as_str()).ok_or_raise(|| ErrorKind::ResolveAuthors)?.id);
    }
    let item = CatalogItem::new(metadata.title.clone().unwrap_or_default(), infer_kind(path), path, hash)
        .with_authors(author_ids)
        .with_subjects(metadata.subjects.iter().cloned())
        .with_languages(metadata.languages.iter().cloned())
        .with_description(metadata.description.clone().unwrap_or_default());
    Ok(validate::item(&item).map(|()| item))
}

/// Build one validated catalog item per extracted document.
///
/// `authors` must hold every name returned by [`unique_author_names`] for the
/// same metadata; `snapshot` supplies each document's content hash. An
/// invalid candidate is reported in [`Mapping::skipped`] instead of failing
/// the batch.
pub fn build_items(metadata: &BTreeMap<PathBuf, Metadata>, authors: &[Author], snapshot: &Snapshot) -> Result<Mapping> {
    let by_name: HashMap<&str, &Author> = authors.iter().map(|author| (author.name.as_str(), author)).collect();
    let mut mapping = Mapping::default();
    for (path, md) in metadata {
        match candidate(path, md, &by_name, snapshot)? {
            Ok(item) => mapping.items.push(item),
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "skipping invalid catalog item");
                mapping.skipped.push(Skipped { path: path.clone(), reason });
            },
        }
    }
    Ok(mapping)
}
