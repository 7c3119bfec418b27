//! Validation rules for catalog entities.
//!
//! Each rule is a plain function so callers decide what a failure means:
//! during reconciliation an invalid candidate is skipped, not fatal.
//! Lengths are counted in characters, not bytes.

use crate::CatalogItem;
use derive_more::{Display, Error};
use std::ops::RangeInclusive;

pub const TITLE_LEN: RangeInclusive<usize> = 2..=150;
pub const DESCRIPTION_LEN: RangeInclusive<usize> = 2..=2000;
pub const AUTHOR_NAME_LEN: RangeInclusive<usize> = 2..=100;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[display("title is required")]
    MissingTitle,
    #[display("title must be {}..={} characters, got {_0}", TITLE_LEN.start(), TITLE_LEN.end())]
    TitleLength(#[error(not(source))] usize),
    #[display("at least one author is required")]
    NoAuthors,
    #[display("author name must be {}..={} characters, got {_0}", AUTHOR_NAME_LEN.start(), AUTHOR_NAME_LEN.end())]
    AuthorNameLength(#[error(not(source))] usize),
    #[display("description must be empty or {}..={} characters, got {_0}", DESCRIPTION_LEN.start(), DESCRIPTION_LEN.end())]
    DescriptionLength(#[error(not(source))] usize),
    #[display("subjects must not contain blank entries")]
    BlankSubject,
    #[display("languages must not contain blank entries")]
    BlankLanguage,
}

pub fn title(title: &str) -> Result<(), ValidationError> {
    let len = title.chars().count();
    match len {
        0 => Err(ValidationError::MissingTitle),
        _ if !TITLE_LEN.contains(&len) => Err(ValidationError::TitleLength(len)),
        _ => Ok(()),
    }
}

pub fn author_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if !AUTHOR_NAME_LEN.contains(&len) {
        return Err(ValidationError::AuthorNameLength(len));
    }
    Ok(())
}

/// Optional; only checked when present.
pub fn description(description: &str) -> Result<(), ValidationError> {
    let len = description.chars().count();
    if len != 0 && !DESCRIPTION_LEN.contains(&len) {
        return Err(ValidationError::DescriptionLength(len));
    }
    Ok(())
}

/// Every rule that applies to a catalog item, first failure wins.
pub fn item(item: &CatalogItem) -> Result<(), ValidationError> {
    title(&item.title)?;
    if item.author_ids.is_empty() {
        return Err(ValidationError::NoAuthors);
    }
    if item.subjects.iter().any(|s| s.trim().is_empty()) {
        return Err(ValidationError::BlankSubject);
    }
    if item.languages.iter().any(|l| l.trim().is_empty()) {
        return Err(ValidationError::BlankLanguage);
    }
    description(&item.description)
}
