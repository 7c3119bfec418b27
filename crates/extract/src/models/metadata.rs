use super::Package;
use crate::consts::{ISBN_SCHEME, ISBN_URN_PREFIX};

/// Bibliographic metadata of one document, not yet tied to any catalog
/// identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// First non-empty title
    pub title: Option<String>,
    /// Creators in credited order, without blanks or repeats
    pub authors: Vec<String>,
    pub publishers: Vec<String>,
    pub languages: Vec<String>,
    pub subjects: Vec<String>,
    pub description: Option<String>,
    /// First non-empty date, verbatim (EPUB dates are loosely formatted)
    pub date: Option<String>,
    pub isbn: Option<String>,
}

fn first_non_empty(values: &[String]) -> Option<String> {
    values.iter().map(|v| v.trim()).find(|v| !v.is_empty()).map(str::to_string)
}

fn non_empty(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string).collect()
}

impl From<&Package> for Metadata {
    fn from(package: &Package) -> Self {
        let md = &package.metadata;
        let mut authors: Vec<String> = Vec::with_capacity(md.creators.len());
        for name in md.creators.iter().map(|c| c.name.trim()).filter(|n| !n.is_empty()) {
            if !authors.iter().any(|a| a == name) {
                authors.push(name.to_string());
            }
        }
        let isbn = md.identifiers.iter().find_map(|id| {
            let value = id.value.trim();
            if id.scheme.eq_ignore_ascii_case(ISBN_SCHEME) && !value.is_empty() {
                return Some(value.to_string());
            }
            match value.get(..ISBN_URN_PREFIX.len()) {
                Some(prefix) if prefix.eq_ignore_ascii_case(ISBN_URN_PREFIX) => {
                    Some(value[ISBN_URN_PREFIX.len()..].to_string()).filter(|isbn| !isbn.is_empty())
                },
                _ => None,
            }
        });
        let description = md.description.trim();
        Self {
            title: first_non_empty(&md.titles),
            authors,
            publishers: non_empty(&md.publishers),
            languages: non_empty(&md.languages),
            subjects: non_empty(&md.subjects),
            description: (!description.is_empty()).then(|| description.to_string()),
            date: first_non_empty(&md.dates),
            isbn,
        }
    }
}
