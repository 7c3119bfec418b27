//! Raw contents of an EPUB package document (OPF), before any interpretation.

/// Root of the package document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    /// `version` attribute, e.g. `2.0` or `3.0`
    pub version: String,
    /// `unique-identifier` attribute: the `id` of the identifier that
    /// uniquely identifies this publication
    pub unique_identifier: String,
    pub metadata: PackageMetadata,
}

/// Dublin Core elements and `meta` properties of the `<metadata>` block.
///
/// Repeatable elements are kept in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub identifiers: Vec<Identifier>,
    pub titles: Vec<String>,
    pub languages: Vec<String>,
    pub creators: Vec<Contributor>,
    pub contributors: Vec<Contributor>,
    pub publishers: Vec<String>,
    pub subjects: Vec<String>,
    pub description: String,
    pub dates: Vec<String>,
    pub rights: String,
    pub meta: Vec<MetaProperty>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    pub value: String,
    /// EPUB 2 `opf:scheme`, e.g. `ISBN`
    pub scheme: String,
    pub id: String,
}

/// A `dc:creator` or `dc:contributor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contributor {
    pub name: String,
    pub id: String,
    /// EPUB 2 `opf:role`, e.g. `aut` or `ill`
    pub role: String,
}

/// `<meta>` element. EPUB 3 uses `property`/`refines` with text content; the
/// EPUB 2 `name`/`content` form is read into `property`/`value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaProperty {
    pub property: String,
    pub refines: String,
    pub id: String,
    pub value: String,
}
