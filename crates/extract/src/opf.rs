//! XML parsing of the container descriptor and the package document.
//!
//! Elements are matched by local name so the `dc:`/`opf:` prefixes (or their
//! absence, which happens more than it should) don't matter.

use crate::error::{ErrorKind, Result};
use crate::models::{Contributor, Identifier, MetaProperty, Package, PackageMetadata};
use exn::ResultExt;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

/// Attributes of an element keyed by local name.
fn attributes(element: &BytesStart<'_>, context: &'static str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.or_raise(|| ErrorKind::MalformedXml(context))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().or_raise(|| ErrorKind::MalformedXml(context))?;
        map.insert(key, value.into_owned());
    }
    Ok(map)
}

/// The `full-path` of the first `rootfile` in `container.xml`.
pub(crate) fn root_file_path(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event().or_raise(|| ErrorKind::MalformedXml("container"))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                let path = attributes(&e, "container")?.remove("full-path").unwrap_or_default();
                let path = path.trim();
                if path.is_empty() {
                    exn::bail!(ErrorKind::MissingRootFilePath);
                }
                return Ok(path.to_string());
            },
            Event::Eof => exn::bail!(ErrorKind::MissingRootFilePath),
            _ => {},
        }
    }
}

/// Dublin Core element currently collecting text.
enum Field {
    Identifier(Identifier),
    Title,
    Language,
    Creator(Contributor),
    Contributor(Contributor),
    Publisher,
    Subject,
    Description,
    Date,
    Rights,
    Meta(MetaProperty),
}
impl Field {
    fn open(name: &[u8], attrs: HashMap<String, String>) -> Option<Self> {
        let mut attrs = attrs;
        let mut take = |key: &str| attrs.remove(key).unwrap_or_default();
        let field = match name {
            b"identifier" => Self::Identifier(Identifier { value: String::new(), scheme: take("scheme"), id: take("id") }),
            b"title" => Self::Title,
            b"language" => Self::Language,
            b"creator" => Self::Creator(Contributor { name: String::new(), id: take("id"), role: take("role") }),
            b"contributor" => Self::Contributor(Contributor { name: String::new(), id: take("id"), role: take("role") }),
            b"publisher" => Self::Publisher,
            b"subject" => Self::Subject,
            b"description" => Self::Description,
            b"date" => Self::Date,
            b"rights" => Self::Rights,
            b"meta" => {
                let (property, value) = match take("property") {
                    property if property.is_empty() => (take("name"), take("content")),
                    property => (property, String::new()),
                };
                Self::Meta(MetaProperty { property, refines: take("refines"), id: take("id"), value })
            },
            _ => return None,
        };
        Some(field)
    }

    fn close(self, text: String, md: &mut PackageMetadata) {
        match self {
            Self::Identifier(mut id) => {
                id.value = text;
                md.identifiers.push(id);
            },
            Self::Title => md.titles.push(text),
            Self::Language => md.languages.push(text),
            Self::Creator(mut c) => {
                c.name = text;
                md.creators.push(c);
            },
            Self::Contributor(mut c) => {
                c.name = text;
                md.contributors.push(c);
            },
            Self::Publisher => md.publishers.push(text),
            Self::Subject => md.subjects.push(text),
            Self::Description => md.description = text,
            Self::Date => md.dates.push(text),
            Self::Rights => md.rights = text,
            Self::Meta(mut meta) => {
                if meta.value.is_empty() {
                    meta.value = text;
                }
                md.meta.push(meta);
            },
        }
    }
}

fn root(element: &BytesStart<'_>) -> Result<Package> {
    let mut attrs = attributes(element, "package")?;
    Ok(Package {
        version: attrs.remove("version").unwrap_or_default(),
        unique_identifier: attrs.remove("unique-identifier").unwrap_or_default(),
        metadata: PackageMetadata::default(),
    })
}

/// Parse an OPF package document.
pub(crate) fn package(xml: &str) -> Result<Package> {
    const CONTEXT: &str = "package";
    let mut reader = Reader::from_str(xml);
    // Whitespace around nested markup is part of the field's text.
    reader.config_mut().trim_text(false);

    let mut package: Option<Package> = None;
    let mut in_metadata = false;
    // Open field and its text so far. Nested markup inside a field (it
    // happens in descriptions) contributes its text only.
    let mut current: Option<(Field, String, usize)> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().or_raise(|| ErrorKind::MalformedXml(CONTEXT))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                let name = e.local_name();
                match package.as_mut() {
                    None if name.as_ref() == b"package" => package = Some(self::root(&e)?),
                    None => exn::bail!(ErrorKind::MalformedXml(CONTEXT)),
                    Some(_) if depth == 2 && name.as_ref() == b"metadata" => in_metadata = true,
                    Some(_) if in_metadata && current.is_none() => {
                        if let Some(field) = Field::open(name.as_ref(), attributes(&e, CONTEXT)?) {
                            current = Some((field, String::new(), depth));
                        }
                    },
                    Some(_) => {},
                }
            },
            Event::Empty(e) => {
                let name = e.local_name();
                match package.as_mut() {
                    // Self-closing root: valid, but there's nothing in it.
                    None if name.as_ref() == b"package" => return self::root(&e),
                    None => exn::bail!(ErrorKind::MalformedXml(CONTEXT)),
                    Some(package) if in_metadata && current.is_none() => {
                        if let Some(field) = Field::open(name.as_ref(), attributes(&e, CONTEXT)?) {
                            field.close(String::new(), &mut package.metadata);
                        }
                    },
                    Some(_) => {},
                }
            },
            Event::Text(t) => {
                if let Some((_, text, _)) = current.as_mut() {
                    text.push_str(&t.unescape().or_raise(|| ErrorKind::MalformedXml(CONTEXT))?);
                }
            },
            Event::CData(c) => {
                if let Some((_, text, _)) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            },
            Event::End(_) => {
                let closes_field = matches!(&current, Some((_, _, opened_at)) if *opened_at == depth);
                if closes_field {
                    if let (Some((field, text, _)), Some(package)) = (current.take(), package.as_mut()) {
                        field.close(text.trim().to_string(), &mut package.metadata);
                    }
                } else if in_metadata && depth == 2 {
                    in_metadata = false;
                }
                depth = depth.saturating_sub(1);
            },
            Event::Eof => break,
            _ => {},
        }
    }

    package.ok_or_else(|| exn::Exn::from(ErrorKind::MalformedXml(CONTEXT)))
}
