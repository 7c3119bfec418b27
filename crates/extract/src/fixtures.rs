//! Builders for EPUB archives, well-formed or otherwise.

use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter, result::ZipResult};

pub const VALID_CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
   <rootfiles>
      <rootfile full-path="content.opf" media-type="application/oebps-package+xml"/>
   </rootfiles>
</container>"#;

/// Container descriptor pointing at `package_path`.
pub fn container(package_path: &str) -> String {
    VALID_CONTAINER.replace("content.opf", &escape(package_path))
}

/// ZIP archive with `entries` in the given order. `mimetype` is stored
/// uncompressed, everything else deflated, the way EPUB writers do it.
pub fn archive(entries: &[(&str, &[u8])]) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let method = match *name {
            "mimetype" => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        writer.start_file(*name, SimpleFileOptions::default().compression_method(method))?;
        writer.write_all(data)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Well-formed EPUB 3 with the given metadata. Repeatable fields (creators,
/// subjects and so on) are written in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct EpubBuilder {
    titles: Vec<String>,
    creators: Vec<String>,
    languages: Vec<String>,
    subjects: Vec<String>,
    publishers: Vec<String>,
    description: Option<String>,
    date: Option<String>,
    isbn: Option<String>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.titles.push(title.into());
        self
    }

    pub fn creator(mut self, name: impl Into<String>) -> Self {
        self.creators.push(name.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.languages.push(language.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.push(subject.into());
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publishers.push(publisher.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    /// The package document this builder would put in the archive.
    pub fn package_xml(&self) -> String {
        fn element(out: &mut String, name: &str, attrs: &str, value: &str) {
            out.push_str(&format!("    <dc:{name}{attrs}>{}</dc:{name}>\n", escape(value)));
        }
        let mut metadata = String::new();
        element(&mut metadata, "identifier", r#" id="uid""#, "urn:uuid:00000000-0000-7000-8000-000000000000");
        if let Some(isbn) = &self.isbn {
            element(&mut metadata, "identifier", r#" opf:scheme="ISBN""#, isbn);
        }
        for title in &self.titles {
            element(&mut metadata, "title", "", title);
        }
        for creator in &self.creators {
            element(&mut metadata, "creator", "", creator);
        }
        for language in &self.languages {
            element(&mut metadata, "language", "", language);
        }
        for subject in &self.subjects {
            element(&mut metadata, "subject", "", subject);
        }
        for publisher in &self.publishers {
            element(&mut metadata, "publisher", "", publisher);
        }
        if let Some(description) = &self.description {
            element(&mut metadata, "description", "", description);
        }
        if let Some(date) = &self.date {
            element(&mut metadata, "date", "", date);
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
{metadata}  </metadata>
</package>"#
        )
    }

    pub fn build(&self) -> ZipResult<Vec<u8>> {
        let package = self.package_xml();
        archive(&[
            ("mimetype", b"application/epub+zip".as_slice()),
            ("META-INF/container.xml", VALID_CONTAINER.as_bytes()),
            ("content.opf", package.as_bytes()),
        ])
    }
}
