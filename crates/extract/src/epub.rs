//! EPUB archive validation.

use crate::consts::{CONTAINER_PATH, EPUB_MIMETYPE, MIMETYPE_PATH};
use crate::error::{ErrorKind, Result};
use crate::models::Package;
use crate::opf;
use exn::ResultExt;
use std::io::{Read, Seek};
use tracing::instrument;
use zip::ZipArchive;
use zip::result::ZipError;

/// Read one archive entry completely.
///
/// `missing` is raised if the entry doesn't exist; anything else that goes
/// wrong while reading is an I/O error.
fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str, missing: ErrorKind) -> Result<Vec<u8>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => exn::bail!(missing),
        Err(err) => exn::bail!(ErrorKind::Io(err.to_string())),
    };
    let mut data = Vec::new();
    entry.read_to_end(&mut data).map_err(|e| ErrorKind::Io(e.to_string()))?;
    Ok(data)
}

fn text(data: Vec<u8>, context: &'static str) -> Result<String> {
    String::from_utf8(data).or_raise(|| ErrorKind::MalformedXml(context))
}

/// Validate an EPUB archive and parse its package document.
///
/// Checks run in a fixed order and the first failure is returned:
/// 1. the bytes are a ZIP archive ([`InvalidArchive`](ErrorKind::InvalidArchive)),
/// 2. `META-INF/container.xml` exists ([`MissingContainer`](ErrorKind::MissingContainer)),
/// 3. the container names a package document ([`MissingRootFilePath`](ErrorKind::MissingRootFilePath)),
/// 4. `mimetype` is the first entry ([`MimetypeNotFirst`](ErrorKind::MimetypeNotFirst))
///    and reads exactly `application/epub+zip` ([`InvalidMimetype`](ErrorKind::InvalidMimetype)),
/// 5. the package document exists ([`MissingPackage`](ErrorKind::MissingPackage)).
#[instrument(skip(reader))]
pub fn parse<R: Read + Seek>(reader: R) -> Result<Package> {
    let mut archive = ZipArchive::new(reader).or_raise(|| ErrorKind::InvalidArchive)?;

    let container = read_entry(&mut archive, CONTAINER_PATH, ErrorKind::MissingContainer)?;
    let package_path = opf::root_file_path(&text(container, "container")?)?;

    // "First" is physical: the local header of the mimetype entry has to
    // start the archive, so it can be sniffed without reading the directory.
    match archive.by_index_raw(0) {
        Ok(first) if first.name() == MIMETYPE_PATH && first.header_start() == 0 => {},
        _ => exn::bail!(ErrorKind::MimetypeNotFirst),
    }
    let mimetype = read_entry(&mut archive, MIMETYPE_PATH, ErrorKind::MimetypeNotFirst)?;
    if mimetype != EPUB_MIMETYPE {
        tracing::debug!(mimetype = %String::from_utf8_lossy(&mimetype), "unexpected mimetype");
        exn::bail!(ErrorKind::InvalidMimetype);
    }

    let package = read_entry(&mut archive, &package_path, ErrorKind::MissingPackage(package_path.clone()))?;
    opf::package(&text(package, "package")?)
}
