mod consts;
mod epub;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod models;
mod opf;

use std::io::Cursor;
use tracing::instrument;

pub use crate::epub::parse;
use crate::error::Result;
use crate::models::Metadata;

/// Easy, top-level entrypoint for the extraction of [`Metadata`] from the raw
/// bytes of an EPUB file.
///
/// The archive is validated first (see [`parse`] for the order of checks),
/// then the package metadata is mapped down to the fields a catalog cares
/// about.
#[instrument(skip(bytes), fields(size = bytes.as_ref().len()))]
pub fn extract(bytes: impl AsRef<[u8]>) -> Result<Metadata> {
    let package = parse(Cursor::new(bytes.as_ref()))?;
    Ok(Metadata::from(&package))
}
