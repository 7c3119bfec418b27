pub(crate) const CONTAINER_PATH: &str = "META-INF/container.xml";
pub(crate) const MIMETYPE_PATH: &str = "mimetype";
pub(crate) const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";
pub(crate) const ISBN_SCHEME: &str = "isbn";
pub(crate) const ISBN_URN_PREFIX: &str = "urn:isbn:";
