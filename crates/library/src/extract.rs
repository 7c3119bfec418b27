//! Metadata extraction for newly added documents.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tome_config::{ExtractErrorPolicy, SyncConfig};
use tome_extract::models::Metadata;
use tome_storage::BackendHandle;
use tracing::instrument;

/// Metadata for every document that could be parsed, and the paths of the
/// ones that couldn't.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub metadata: BTreeMap<PathBuf, Metadata>,
    /// Documents left out of [`metadata`](Self::metadata): unsupported formats,
    /// and broken documents when extraction errors are skipped.
    pub unparseable: Vec<PathBuf>,
}

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, paths: &[PathBuf], cancel: &CancellationToken) -> Result<Extraction>;
}

enum Outcome {
    Parsed(Metadata),
    Unsupported,
    Broken(tome_extract::error::Error),
}

/// Only EPUB carries metadata we can read; everything else is unsupported.
fn is_epub(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
}

/// [`MetadataExtractor`] reading documents through a storage backend.
pub struct BackendExtractor {
    backend: BackendHandle,
    concurrency: usize,
    policy: ExtractErrorPolicy,
}

impl BackendExtractor {
    pub fn new(backend: BackendHandle, config: &SyncConfig) -> Self {
        Self { backend, concurrency: config.concurrency.max(1), policy: config.on_extract_error }
    }

    async fn extract_one(&self, path: PathBuf) -> (PathBuf, Result<Outcome>) {
        if !is_epub(&path) {
            return (path, Ok(Outcome::Unsupported));
        }
        let outcome = match self.backend.read(&path).await.or_raise(|| ErrorKind::Extract) {
            Ok(bytes) => Ok(match tome_extract::extract(&bytes) {
                Ok(metadata) => Outcome::Parsed(metadata),
                Err(err) => Outcome::Broken(err),
            }),
            Err(err) => Err(err),
        };
        (path, outcome)
    }
}

#[async_trait]
impl MetadataExtractor for BackendExtractor {
    #[instrument(skip_all, fields(backend = self.backend.name(), documents = paths.len()))]
    async fn extract(&self, paths: &[PathBuf], cancel: &CancellationToken) -> Result<Extraction> {
        let mut extraction = Extraction::default();
        let mut pending = paths.iter().cloned();
        let mut processing = FuturesUnordered::new();
        loop {
            while processing.len() < self.concurrency {
                let Some(path) = pending.next() else {
                    break;
                };
                if cancel.is_cancelled() {
                    exn::bail!(ErrorKind::Cancelled);
                }
                processing.push(self.extract_one(path));
            }
            let Some((path, outcome)) = processing.next().await else {
                break;
            };
            match outcome? {
                Outcome::Parsed(metadata) => {
                    tracing::debug!(path = %path.display(), title = ?metadata.title, "extracted metadata");
                    extraction.metadata.insert(path, metadata);
                },
                Outcome::Unsupported => {
                    tracing::debug!(path = %path.display(), "no metadata extractor for this format");
                    extraction.unparseable.push(path);
                },
                Outcome::Broken(err) => match self.policy {
                    ExtractErrorPolicy::Abort => {
                        tracing::error!(path = %path.display(), error = %err, "unparseable document");
                        return Err(err).or_raise(|| ErrorKind::Extract);
                    },
                    ExtractErrorPolicy::Skip => {
                        tracing::warn!(path = %path.display(), error = %err, "skipping unparseable document");
                        extraction.unparseable.push(path);
                    },
                },
            }
        }
        extraction.unparseable.sort();
        Ok(extraction)
    }
}
