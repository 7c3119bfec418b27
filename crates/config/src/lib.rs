//! Layered configuration for tome.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults,
//! 2. an optional configuration file (TOML, YAML or JSON, chosen by
//!    extension),
//! 3. environment variables prefixed with `TOME_`, using `__` to separate
//!    nested keys (`TOME_SYNC__CONCURRENCY=4` sets `sync.concurrency`).
//!
//! ```toml
//! [library]
//! name = "shelf"
//! root = "/srv/library"
//!
//! [cache]
//! path = "/var/lib/tome/catalog.sqlite"
//!
//! [sync]
//! concurrency = 8
//! on_extract_error = "skip"
//! ```

pub mod error;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

pub const ENV_PREFIX: &str = "TOME_";
pub const DEFAULT_LIBRARY_NAME: &str = "library";
pub const DEFAULT_CONCURRENCY: usize = 16;
const CACHE_FILE_NAME: &str = "catalog.sqlite";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub library: LibraryConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Display name, used in logs.
    pub name: String,
    /// Absolute path of the directory holding the library's documents.
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Location of the SQLite catalog database.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on files read (hashed or parsed) at the same time.
    pub concurrency: usize,
    pub on_extract_error: ExtractErrorPolicy,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_CONCURRENCY, on_extract_error: ExtractErrorPolicy::default() }
    }
}

/// What a reconciliation pass does with a newly added document that can't be
/// parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractErrorPolicy {
    /// Fail the whole pass before anything is written.
    #[default]
    Abort,
    /// Leave the document out of the catalog (and out of the recorded
    /// snapshot, so it's retried next time).
    Skip,
}

/// Default location of the catalog database, in the platform's data
/// directory. `None` if there's no home directory to derive it from.
pub fn default_cache_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tome").map(|dirs| dirs.data_dir().join(CACHE_FILE_NAME))
}

impl Config {
    fn defaults() -> Figment {
        let figment = Figment::new()
            .merge(Serialized::default("library.name", DEFAULT_LIBRARY_NAME))
            .merge(Serialized::default("sync", SyncConfig::default()));
        match default_cache_path() {
            Some(path) => figment.merge(Serialized::default("cache.path", path)),
            None => figment,
        }
    }

    /// Build the layered configuration without validating it.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Self::defaults();
        if let Some(file) = file {
            if !file.is_file() {
                exn::bail!(ErrorKind::MissingFile(file.to_path_buf()));
            }
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    #[instrument(skip_all, fields(file = ?file))]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(
            library = %config.library.name,
            root = %config.library.root.display(),
            cache = %config.cache.path.display(),
            "configuration loaded",
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.library.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid("library.root must be an absolute path"));
        }
        if self.sync.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("sync.concurrency must be non-zero"));
        }
        Ok(())
    }
}
