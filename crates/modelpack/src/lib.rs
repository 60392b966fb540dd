mod archive;
mod blob;
mod fetch;
mod manifest;
mod url;

pub use archive::ArchiveSource;
pub use blob::{Blob, BlobRegistry, BLOB_SCHEME};
pub use fetch::{parse_location, ResourceFetcher};
pub use manifest::{
    ExpressionEntry, FileReferences, HitAreaEntry, ModelSettings, MotionEntry, ParameterGroup,
    MANIFEST_SUFFIX,
};
pub use url::UrlSource;

use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("File not found in archive: {requested} (looked for {lookup})")]
    NotFound { requested: String, lookup: String },

    #[error("no .model3.json found in archive")]
    ManifestMissing,

    #[error("failed to parse model manifest: {0}")]
    ManifestParse(#[source] serde_json::Error),

    #[error("invalid location '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("blob uri '{0}' is not registered")]
    UnknownBlob(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves a model's files relative to its manifest.
///
/// Implementations are shared with load workers, so every method takes `&self`.
pub trait AssetSource: Send + Sync {
    /// Root-relative name of the manifest file itself.
    fn manifest_path(&self) -> &str;

    /// Reads a file relative to the model root.
    fn fetch_bytes(&self, relative: &str) -> Result<Vec<u8>, AssetError>;

    /// Returns a URI the file can be fetched from later (see [`ResourceFetcher::fetch`]).
    fn resolve_uri(&self, relative: &str) -> Result<String, AssetError>;

    /// Releases any URIs handed out by `resolve_uri`. Safe to call repeatedly.
    fn dispose(&self);

    /// Short human-readable label used in log fields.
    fn describe(&self) -> String;

    /// Identity of a file across sources, used to share decoded assets
    /// between models loaded from the same place.
    fn cache_key(&self, relative: &str) -> String {
        format!("{}#{}", self.describe(), relative)
    }
}

pub type SharedSource = Arc<dyn AssetSource>;

/// Reads and parses the manifest a source was opened for.
pub fn load_settings(source: &dyn AssetSource) -> Result<ModelSettings, AssetError> {
    let bytes = source.fetch_bytes(source.manifest_path())?;
    ModelSettings::from_slice(&bytes)
}

/// MIME type used when a file is registered as a blob.
pub fn mime_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// What a user-supplied model reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocator {
    Manifest(String),
    Archive(String),
}

impl ModelLocator {
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        let path = trimmed.split(&['?', '#'][..]).next().unwrap_or(trimmed);
        if path.to_ascii_lowercase().ends_with(".zip") {
            Self::Archive(trimmed.to_string())
        } else {
            Self::Manifest(trimmed.to_string())
        }
    }

    /// Opens the matching asset source.
    pub fn open(&self, fetcher: &ResourceFetcher) -> Result<SharedSource, AssetError> {
        match self {
            Self::Manifest(location) => Ok(Arc::new(UrlSource::new(location, fetcher.clone())?)),
            Self::Archive(location) => {
                Ok(Arc::new(ArchiveSource::from_location(location, fetcher)?))
            }
        }
    }
}
