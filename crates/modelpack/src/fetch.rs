use std::fs;
use std::path::Path;
use std::sync::Arc;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

use crate::blob::{BlobRegistry, BLOB_SCHEME};
use crate::AssetError;

/// Transport shared by URL sources, archive downloads and audio fetches.
///
/// Understands `http(s)://`, `file://` and `blob:` URIs; plain filesystem
/// paths are accepted wherever a location string is.
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    http: Client,
    blobs: Arc<BlobRegistry>,
}

impl ResourceFetcher {
    pub fn new() -> Result<Self, AssetError> {
        Self::with_blobs(BlobRegistry::new())
    }

    pub fn with_blobs(blobs: Arc<BlobRegistry>) -> Result<Self, AssetError> {
        let http = Client::builder()
            .build()
            .map_err(|source| AssetError::Transport {
                url: String::from("<client>"),
                source,
            })?;
        Ok(Self { http, blobs })
    }

    pub fn blobs(&self) -> &Arc<BlobRegistry> {
        &self.blobs
    }

    /// Fetches any supported URI or path.
    pub fn fetch(&self, location: &str) -> Result<Vec<u8>, AssetError> {
        if location.starts_with(BLOB_SCHEME) {
            return self
                .blobs
                .get(location)
                .map(|blob| blob.bytes.to_vec())
                .ok_or_else(|| AssetError::UnknownBlob(location.to_string()));
        }
        let url = parse_location(location)?;
        self.fetch_url(&url)
    }

    pub fn fetch_url(&self, url: &Url) -> Result<Vec<u8>, AssetError> {
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| AssetError::InvalidUrl {
                    input: url.to_string(),
                    reason: "not a local file path".into(),
                })?;
                debug!(path = %path.display(), "reading local asset");
                Ok(fs::read(path)?)
            }
            "http" | "https" => {
                debug!(%url, "fetching remote asset");
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .map_err(|source| AssetError::Transport {
                        url: url.to_string(),
                        source,
                    })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(AssetError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                let bytes = response.bytes().map_err(|source| AssetError::Transport {
                    url: url.to_string(),
                    source,
                })?;
                Ok(bytes.to_vec())
            }
            other => Err(AssetError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Parses a URL, falling back to treating the input as a filesystem path.
pub fn parse_location(input: &str) -> Result<Url, AssetError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AssetError::InvalidUrl {
            input: input.to_string(),
            reason: "location must not be empty".into(),
        });
    }

    // Single-letter schemes are Windows drive prefixes, not URLs.
    if let Ok(url) = Url::parse(trimmed) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }

    let path = Path::new(trimmed);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute).map_err(|_| AssetError::InvalidUrl {
        input: input.to_string(),
        reason: "cannot express path as a file url".into(),
    })
}
