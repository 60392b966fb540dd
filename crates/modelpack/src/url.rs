use reqwest::Url;

use crate::fetch::{parse_location, ResourceFetcher};
use crate::{AssetError, AssetSource};

/// Resolves files against the manifest's own URL.
///
/// Stateless apart from the transport: `resolve_uri` hands out the absolute URL
/// and there is nothing to release on dispose.
#[derive(Debug, Clone)]
pub struct UrlSource {
    manifest_url: Url,
    manifest_name: String,
    fetcher: ResourceFetcher,
}

impl UrlSource {
    pub fn new(manifest: &str, fetcher: ResourceFetcher) -> Result<Self, AssetError> {
        let manifest_url = parse_location(manifest)?;
        let manifest_name = manifest_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AssetError::InvalidUrl {
                input: manifest.to_string(),
                reason: "manifest url has no file name".into(),
            })?;
        Ok(Self {
            manifest_url,
            manifest_name,
            fetcher,
        })
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest_url
    }

    pub fn resolve(&self, relative: &str) -> Result<Url, AssetError> {
        self.manifest_url
            .join(relative)
            .map_err(|err| AssetError::InvalidUrl {
                input: relative.to_string(),
                reason: err.to_string(),
            })
    }
}

impl AssetSource for UrlSource {
    fn manifest_path(&self) -> &str {
        &self.manifest_name
    }

    fn fetch_bytes(&self, relative: &str) -> Result<Vec<u8>, AssetError> {
        let url = self.resolve(relative)?;
        self.fetcher.fetch_url(&url)
    }

    fn resolve_uri(&self, relative: &str) -> Result<String, AssetError> {
        Ok(self.resolve(relative)?.to_string())
    }

    fn dispose(&self) {}

    fn describe(&self) -> String {
        self.manifest_url.to_string()
    }

    fn cache_key(&self, relative: &str) -> String {
        self.resolve(relative)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}#{}", self.manifest_url, relative))
    }
}
