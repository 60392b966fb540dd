//! Archive-backed asset source. The archive is indexed once on construction and
//! held in memory; the shallowest manifest decides the model root.
use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use zip::ZipArchive;

use crate::blob::BlobRegistry;
use crate::fetch::ResourceFetcher;
use crate::manifest::MANIFEST_SUFFIX;
use crate::{mime_for, AssetError, AssetSource};

type ArchiveReader = ZipArchive<Cursor<Arc<[u8]>>>;

pub struct ArchiveSource {
    archive: ArchiveReader,
    entries: BTreeSet<String>,
    manifest_path: String,
    root: String,
    label: String,
    blobs: Arc<BlobRegistry>,
    materialized: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("label", &self.label)
            .field("root", &self.root)
            .field("manifest_path", &self.manifest_path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ArchiveSource {
    pub fn from_bytes(
        bytes: impl Into<Arc<[u8]>>,
        label: impl Into<String>,
        blobs: Arc<BlobRegistry>,
    ) -> Result<Self, AssetError> {
        let archive = ZipArchive::new(Cursor::new(bytes.into()))?;
        let entries: BTreeSet<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();

        let manifest = entries
            .iter()
            .filter(|name| name.ends_with(MANIFEST_SUFFIX))
            .min_by_key(|name| (name.matches('/').count(), name.as_str()))
            .ok_or(AssetError::ManifestMissing)?;
        let (root, manifest_path) = match manifest.rfind('/') {
            Some(slash) => (
                manifest[..=slash].to_string(),
                manifest[slash + 1..].to_string(),
            ),
            None => (String::new(), manifest.clone()),
        };

        let label = label.into();
        debug!(
            archive = %label,
            entries = entries.len(),
            root = %root,
            manifest = %manifest_path,
            "indexed model archive"
        );

        Ok(Self {
            archive,
            entries,
            manifest_path,
            root,
            label,
            blobs,
            materialized: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_path(path: &Path, blobs: Arc<BlobRegistry>) -> Result<Self, AssetError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes, path.display().to_string(), blobs)
    }

    /// Fetches the archive through `fetcher` (URL, path or blob) and indexes it.
    pub fn from_location(location: &str, fetcher: &ResourceFetcher) -> Result<Self, AssetError> {
        let bytes = fetcher.fetch(location)?;
        Self::from_bytes(bytes, location, fetcher.blobs().clone())
    }

    /// Directory of the manifest inside the archive, with a trailing slash.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    fn lookup_path(&self, relative: &str) -> String {
        let relative = relative.strip_prefix("./").unwrap_or(relative);
        format!("{}{}", self.root, relative)
    }

    fn read_entry(&self, relative: &str) -> Result<Vec<u8>, AssetError> {
        let lookup = self.lookup_path(relative);
        if !self.entries.contains(&lookup) {
            return Err(AssetError::NotFound {
                requested: relative.to_string(),
                lookup,
            });
        }
        // Clones share the underlying buffer; only the cursor is copied.
        let mut archive = self.archive.clone();
        let mut file = archive.by_name(&lookup)?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl AssetSource for ArchiveSource {
    fn manifest_path(&self) -> &str {
        &self.manifest_path
    }

    fn fetch_bytes(&self, relative: &str) -> Result<Vec<u8>, AssetError> {
        self.read_entry(relative)
    }

    fn resolve_uri(&self, relative: &str) -> Result<String, AssetError> {
        let lookup = self.lookup_path(relative);
        let mut materialized = self
            .materialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(uri) = materialized.get(&lookup) {
            return Ok(uri.clone());
        }
        let bytes = self.read_entry(relative)?;
        let uri = self.blobs.register(Arc::from(bytes), mime_for(relative));
        debug!(archive = %self.label, path = %lookup, %uri, "materialized archive entry");
        materialized.insert(lookup, uri.clone());
        Ok(uri)
    }

    fn dispose(&self) {
        let mut materialized = self
            .materialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, uri) in materialized.drain() {
            self.blobs.revoke(&uri);
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;

    fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in files {
            writer
                .start_file(*name, FileOptions::default())
                .expect("start entry");
            writer.write_all(contents).expect("write entry");
        }
        writer.finish().expect("finish archive").into_inner()
    }

    #[test]
    fn picks_shallowest_manifest_as_root() {
        let bytes = build_archive(&[
            ("pack/extra/deep/other.model3.json", b"{}"),
            ("pack/haru/haru.model3.json", b"{}"),
            ("pack/haru/textures/t0.png", b"png"),
        ]);
        let source = ArchiveSource::from_bytes(bytes, "test.zip", BlobRegistry::new()).unwrap();
        assert_eq!(source.root(), "pack/haru/");
        assert_eq!(source.manifest_path(), "haru.model3.json");
        assert_eq!(source.fetch_bytes("textures/t0.png").unwrap(), b"png");
        assert_eq!(source.fetch_bytes("./textures/t0.png").unwrap(), b"png");
    }

    #[test]
    fn manifest_at_archive_root() {
        let bytes = build_archive(&[("a.model3.json", b"{}"), ("a.moc3", b"moc")]);
        let source = ArchiveSource::from_bytes(bytes, "test.zip", BlobRegistry::new()).unwrap();
        assert_eq!(source.root(), "");
        assert_eq!(source.fetch_bytes("a.moc3").unwrap(), b"moc");
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let bytes = build_archive(&[("readme.txt", b"hi")]);
        let err = ArchiveSource::from_bytes(bytes, "test.zip", BlobRegistry::new()).unwrap_err();
        assert!(matches!(err, AssetError::ManifestMissing));
    }

    #[test]
    fn not_found_error_names_requested_and_lookup_paths() {
        let bytes = build_archive(&[("model/m.model3.json", b"{}")]);
        let source = ArchiveSource::from_bytes(bytes, "test.zip", BlobRegistry::new()).unwrap();
        let err = source.fetch_bytes("textures/missing.png").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("textures/missing.png"), "{message}");
        assert!(message.contains("model/textures/missing.png"), "{message}");
    }

    #[test]
    fn resolve_uri_is_idempotent_and_disposable() {
        let blobs = BlobRegistry::new();
        let bytes = build_archive(&[
            ("m.model3.json", b"{}"),
            ("sounds/a.wav", b"RIFF"),
        ]);
        let source = ArchiveSource::from_bytes(bytes, "test.zip", blobs.clone()).unwrap();

        let first = source.resolve_uri("sounds/a.wav").unwrap();
        let second = source.resolve_uri("sounds/a.wav").unwrap();
        assert_eq!(first, second);
        assert_eq!(blobs.len(), 1);
        let blob = blobs.get(&first).unwrap();
        assert_eq!(blob.mime, "audio/wav");
        assert_eq!(&*blob.bytes, b"RIFF");

        assert!(source.resolve_uri("sounds/b.wav").is_err());

        source.dispose();
        assert!(blobs.is_empty());
        source.dispose();

        let fresh = source.resolve_uri("sounds/a.wav").unwrap();
        assert_ne!(fresh, first);
    }
}
