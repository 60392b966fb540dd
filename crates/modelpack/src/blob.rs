use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub const BLOB_SCHEME: &str = "blob:";

/// In-memory file handed out under a `blob:` URI.
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Arc<[u8]>,
    pub mime: &'static str,
}

/// Process-local table of materialized blobs.
///
/// Owned by whoever creates the [`crate::ResourceFetcher`]; archive sources
/// register into it and revoke their entries on dispose.
#[derive(Debug, Default)]
pub struct BlobRegistry {
    next: AtomicU64,
    entries: Mutex<HashMap<String, Blob>>,
}

impl BlobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, bytes: Arc<[u8]>, mime: &'static str) -> String {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let uri = format!("{BLOB_SCHEME}modelpack/{id}");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.clone(), Blob { bytes, mime });
        uri
    }

    pub fn get(&self, uri: &str) -> Option<Blob> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }

    /// Returns true when the URI was registered.
    pub fn revoke(&self, uri: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_get_revoke() {
        let registry = BlobRegistry::new();
        let first = registry.register(Arc::from(&b"one"[..]), "image/png");
        let second = registry.register(Arc::from(&b"two"[..]), "audio/wav");
        assert_ne!(first, second);
        assert!(first.starts_with(BLOB_SCHEME));

        let blob = registry.get(&first).expect("registered blob");
        assert_eq!(&*blob.bytes, b"one");
        assert_eq!(blob.mime, "image/png");

        assert!(registry.revoke(&first));
        assert!(!registry.revoke(&first));
        assert!(registry.get(&first).is_none());
        assert_eq!(registry.len(), 1);
    }
}
