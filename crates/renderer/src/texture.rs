use std::collections::HashMap;

use image::imageops::FilterType;
use image::RgbaImage;
use modelpack::AssetError;
use tracing::debug;

use crate::device::{GpuError, GraphicsDevice, MipLevel, TextureHandle, TextureUpload};

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("failed to fetch texture '{path}': {source}")]
    Fetch {
        path: String,
        #[source]
        source: AssetError,
    },

    #[error("failed to decode texture '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to upload texture '{path}': {source}")]
    Upload {
        path: String,
        #[source]
        source: GpuError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub path: String,
    pub premultiply: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureEntry {
    pub key: TextureKey,
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// GPU textures keyed by `(path, premultiply)`, shared by every model on a
/// canvas. Entries live until `unload` or `dispose`.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<TextureKey, TextureEntry>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str, premultiply: bool) -> Option<&TextureEntry> {
        self.entries.get(&TextureKey {
            path: path.to_string(),
            premultiply,
        })
    }

    /// Returns the cached entry, or fetches, decodes and uploads the image.
    ///
    /// `fetch` is only called on a miss or when `force_reload` is set. A
    /// forced reload releases the old GPU texture before uploading the new one.
    pub fn load<F>(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        premultiply: bool,
        force_reload: bool,
        fetch: F,
    ) -> Result<TextureEntry, TextureError>
    where
        F: FnOnce() -> Result<Vec<u8>, AssetError>,
    {
        let key = TextureKey {
            path: path.to_string(),
            premultiply,
        };
        if let Some(entry) = self.entries.get(&key) {
            if !force_reload {
                debug!(path, premultiply, "texture cache hit");
                return Ok(entry.clone());
            }
        }
        if let Some(stale) = self.entries.remove(&key) {
            debug!(path, "texture reload requested; releasing cached texture");
            device.release_texture(stale.handle);
        }

        let bytes = fetch().map_err(|source| TextureError::Fetch {
            path: path.to_string(),
            source,
        })?;
        let upload = decode_texture(path, &bytes, premultiply)?;
        let (width, height) = upload
            .levels
            .first()
            .map(|level| (level.width, level.height))
            .unwrap_or_default();
        let handle = device
            .upload_texture(&upload)
            .map_err(|source| TextureError::Upload {
                path: path.to_string(),
                source,
            })?;
        debug!(
            path,
            width,
            height,
            mip_levels = upload.levels.len(),
            "texture uploaded"
        );

        let entry = TextureEntry {
            key: key.clone(),
            handle,
            width,
            height,
        };
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Releases the GPU texture and forgets the entry.
    pub fn unload(&mut self, device: &mut dyn GraphicsDevice, entry: &TextureEntry) {
        if let Some(removed) = self.entries.remove(&entry.key) {
            device.release_texture(removed.handle);
        }
    }

    pub fn dispose(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, entry) in self.entries.drain() {
            device.release_texture(entry.handle);
        }
    }
}

/// Decodes an image and builds its full mip chain on the CPU.
pub fn decode_texture(
    path: &str,
    bytes: &[u8],
    premultiply: bool,
) -> Result<TextureUpload, TextureError> {
    let image = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
        path: path.to_string(),
        source,
    })?;
    let mut base = image.to_rgba8();
    if premultiply {
        premultiply_alpha(&mut base);
    }
    Ok(TextureUpload {
        label: path.to_string(),
        levels: build_mip_chain(base),
    })
}

fn premultiply_alpha(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let alpha = pixel[3] as u16;
        for channel in 0..3 {
            pixel[channel] = ((pixel[channel] as u16 * alpha + 127) / 255) as u8;
        }
    }
}

fn build_mip_chain(base: RgbaImage) -> Vec<MipLevel> {
    let mut levels = Vec::new();
    let mut current = base;
    loop {
        let (width, height) = current.dimensions();
        let next = (width > 1 || height > 1).then(|| {
            image::imageops::resize(
                &current,
                (width / 2).max(1),
                (height / 2).max(1),
                FilterType::Triangle,
            )
        });
        levels.push(MipLevel {
            width,
            height,
            rgba: current.into_raw(),
        });
        match next {
            Some(image) => current = image,
            None => return levels,
        }
    }
}
