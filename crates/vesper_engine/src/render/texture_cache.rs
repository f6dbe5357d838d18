//! Image-backed texture cache
//!
//! Decodes PNG (and other `image` formats) to RGBA8 and uploads through the
//! GPU device, memoizing one handle per file path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::gpu::{GpuDevice, TextureFilter, TextureHandle};
use super::material::{TextureCache, TextureError};

/// Decoded image ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file(path: &Path) -> Result<Self, TextureError> {
        log::debug!("Loading image from: {:?}", path);

        let img = image::open(path).map_err(|e| TextureError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        // Convert to RGBA8 format (standard for GPU upload)
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }
}

/// [`TextureCache`] decoding files with `image` and uploading through a device
///
/// One handle is memoized per file path and owned until [`ImageTextureCache::clear`].
#[derive(Debug, Default)]
pub struct ImageTextureCache {
    textures: HashMap<PathBuf, TextureHandle>,
}

impl ImageTextureCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached textures
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Delete every cached texture exactly once and forget them
    pub fn clear(&mut self, device: &mut dyn GpuDevice) {
        for (path, texture) in self.textures.drain() {
            log::trace!("Deleting texture {:?} ({:?})", texture, path);
            device.delete_texture(texture);
        }
    }
}

impl TextureCache for ImageTextureCache {
    fn load_texture_2d(
        &mut self,
        device: &mut dyn GpuDevice,
        min_filter: TextureFilter,
        mag_filter: TextureFilter,
        path: &Path,
    ) -> Result<TextureHandle, TextureError> {
        if let Some(texture) = self.textures.get(path) {
            return Ok(*texture);
        }
        let image = ImageData::from_file(path)?;
        let texture = device.create_texture_2d(image.width, image.height, &image.data, min_filter, mag_filter)?;
        log::info!("Loaded texture {}x{} from {:?}", image.width, image.height, path);
        self.textures.insert(path.to_path_buf(), texture);
        Ok(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::recorder::RecordingDevice;

    fn write_png(path: &Path) {
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        image.save(path).unwrap();
    }

    #[test]
    fn test_loads_are_memoized_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        write_png(&path);

        let mut device = RecordingDevice::new();
        let mut cache = ImageTextureCache::new();
        let first = cache
            .load_texture_2d(&mut device, TextureFilter::Linear, TextureFilter::Linear, &path)
            .unwrap();
        let second = cache
            .load_texture_2d(&mut device, TextureFilter::Linear, TextureFilter::Linear, &path)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(device.live_object_count(), 1);

        cache.clear(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_missing_file_is_a_decode_error() {
        let mut device = RecordingDevice::new();
        let mut cache = ImageTextureCache::new();
        let err = cache
            .load_texture_2d(&mut device, TextureFilter::Linear, TextureFilter::Linear, Path::new("nope.png"))
            .unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
    }
}
