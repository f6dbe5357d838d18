//! PBR material loading
//!
//! Resolves the five texture channels of a physically based material from a
//! material description and loads each through a [`TextureCache`].

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::gpu::{GpuDevice, TextureFilter, TextureHandle};
use super::import::{MaterialDescription, TextureChannel};

/// Texture cache collaborator
///
/// Memoization and eviction are the implementation's responsibility. The
/// device performing any upload is passed explicitly on each call.
pub trait TextureCache {
    /// Load (or fetch a cached) 2D texture
    fn load_texture_2d(
        &mut self,
        device: &mut dyn GpuDevice,
        min_filter: TextureFilter,
        mag_filter: TextureFilter,
        path: &Path,
    ) -> Result<TextureHandle, TextureError>;
}

/// Errors reported by a texture cache
#[derive(Error, Debug)]
pub enum TextureError {
    /// The file could not be read or decoded
    #[error("Failed to decode {path:?}: {message}")]
    Decode {
        /// Texture file
        path: PathBuf,
        /// Decoder message
        message: String,
    },
    /// The GPU rejected the upload
    #[error("Upload rejected: {0}")]
    Upload(#[from] super::gpu::GpuError),
}

/// Errors raised while loading materials
#[derive(Error, Debug)]
pub enum MaterialError {
    /// The description does not name one of the five required channels
    #[error("Material '{material}' has no {channel:?} texture")]
    MissingTextureChannel {
        /// Material name
        material: String,
        /// Absent channel
        channel: TextureChannel,
    },
    /// A texture failed to load
    #[error("Could not load texture {path:?}")]
    TextureLoad {
        /// Texture file
        path: PathBuf,
        /// Underlying failure
        #[source]
        cause: TextureError,
    },
}

/// Physically based material: five texture handles
///
/// Immutable and shared by every surface referencing it. The default value
/// holds null handles and stands in for materials when running headless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Material {
    /// Base color
    pub albedo: TextureHandle,
    /// Metalness
    pub metalness: TextureHandle,
    /// Roughness
    pub roughness: TextureHandle,
    /// Tangent-space normal map
    pub normal: TextureHandle,
    /// Ambient occlusion
    pub ambient_occlusion: TextureHandle,
}

impl Material {
    /// The five handles in texture-unit order (units 0..=4)
    pub fn textures(&self) -> [TextureHandle; 5] {
        [self.albedo, self.metalness, self.roughness, self.normal, self.ambient_occlusion]
    }
}

/// Description channel feeding each material slot, in slot order
const CHANNELS: [TextureChannel; 5] = [
    TextureChannel::Diffuse,
    TextureChannel::Specular,
    TextureChannel::Height,
    TextureChannel::Normals,
    TextureChannel::Ambient,
];

/// Load one material's textures from `dir`
///
/// Every channel path is resolved before any texture loads, so a missing
/// channel never triggers partial loading. The first failing load aborts.
pub fn load_material(
    dir: &Path,
    description: &MaterialDescription,
    device: &mut dyn GpuDevice,
    cache: &mut dyn TextureCache,
) -> Result<Material, MaterialError> {
    let mut paths = Vec::with_capacity(CHANNELS.len());
    for channel in CHANNELS {
        let file = description
            .textures
            .get(&channel)
            .ok_or_else(|| MaterialError::MissingTextureChannel {
                material: description.name.clone(),
                channel,
            })?;
        paths.push(dir.join(file));
    }

    let mut handles = [TextureHandle::NONE; 5];
    for (handle, path) in handles.iter_mut().zip(&paths) {
        *handle = cache
            .load_texture_2d(device, TextureFilter::Linear, TextureFilter::Linear, path)
            .map_err(|cause| MaterialError::TextureLoad { path: path.clone(), cause })?;
    }
    let [albedo, metalness, roughness, normal, ambient_occlusion] = handles;

    log::debug!("Loaded material '{}' from {:?}", description.name, dir);
    Ok(Material { albedo, metalness, roughness, normal, ambient_occlusion })
}

/// Load every material of a scene, in order
///
/// Stops at the first failing material. Headless (non-renderable) loads skip
/// texture loading entirely and return no materials.
pub fn load_materials(
    renderable: bool,
    dir: &Path,
    descriptions: &[MaterialDescription],
    device: &mut dyn GpuDevice,
    cache: &mut dyn TextureCache,
) -> Result<Vec<Material>, MaterialError> {
    if !renderable {
        return Ok(Vec::new());
    }
    descriptions
        .iter()
        .map(|description| load_material(dir, description, device, cache))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::recorder::RecordingDevice;
    use std::collections::HashMap;

    /// Texture cache handing out sequential handles and failing on request
    #[derive(Default)]
    pub(crate) struct FakeTextureCache {
        pub loads: Vec<PathBuf>,
        pub failing: Option<PathBuf>,
        cached: HashMap<PathBuf, TextureHandle>,
    }

    impl TextureCache for FakeTextureCache {
        fn load_texture_2d(
            &mut self,
            _device: &mut dyn GpuDevice,
            min_filter: TextureFilter,
            mag_filter: TextureFilter,
            path: &Path,
        ) -> Result<TextureHandle, TextureError> {
            assert_eq!(min_filter, TextureFilter::Linear);
            assert_eq!(mag_filter, TextureFilter::Linear);
            self.loads.push(path.to_path_buf());
            if self.failing.as_deref() == Some(path) {
                return Err(TextureError::Decode {
                    path: path.to_path_buf(),
                    message: "corrupt".to_string(),
                });
            }
            let next = TextureHandle(self.cached.len() as u32 + 1);
            Ok(*self.cached.entry(path.to_path_buf()).or_insert(next))
        }
    }

    pub(crate) fn full_description(name: &str) -> MaterialDescription {
        MaterialDescription::new(name)
            .with_texture(TextureChannel::Diffuse, format!("{name}_albedo.png"))
            .with_texture(TextureChannel::Specular, format!("{name}_metal.png"))
            .with_texture(TextureChannel::Height, format!("{name}_rough.png"))
            .with_texture(TextureChannel::Normals, format!("{name}_normal.png"))
            .with_texture(TextureChannel::Ambient, format!("{name}_ao.png"))
    }

    #[test]
    fn test_channels_map_to_slots() {
        let mut cache = FakeTextureCache::default();
        let material = load_material(Path::new("models"), &full_description("brick"), &mut RecordingDevice::new(), &mut cache).unwrap();
        assert_eq!(cache.loads[0], Path::new("models/brick_albedo.png"));
        assert_eq!(cache.loads[1], Path::new("models/brick_metal.png"));
        assert_eq!(cache.loads[2], Path::new("models/brick_rough.png"));
        assert_eq!(cache.loads[3], Path::new("models/brick_normal.png"));
        assert_eq!(cache.loads[4], Path::new("models/brick_ao.png"));
        assert_eq!(material.textures().iter().filter(|t| **t == TextureHandle::NONE).count(), 0);
    }

    #[test]
    fn test_missing_channel_loads_nothing() {
        let mut cache = FakeTextureCache::default();
        let mut description = full_description("brick");
        description.textures.remove(&TextureChannel::Height);
        let err = load_material(Path::new("models"), &description, &mut RecordingDevice::new(), &mut cache).unwrap_err();
        assert!(matches!(
            err,
            MaterialError::MissingTextureChannel { channel: TextureChannel::Height, .. }
        ));
        assert!(cache.loads.is_empty());
    }

    #[test]
    fn test_first_failure_short_circuits() {
        let mut cache = FakeTextureCache {
            failing: Some(PathBuf::from("models/brick_metal.png")),
            ..Default::default()
        };
        let descriptions = [full_description("brick"), full_description("stone")];
        let err = load_materials(true, Path::new("models"), &descriptions, &mut RecordingDevice::new(), &mut cache).unwrap_err();
        match err {
            MaterialError::TextureLoad { path, .. } => assert_eq!(path, Path::new("models/brick_metal.png")),
            other => panic!("unexpected error {other:?}"),
        }
        // albedo then the failing metalness load; nothing after
        assert_eq!(cache.loads.len(), 2);
    }

    #[test]
    fn test_headless_skips_textures() {
        let mut cache = FakeTextureCache::default();
        let materials = load_materials(
            false,
            Path::new("models"),
            &[full_description("brick")],
            &mut RecordingDevice::new(),
            &mut cache,
        ).unwrap();
        assert!(materials.is_empty());
        assert!(cache.loads.is_empty());
    }
}
