//! PBR renderer
//!
//! Owns the two shader programs, the static models loaded by asset tag, the
//! engine fallback model and the image-based-lighting maps. Static model
//! draws are grouped by surface identity so every distinct surface is drawn
//! with a single instanced call per frame.

use std::collections::HashMap;
use std::path::Path;

use super::geometry::{cube_geometry, quad_geometry};
use super::gpu::{GpuDevice, TextureHandle};
use super::import::SceneImporter;
use super::material::Material;
use super::model::{load_static_model, ModelError, StaticModel, Surface};
use super::render_queue::{AssetTag, DrainedFrame, RenderDescriptor};
use super::resources::{create_geometry, Geometry};
use super::shader::{
    draw_deferred_second_pass, draw_surface_batch, load_deferred_lighting_shader, load_pbr_shader,
    DeferredLightingShader, FrameParams, GBuffer, Light, PbrShader, ShaderError,
};
use super::texture_cache::ImageTextureCache;
use crate::config::EngineConfig;
use crate::foundation::math::{Mat4, Vec3};

/// Camera inputs for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position
    pub eye: Vec3,
    /// View matrix
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
}

/// Precomputed image-based-lighting maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageBasedLighting {
    /// Diffuse irradiance cube map
    pub irradiance_map: TextureHandle,
    /// Prefiltered environment cube map
    pub environment_filter_map: TextureHandle,
    /// BRDF integration lookup texture
    pub brdf_texture: TextureHandle,
}

/// One static model placed in the world
#[derive(Debug, Clone, PartialEq)]
pub struct StaticModelInstance {
    /// Model asset
    pub model: AssetTag,
    /// Instance transform
    pub transform: Mat4,
}

#[derive(Debug)]
enum ModelEntry {
    Loaded(StaticModel),
    Fallback,
}

#[derive(Debug)]
struct Programs {
    forward: PbrShader,
    deferred: DeferredLightingShader,
}

/// Forward and deferred PBR renderer
#[derive(Debug)]
pub struct PbrRenderer {
    renderable: bool,
    lights_max: usize,
    fallback_to_defaults: bool,
    programs: Option<Programs>,
    models: HashMap<AssetTag, ModelEntry>,
    fallback: StaticModel,
    quad: Geometry,
    lighting: ImageBasedLighting,
    textures: ImageTextureCache,
}

impl PbrRenderer {
    /// Create the renderer
    ///
    /// Shaders are only built when the configuration is renderable; a
    /// headless renderer still loads models (CPU-side) but draws nothing.
    pub fn new(
        device: &mut dyn GpuDevice,
        config: &EngineConfig,
        lighting: ImageBasedLighting,
    ) -> Result<Self, ShaderError> {
        let programs = if config.renderable {
            Some(Programs {
                forward: load_pbr_shader(device, &config.asset_path(&config.forward_shader_path))?,
                deferred: load_deferred_lighting_shader(device, &config.asset_path(&config.deferred_shader_path))?,
            })
        } else {
            None
        };
        let fallback = StaticModel::from_descriptor(config.renderable, device, &cube_geometry(), Material::default());
        let quad = create_geometry(config.renderable, device, &quad_geometry());
        log::info!(
            "PBR renderer ready ({}, up to {} lights)",
            if config.renderable { "renderable" } else { "headless" },
            config.lights_max
        );
        Ok(Self {
            renderable: config.renderable,
            lights_max: config.lights_max,
            fallback_to_defaults: config.fallback_to_defaults,
            programs,
            models: HashMap::new(),
            fallback,
            quad,
            lighting,
            textures: ImageTextureCache::new(),
        })
    }

    /// Whether GPU resources are created
    pub fn is_renderable(&self) -> bool {
        self.renderable
    }

    /// The model registered under `tag`; fallback entries resolve to the fallback model
    pub fn model(&self, tag: &AssetTag) -> Option<&StaticModel> {
        self.models.get(tag).map(|entry| match entry {
            ModelEntry::Loaded(model) => model,
            ModelEntry::Fallback => &self.fallback,
        })
    }

    /// Whether `tag` is registered with the fallback model
    pub fn is_fallback(&self, tag: &AssetTag) -> bool {
        matches!(self.models.get(tag), Some(ModelEntry::Fallback))
    }

    /// Register an already-built model, replacing (and freeing) any previous one
    pub fn insert_model(&mut self, device: &mut dyn GpuDevice, tag: AssetTag, model: StaticModel) {
        if let Some(ModelEntry::Loaded(previous)) = self.models.insert(tag, ModelEntry::Loaded(model)) {
            previous.destroy(device);
        }
    }

    /// Load a static model from disk and register it under `tag`
    pub fn load_static_model(
        &mut self,
        device: &mut dyn GpuDevice,
        tag: AssetTag,
        path: &Path,
        importer: &mut dyn SceneImporter,
    ) -> Result<(), ModelError> {
        let model = load_static_model(self.renderable, path, importer, device, &mut self.textures)?;
        self.insert_model(device, tag, model);
        Ok(())
    }

    /// Load a static model, registering the fallback model when loading fails
    ///
    /// Returns whether the real model was loaded. With fallback disabled the
    /// tag stays unregistered on failure.
    pub fn load_or_fallback(
        &mut self,
        device: &mut dyn GpuDevice,
        tag: AssetTag,
        path: &Path,
        importer: &mut dyn SceneImporter,
    ) -> bool {
        match self.load_static_model(device, tag.clone(), path, importer) {
            Ok(()) => true,
            Err(e) => {
                log::error!("{}", error_chain(&e));
                if self.fallback_to_defaults {
                    log::warn!("Using fallback model for {}", tag);
                    if let Some(ModelEntry::Loaded(previous)) = self.models.insert(tag, ModelEntry::Fallback) {
                        previous.destroy(device);
                    }
                }
                false
            }
        }
    }

    /// Drop every loaded model and cached texture
    ///
    /// Registered tags are forgotten; callers reload what they still need.
    pub fn reload_assets(&mut self, device: &mut dyn GpuDevice) {
        for (_, entry) in self.models.drain() {
            if let ModelEntry::Loaded(model) = entry {
                model.destroy(device);
            }
        }
        self.textures.clear(device);
        log::info!("Released all static models for reload");
    }

    fn frame_params<'a>(&self, camera: &Camera, lights: &'a [Light]) -> FrameParams<'a> {
        let lights = if lights.len() > self.lights_max {
            log::warn!("{} lights submitted; only the first {} are used", lights.len(), self.lights_max);
            &lights[..self.lights_max]
        } else {
            lights
        };
        FrameParams {
            eye_center: camera.eye,
            view: camera.view,
            projection: camera.projection,
            irradiance_map: self.lighting.irradiance_map,
            environment_filter_map: self.lighting.environment_filter_map,
            brdf_texture: self.lighting.brdf_texture,
            lights,
        }
    }

    /// Draw static model instances, one instanced call per distinct surface
    ///
    /// Unknown model tags draw the fallback model. Returns the number of
    /// batches submitted (zero when headless).
    pub fn render_static_models(
        &self,
        device: &mut dyn GpuDevice,
        camera: &Camera,
        instances: &[StaticModelInstance],
        lights: &[Light],
        blending: bool,
    ) -> Result<usize, ShaderError> {
        let Some(programs) = &self.programs else {
            return Ok(0);
        };

        // group by surface identity, keeping first-seen order
        let mut groups: Vec<(&Surface, Vec<Mat4>)> = Vec::new();
        let mut index: HashMap<&Surface, usize> = HashMap::new();
        for instance in instances {
            let model = self.model(&instance.model).unwrap_or_else(|| {
                log::debug!("Model {} not loaded; drawing fallback", instance.model);
                &self.fallback
            });
            for surface in model.surfaces() {
                let slot = *index.entry(surface).or_insert_with(|| {
                    groups.push((surface, Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(instance.transform * surface.transform());
            }
        }

        let frame = self.frame_params(camera, lights);
        for (surface, models) in &groups {
            draw_surface_batch(
                device,
                &programs.forward,
                &frame,
                models,
                blending,
                surface.material(),
                surface.geometry(),
            )?;
        }
        Ok(groups.len())
    }

    /// Draw every static model request of a drained frame
    ///
    /// Opaque requests draw before blended ones.
    pub fn render_frame(
        &self,
        device: &mut dyn GpuDevice,
        frame: &DrainedFrame,
        camera: &Camera,
        lights: &[Light],
    ) -> Result<usize, ShaderError> {
        let (mut opaque, mut blended) = (Vec::new(), Vec::new());
        for layered in &frame.layered {
            if let RenderDescriptor::StaticModel(model) = &layered.descriptor {
                let instance = StaticModelInstance {
                    model: layered.asset.clone(),
                    transform: model.transform,
                };
                if model.blending {
                    blended.push(instance);
                } else {
                    opaque.push(instance);
                }
            }
        }
        let mut batches = 0;
        if !opaque.is_empty() {
            batches += self.render_static_models(device, camera, &opaque, lights, false)?;
        }
        if !blended.is_empty() {
            batches += self.render_static_models(device, camera, &blended, lights, true)?;
        }
        Ok(batches)
    }

    /// Light a G-buffer onto the full-screen quad
    pub fn draw_deferred_lighting(
        &self,
        device: &mut dyn GpuDevice,
        camera: &Camera,
        lights: &[Light],
        gbuffer: &GBuffer,
    ) -> Result<(), ShaderError> {
        let Some(programs) = &self.programs else {
            return Ok(());
        };
        let frame = self.frame_params(camera, lights);
        draw_deferred_second_pass(device, &programs.deferred, &frame, gbuffer, &self.quad)
    }

    /// Free every GPU object the renderer owns
    pub fn destroy(mut self, device: &mut dyn GpuDevice) {
        self.reload_assets(device);
        self.fallback.destroy(device);
        self.quad.destroy(device);
        if let Some(programs) = self.programs {
            device.delete_program(programs.forward.program);
            device.delete_program(programs.deferred.program);
        }
    }
}

/// Render an error with its `source` chain on one line
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::import::{ImportError, ImportedScene, PostProcessSteps};
    use crate::render::recorder::{GpuCall, RecordingDevice};
    use std::path::PathBuf;

    const SHADER: &str = "#shader vertex\nvoid main() {}\n#shader fragment\nvoid main() {}\n";

    struct FailingImporter;

    impl SceneImporter for FailingImporter {
        fn import(&mut self, path: &Path, _steps: PostProcessSteps) -> Result<ImportedScene, ImportError> {
            Err(ImportError::UnsupportedFormat(path.display().to_string()))
        }
    }

    fn config(dir: &Path) -> EngineConfig {
        std::fs::write(dir.join("pbr.glsl"), SHADER).unwrap();
        std::fs::write(dir.join("deferred.glsl"), SHADER).unwrap();
        EngineConfig {
            renderable: true,
            asset_root: dir.to_path_buf(),
            forward_shader_path: PathBuf::from("pbr.glsl"),
            deferred_shader_path: PathBuf::from("deferred.glsl"),
            lights_max: 2,
            ..EngineConfig::default()
        }
    }

    fn camera() -> Camera {
        Camera {
            eye: Vec3::new(0.0, 0.0, 5.0),
            view: Mat4::identity(),
            projection: Mat4::identity(),
        }
    }

    fn instanced_draws(device: &RecordingDevice) -> Vec<u32> {
        device
            .calls()
            .iter()
            .filter_map(|call| match call {
                GpuCall::DrawElementsInstanced { instances, .. } => Some(*instances),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_instances_of_one_surface_share_a_draw() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = RecordingDevice::new();
        let mut renderer = PbrRenderer::new(&mut device, &config(dir.path()), ImageBasedLighting::default()).unwrap();
        let cube = StaticModel::from_descriptor(true, &mut device, &cube_geometry(), Material::default());
        renderer.insert_model(&mut device, AssetTag::new("Default", "Cube"), cube);
        device.clear_calls();

        let instances: Vec<_> = (0..3)
            .map(|i| StaticModelInstance {
                model: AssetTag::new("Default", "Cube"),
                transform: Mat4::new_translation(&Vec3::new(i as f32, 0.0, 0.0)),
            })
            .chain(std::iter::once(StaticModelInstance {
                model: AssetTag::new("Default", "Missing"),
                transform: Mat4::identity(),
            }))
            .collect();
        let batches = renderer
            .render_static_models(&mut device, &camera(), &instances, &[], false)
            .unwrap();
        assert_eq!(batches, 2);
        assert_eq!(instanced_draws(&device), vec![3, 1]);
    }

    #[test]
    fn test_failed_load_registers_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = RecordingDevice::new();
        let mut renderer = PbrRenderer::new(&mut device, &config(dir.path()), ImageBasedLighting::default()).unwrap();
        let tag = AssetTag::new("Gameplay", "Ship");

        let loaded = renderer.load_or_fallback(&mut device, tag.clone(), Path::new("ship.fbx"), &mut FailingImporter);
        assert!(!loaded);
        assert!(renderer.is_fallback(&tag));
        assert_eq!(renderer.model(&tag).unwrap().surfaces().len(), 1);
    }

    #[test]
    fn test_lights_are_truncated_to_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = RecordingDevice::new();
        let renderer = PbrRenderer::new(&mut device, &config(dir.path()), ImageBasedLighting::default()).unwrap();
        let light = Light { position: Vec3::zeros(), color: [1.0; 4], brightness: 1.0, intensity: 1.0 };
        let lights = [light; 5];
        let params = renderer.frame_params(&camera(), &lights);
        assert_eq!(params.lights.len(), 2);
    }

    #[test]
    fn test_headless_renderer_draws_nothing_and_frees_everything() {
        let mut device = RecordingDevice::new();
        let renderer = PbrRenderer::new(&mut device, &EngineConfig::headless(), ImageBasedLighting::default()).unwrap();
        let instance = StaticModelInstance {
            model: AssetTag::new("Default", "Cube"),
            transform: Mat4::identity(),
        };
        assert_eq!(renderer.render_static_models(&mut device, &camera(), &[instance], &[], false).unwrap(), 0);
        assert!(device.calls().is_empty());
        renderer.destroy(&mut device);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_destroy_releases_gpu_objects() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = RecordingDevice::new();
        let renderer = PbrRenderer::new(&mut device, &config(dir.path()), ImageBasedLighting::default()).unwrap();
        assert_eq!(device.live_object_count(), 8);
        renderer.destroy(&mut device);
        assert_eq!(device.live_object_count(), 0);
    }
}
