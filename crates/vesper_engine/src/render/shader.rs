//! PBR shader programs and draw submission
//!
//! Two program kinds are supported: the forward PBR program that draws
//! instanced surface batches, and the deferred second-pass program that
//! lights a full-screen quad from G-buffer textures. Uniform locations are
//! resolved once at load time; a location of `-1` means the linker dropped
//! the uniform and uploads to it are skipped.
//!
//! Every draw forces a fixed pipeline state, binds its texture units in
//! ascending order and unbinds them in reverse, then restores the fixed
//! defaults so the next caller starts from a known state.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::gpu::{
    BlendMode, BufferTarget, BufferUsage, Capability, DepthFunc, GpuDevice, GpuError,
    ProgramHandle, TextureHandle, TextureTarget, UniformLocation,
};
use super::material::Material;
use super::resources::{Geometry, GpuGeometry, StagingBuffer};
use crate::foundation::math::{Mat4, Vec3};

/// Marker line opening the vertex stage in a shader file
pub const VERTEX_MARKER: &str = "#shader vertex";
/// Marker line opening the fragment stage in a shader file
pub const FRAGMENT_MARKER: &str = "#shader fragment";

/// Errors raised while loading shaders or drawing with them
#[derive(Error, Debug)]
pub enum ShaderError {
    /// The shader file could not be read
    #[error("Could not read shader {path:?}")]
    Io {
        /// Shader file
        path: PathBuf,
        /// IO failure
        #[source]
        source: std::io::Error,
    },
    /// A stage marker is missing
    #[error("Shader {path:?} has no '{marker}' section")]
    MissingStage {
        /// Shader file
        path: PathBuf,
        /// Expected marker line
        marker: &'static str,
    },
    /// Compilation or linking failed
    #[error("Shader {path:?} failed to build")]
    Build {
        /// Shader file
        path: PathBuf,
        /// Backend failure
        #[source]
        source: GpuError,
    },
    /// The geometry was created headless and has no GPU objects
    #[error("Geometry has no GPU resources (created with renderable = false)")]
    NotRenderable,
}

/// One light as uploaded to the lighting uniform arrays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// World-space position
    pub position: Vec3,
    /// Linear RGBA color
    pub color: [f32; 4],
    /// Brightness multiplier
    pub brightness: f32,
    /// Attenuation intensity
    pub intensity: f32,
}

/// Per-frame inputs shared by every batch
#[derive(Debug, Clone, Copy)]
pub struct FrameParams<'a> {
    /// Camera position
    pub eye_center: Vec3,
    /// View matrix
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
    /// Diffuse irradiance cube map
    pub irradiance_map: TextureHandle,
    /// Prefiltered environment cube map
    pub environment_filter_map: TextureHandle,
    /// BRDF integration lookup texture
    pub brdf_texture: TextureHandle,
    /// Lights affecting the frame
    pub lights: &'a [Light],
}

/// G-buffer produced by the deferred first pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBuffer {
    /// World positions
    pub position: TextureHandle,
    /// Albedo
    pub albedo: TextureHandle,
    /// Packed metalness / roughness / ambient occlusion
    pub material: TextureHandle,
    /// World normals
    pub normal: TextureHandle,
}

/// Lighting uniform locations shared by both program kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightingUniforms {
    /// `eyeCenter`
    pub eye_center: UniformLocation,
    /// `irradianceMap`
    pub irradiance_map: UniformLocation,
    /// `environmentFilterMap`
    pub environment_filter_map: UniformLocation,
    /// `brdfTexture`
    pub brdf_texture: UniformLocation,
    /// `lightPositions`
    pub light_positions: UniformLocation,
    /// `lightColors`
    pub light_colors: UniformLocation,
    /// `lightBrightnesses`
    pub light_brightnesses: UniformLocation,
    /// `lightIntensities`
    pub light_intensities: UniformLocation,
}

impl LightingUniforms {
    fn resolve(device: &mut dyn GpuDevice, program: ProgramHandle) -> Self {
        Self {
            eye_center: device.uniform_location(program, "eyeCenter"),
            irradiance_map: device.uniform_location(program, "irradianceMap"),
            environment_filter_map: device.uniform_location(program, "environmentFilterMap"),
            brdf_texture: device.uniform_location(program, "brdfTexture"),
            light_positions: device.uniform_location(program, "lightPositions"),
            light_colors: device.uniform_location(program, "lightColors"),
            light_brightnesses: device.uniform_location(program, "lightBrightnesses"),
            light_intensities: device.uniform_location(program, "lightIntensities"),
        }
    }

    fn upload(&self, device: &mut dyn GpuDevice, frame: &FrameParams<'_>, first_ibl_unit: i32) {
        set_vec3(device, self.eye_center, frame.eye_center);
        set_int(device, self.irradiance_map, first_ibl_unit);
        set_int(device, self.environment_filter_map, first_ibl_unit + 1);
        set_int(device, self.brdf_texture, first_ibl_unit + 2);

        let positions: Vec<[f32; 3]> = frame.lights.iter().map(|l| l.position.into()).collect();
        let colors: Vec<[f32; 4]> = frame.lights.iter().map(|l| l.color).collect();
        let brightnesses: Vec<f32> = frame.lights.iter().map(|l| l.brightness).collect();
        let intensities: Vec<f32> = frame.lights.iter().map(|l| l.intensity).collect();
        if self.light_positions.is_used() {
            device.uniform_vec3_array(self.light_positions, &positions);
        }
        if self.light_colors.is_used() {
            device.uniform_vec4_array(self.light_colors, &colors);
        }
        if self.light_brightnesses.is_used() {
            device.uniform_float_array(self.light_brightnesses, &brightnesses);
        }
        if self.light_intensities.is_used() {
            device.uniform_float_array(self.light_intensities, &intensities);
        }
    }
}

/// Forward PBR program with its uniform locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbrShader {
    /// Program handle
    pub program: ProgramHandle,
    /// `view`
    pub view: UniformLocation,
    /// `projection`
    pub projection: UniformLocation,
    /// `albedoTexture`
    pub albedo_texture: UniformLocation,
    /// `metalnessTexture`
    pub metalness_texture: UniformLocation,
    /// `roughnessTexture`
    pub roughness_texture: UniformLocation,
    /// `normalTexture`
    pub normal_texture: UniformLocation,
    /// `ambientOcclusionTexture`
    pub ambient_occlusion_texture: UniformLocation,
    /// Lighting and image-based-lighting uniforms
    pub lighting: LightingUniforms,
}

/// Deferred second-pass program with its uniform locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredLightingShader {
    /// Program handle
    pub program: ProgramHandle,
    /// `positionTexture`
    pub position_texture: UniformLocation,
    /// `albedoTexture`
    pub albedo_texture: UniformLocation,
    /// `materialTexture`
    pub material_texture: UniformLocation,
    /// `normalTexture`
    pub normal_texture: UniformLocation,
    /// Lighting and image-based-lighting uniforms
    pub lighting: LightingUniforms,
}

/// Vertex and fragment sources split out of one shader file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    /// Vertex stage
    pub vertex: String,
    /// Fragment stage
    pub fragment: String,
}

impl ShaderSource {
    /// Split a file's text at the stage marker lines
    pub fn parse(path: &Path, text: &str) -> Result<Self, ShaderError> {
        enum Stage {
            Preamble,
            Vertex,
            Fragment,
        }
        let mut stage = Stage::Preamble;
        let (mut vertex, mut fragment) = (None::<String>, None::<String>);
        for line in text.lines() {
            match line.trim() {
                VERTEX_MARKER => {
                    stage = Stage::Vertex;
                    vertex.get_or_insert_with(String::new);
                }
                FRAGMENT_MARKER => {
                    stage = Stage::Fragment;
                    fragment.get_or_insert_with(String::new);
                }
                _ => {
                    let target = match stage {
                        Stage::Preamble => continue,
                        Stage::Vertex => vertex.as_mut(),
                        Stage::Fragment => fragment.as_mut(),
                    };
                    if let Some(source) = target {
                        source.push_str(line);
                        source.push('\n');
                    }
                }
            }
        }
        Ok(Self {
            vertex: vertex.ok_or_else(|| ShaderError::MissingStage {
                path: path.to_path_buf(),
                marker: VERTEX_MARKER,
            })?,
            fragment: fragment.ok_or_else(|| ShaderError::MissingStage {
                path: path.to_path_buf(),
                marker: FRAGMENT_MARKER,
            })?,
        })
    }

    /// Read and split a shader file
    pub fn from_file(path: &Path) -> Result<Self, ShaderError> {
        let text = std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }
}

fn build_program(device: &mut dyn GpuDevice, path: &Path) -> Result<ProgramHandle, ShaderError> {
    let source = ShaderSource::from_file(path)?;
    device
        .create_program(&source.vertex, &source.fragment)
        .map_err(|source| ShaderError::Build { path: path.to_path_buf(), source })
}

/// Build the forward PBR program and resolve its uniforms
pub fn load_pbr_shader(device: &mut dyn GpuDevice, path: &Path) -> Result<PbrShader, ShaderError> {
    let program = build_program(device, path)?;
    let shader = PbrShader {
        program,
        view: device.uniform_location(program, "view"),
        projection: device.uniform_location(program, "projection"),
        albedo_texture: device.uniform_location(program, "albedoTexture"),
        metalness_texture: device.uniform_location(program, "metalnessTexture"),
        roughness_texture: device.uniform_location(program, "roughnessTexture"),
        normal_texture: device.uniform_location(program, "normalTexture"),
        ambient_occlusion_texture: device.uniform_location(program, "ambientOcclusionTexture"),
        lighting: LightingUniforms::resolve(device, program),
    };
    log::info!("Loaded PBR shader {:?} as {:?}", path, program);
    Ok(shader)
}

/// Build the deferred second-pass program and resolve its uniforms
pub fn load_deferred_lighting_shader(
    device: &mut dyn GpuDevice,
    path: &Path,
) -> Result<DeferredLightingShader, ShaderError> {
    let program = build_program(device, path)?;
    let shader = DeferredLightingShader {
        program,
        position_texture: device.uniform_location(program, "positionTexture"),
        albedo_texture: device.uniform_location(program, "albedoTexture"),
        material_texture: device.uniform_location(program, "materialTexture"),
        normal_texture: device.uniform_location(program, "normalTexture"),
        lighting: LightingUniforms::resolve(device, program),
    };
    log::info!("Loaded deferred lighting shader {:?} as {:?}", path, program);
    Ok(shader)
}

fn set_int(device: &mut dyn GpuDevice, location: UniformLocation, value: i32) {
    if location.is_used() {
        device.uniform_int(location, value);
    }
}

fn set_vec3(device: &mut dyn GpuDevice, location: UniformLocation, value: Vec3) {
    if location.is_used() {
        device.uniform_vec3(location, value.into());
    }
}

fn set_mat4(device: &mut dyn GpuDevice, location: UniformLocation, value: &Mat4) {
    if location.is_used() {
        let mut columns = [0.0f32; 16];
        columns.copy_from_slice(value.as_slice());
        device.uniform_mat4(location, &columns);
    }
}

/// Bind `(target, texture)` pairs to units `0..n`
fn bind_texture_units(device: &mut dyn GpuDevice, textures: &[(TextureTarget, TextureHandle)]) {
    for (unit, (target, texture)) in textures.iter().enumerate() {
        device.active_texture(unit as u32);
        device.bind_texture(*target, Some(*texture));
    }
}

/// Unbind units `n-1..=0`, the reverse of [`bind_texture_units`]
fn unbind_texture_units(device: &mut dyn GpuDevice, textures: &[(TextureTarget, TextureHandle)]) {
    for (unit, (target, _)) in textures.iter().enumerate().rev() {
        device.active_texture(unit as u32);
        device.bind_texture(*target, None);
    }
}

fn gpu_of(geometry: &Geometry) -> Result<&GpuGeometry, ShaderError> {
    geometry.gpu().ok_or(ShaderError::NotRenderable)
}

/// Draw every instance of one (material, geometry) pair in a single call
///
/// `models` holds one world matrix per instance; it is uploaded into the
/// geometry's instance buffer before the draw. An empty batch is a no-op.
pub fn draw_surface_batch(
    device: &mut dyn GpuDevice,
    shader: &PbrShader,
    frame: &FrameParams<'_>,
    models: &[Mat4],
    blending: bool,
    material: &Material,
    geometry: &Geometry,
) -> Result<(), ShaderError> {
    let gpu = gpu_of(geometry)?;
    if models.is_empty() {
        return Ok(());
    }

    // setup state
    device.depth_mask(true);
    device.depth_func(DepthFunc::LessOrEqual);
    device.set_capability(Capability::DepthTest, true);
    if blending {
        device.blend_func(BlendMode::Alpha);
        device.set_capability(Capability::Blend, true);
    }
    device.set_capability(Capability::CullFace, true);
    device.set_capability(Capability::TextureCubeMapSeamless, true);

    // setup shader
    device.use_program(Some(shader.program));
    set_mat4(device, shader.view, &frame.view);
    set_mat4(device, shader.projection, &frame.projection);
    set_int(device, shader.albedo_texture, 0);
    set_int(device, shader.metalness_texture, 1);
    set_int(device, shader.roughness_texture, 2);
    set_int(device, shader.normal_texture, 3);
    set_int(device, shader.ambient_occlusion_texture, 4);
    shader.lighting.upload(device, frame, 5);
    let textures = [
        (TextureTarget::Texture2d, material.albedo),
        (TextureTarget::Texture2d, material.metalness),
        (TextureTarget::Texture2d, material.roughness),
        (TextureTarget::Texture2d, material.normal),
        (TextureTarget::Texture2d, material.ambient_occlusion),
        (TextureTarget::CubeMap, frame.irradiance_map),
        (TextureTarget::CubeMap, frame.environment_filter_map),
        (TextureTarget::Texture2d, frame.brdf_texture),
    ];
    bind_texture_units(device, &textures);

    // update instance models
    let fields: Vec<f32> = models.iter().flat_map(|m| m.as_slice().iter().copied()).collect();
    device.bind_buffer(BufferTarget::Array, Some(gpu.model_buffer));
    {
        let staging = StagingBuffer::new(&fields);
        staging.upload(device, BufferTarget::Array, BufferUsage::DynamicDraw);
    }
    device.bind_buffer(BufferTarget::Array, None);

    // setup geometry
    device.bind_vertex_array(Some(gpu.vao));
    device.bind_buffer(BufferTarget::Array, Some(gpu.vertex_buffer));
    device.bind_buffer(BufferTarget::ElementArray, Some(gpu.index_buffer));

    device.draw_elements_instanced(geometry.topology(), geometry.element_count(), models.len() as u32);

    // teardown geometry
    device.bind_buffer(BufferTarget::ElementArray, None);
    device.bind_buffer(BufferTarget::Array, None);
    device.bind_vertex_array(None);

    // teardown shader
    unbind_texture_units(device, &textures);
    device.use_program(None);

    // teardown state
    device.set_capability(Capability::TextureCubeMapSeamless, false);
    device.set_capability(Capability::CullFace, false);
    if blending {
        device.set_capability(Capability::Blend, false);
        device.blend_func(BlendMode::Replace);
    }
    device.set_capability(Capability::DepthTest, false);
    device.depth_func(DepthFunc::Less);
    device.depth_mask(false);
    Ok(())
}

/// Light the G-buffer onto a full-screen quad with one non-instanced draw
pub fn draw_deferred_second_pass(
    device: &mut dyn GpuDevice,
    shader: &DeferredLightingShader,
    frame: &FrameParams<'_>,
    gbuffer: &GBuffer,
    quad: &Geometry,
) -> Result<(), ShaderError> {
    let gpu = gpu_of(quad)?;

    // setup state
    // depth and cull state are left alone; the pass covers a full-screen quad
    device.set_capability(Capability::TextureCubeMapSeamless, true);

    // setup shader
    device.use_program(Some(shader.program));
    set_int(device, shader.position_texture, 0);
    set_int(device, shader.albedo_texture, 1);
    set_int(device, shader.material_texture, 2);
    set_int(device, shader.normal_texture, 3);
    shader.lighting.upload(device, frame, 4);
    let textures = [
        (TextureTarget::Texture2d, gbuffer.position),
        (TextureTarget::Texture2d, gbuffer.albedo),
        (TextureTarget::Texture2d, gbuffer.material),
        (TextureTarget::Texture2d, gbuffer.normal),
        (TextureTarget::CubeMap, frame.irradiance_map),
        (TextureTarget::CubeMap, frame.environment_filter_map),
        (TextureTarget::Texture2d, frame.brdf_texture),
    ];
    bind_texture_units(device, &textures);

    // setup geometry
    device.bind_vertex_array(Some(gpu.vao));
    device.bind_buffer(BufferTarget::Array, Some(gpu.vertex_buffer));
    device.bind_buffer(BufferTarget::ElementArray, Some(gpu.index_buffer));

    device.draw_elements(quad.topology(), quad.element_count());

    // teardown geometry
    device.bind_buffer(BufferTarget::ElementArray, None);
    device.bind_buffer(BufferTarget::Array, None);
    device.bind_vertex_array(None);

    // teardown shader
    unbind_texture_units(device, &textures);
    device.use_program(None);

    // teardown state
    device.set_capability(Capability::TextureCubeMapSeamless, false);
    Ok(())
}
