//! Backend abstraction for GPU calls
//!
//! This module defines the call protocol the geometry, material and shader
//! code drives. A backend implements [`GpuDevice`] on the thread that owns the
//! graphics context; [`RecordingDevice`](super::recorder::RecordingDevice)
//! implements it without a context for headless runs and tests.

use thiserror::Error;

/// Handle to a vertex array object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub u32);

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Handle to a texture object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// The null texture (binding it unbinds the unit)
    pub const NONE: Self = Self(0);
}

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

/// Uniform location inside a program; `-1` means the uniform is unused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

impl UniformLocation {
    /// Location of a uniform the linker optimized out
    pub const UNUSED: Self = Self(-1);

    /// Whether uploads to this location should be issued
    pub fn is_used(self) -> bool {
        self.0 >= 0
    }
}

/// Buffer binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data
    ElementArray,
}

/// Expected update frequency of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once, drawn many times
    StaticDraw,
    /// Rewritten every frame
    DynamicDraw,
}

/// Texture binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// Regular 2D texture
    Texture2d,
    /// Cube map (irradiance / environment filter)
    CubeMap,
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// Independent triangles
    Triangles,
    /// Independent lines
    Lines,
    /// Points
    Points,
}

/// Toggleable pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Back face culling
    CullFace,
    /// Alpha blending
    Blend,
    /// Seamless filtering across cube map faces
    TextureCubeMapSeamless,
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFunc {
    /// Pass when closer
    Less,
    /// Pass when closer or equal
    LessOrEqual,
}

/// Blend factor pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// `src * 1 + dst * 0`, the disabled default
    Replace,
    /// `src * alpha + dst * (1 - alpha)`
    Alpha,
}

/// Errors reported by a GPU backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// Shader stage failed to compile
    #[error("Shader compilation failed: {0}")]
    Compile(String),
    /// Program failed to link
    #[error("Program link failed: {0}")]
    Link(String),
    /// Texture upload rejected
    #[error("Texture creation failed: {0}")]
    Texture(String),
}

/// GPU call protocol
///
/// Calls follow OpenGL semantics: objects are bound to targets and state is
/// global to the context. Implementations must be driven from the thread that
/// owns the context.
pub trait GpuDevice {
    /// Create a vertex array object
    fn create_vertex_array(&mut self) -> VertexArrayHandle;
    /// Bind a vertex array object (`None` unbinds)
    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>);
    /// Delete a vertex array object
    fn delete_vertex_array(&mut self, vao: VertexArrayHandle);

    /// Create a buffer object
    fn create_buffer(&mut self) -> BufferHandle;
    /// Bind a buffer to a target (`None` unbinds)
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);
    /// Upload bytes into the buffer bound to `target`
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    /// Delete a buffer object
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Enable a vertex attribute array
    fn enable_vertex_attrib(&mut self, index: u32);
    /// Describe a float vertex attribute sourced from the bound array buffer
    fn vertex_attrib_pointer(&mut self, index: u32, components: u32, stride_bytes: u32, offset_bytes: u32);
    /// Set how many instances advance an attribute (0 = per vertex)
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32);

    /// Compile and link a program from vertex and fragment sources
    fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> Result<ProgramHandle, GpuError>;
    /// Delete a program
    fn delete_program(&mut self, program: ProgramHandle);
    /// Look up a uniform location; unused uniforms yield [`UniformLocation::UNUSED`]
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> UniformLocation;
    /// Make a program current (`None` unbinds)
    fn use_program(&mut self, program: Option<ProgramHandle>);

    /// Upload an integer uniform (sampler unit indices)
    fn uniform_int(&mut self, location: UniformLocation, value: i32);
    /// Upload a vec3 uniform
    fn uniform_vec3(&mut self, location: UniformLocation, value: [f32; 3]);
    /// Upload a column-major 4x4 matrix uniform
    fn uniform_mat4(&mut self, location: UniformLocation, value: &[f32; 16]);
    /// Upload a float array uniform
    fn uniform_float_array(&mut self, location: UniformLocation, values: &[f32]);
    /// Upload a vec3 array uniform
    fn uniform_vec3_array(&mut self, location: UniformLocation, values: &[[f32; 3]]);
    /// Upload a vec4 array uniform
    fn uniform_vec4_array(&mut self, location: UniformLocation, values: &[[f32; 4]]);

    /// Select the active texture unit
    fn active_texture(&mut self, unit: u32);
    /// Bind a texture to the active unit (`None` unbinds)
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>);
    /// Create a 2D RGBA8 texture
    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
        min_filter: TextureFilter,
        mag_filter: TextureFilter,
    ) -> Result<TextureHandle, GpuError>;
    /// Delete a texture
    fn delete_texture(&mut self, texture: TextureHandle);

    /// Enable or disable a pipeline capability
    fn set_capability(&mut self, capability: Capability, enabled: bool);
    /// Enable or disable depth writes
    fn depth_mask(&mut self, write: bool);
    /// Set the depth comparison function
    fn depth_func(&mut self, func: DepthFunc);
    /// Set the blend factors (equation is always additive)
    fn blend_func(&mut self, mode: BlendMode);

    /// Draw `instances` copies of the bound indexed geometry
    fn draw_elements_instanced(&mut self, topology: PrimitiveTopology, index_count: u32, instances: u32);
    /// Draw the bound indexed geometry once
    fn draw_elements(&mut self, topology: PrimitiveTopology, index_count: u32);
}
