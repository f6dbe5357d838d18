//! Recording GPU backend
//!
//! Implements [`GpuDevice`] without a graphics context. Every call is appended
//! to a log so callers can inspect the exact call sequence, and handles are
//! allocated sequentially starting at 1.

use std::collections::{HashMap, HashSet};

use super::gpu::{
    BlendMode, BufferHandle, BufferTarget, BufferUsage, Capability, DepthFunc, GpuDevice, GpuError,
    PrimitiveTopology, ProgramHandle, TextureFilter, TextureHandle, TextureTarget, UniformLocation,
    VertexArrayHandle,
};

/// One recorded GPU call
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    /// Vertex array created
    CreateVertexArray(VertexArrayHandle),
    /// Vertex array bound or unbound
    BindVertexArray(Option<VertexArrayHandle>),
    /// Vertex array deleted
    DeleteVertexArray(VertexArrayHandle),
    /// Buffer created
    CreateBuffer(BufferHandle),
    /// Buffer bound or unbound
    BindBuffer(BufferTarget, Option<BufferHandle>),
    /// Data uploaded to the bound buffer
    BufferData {
        /// Target the data went to
        target: BufferTarget,
        /// Number of bytes uploaded
        bytes: usize,
        /// Usage hint
        usage: BufferUsage,
    },
    /// Buffer deleted
    DeleteBuffer(BufferHandle),
    /// Attribute array enabled
    EnableVertexAttrib(u32),
    /// Attribute layout described
    VertexAttribPointer {
        /// Attribute index
        index: u32,
        /// Float components
        components: u32,
        /// Stride in bytes
        stride: u32,
        /// Offset in bytes
        offset: u32,
    },
    /// Instance divisor set
    VertexAttribDivisor(u32, u32),
    /// Program created
    CreateProgram(ProgramHandle),
    /// Program deleted
    DeleteProgram(ProgramHandle),
    /// Program made current
    UseProgram(Option<ProgramHandle>),
    /// Uniform upload (location and a short description of the payload)
    Uniform(UniformLocation, UniformPayload),
    /// Texture unit selected
    ActiveTexture(u32),
    /// Texture bound to the active unit
    BindTexture(TextureTarget, Option<TextureHandle>),
    /// Texture created
    CreateTexture(TextureHandle),
    /// Texture deleted
    DeleteTexture(TextureHandle),
    /// Capability toggled
    SetCapability(Capability, bool),
    /// Depth write toggled
    DepthMask(bool),
    /// Depth function set
    DepthFunc(DepthFunc),
    /// Blend factors set
    BlendFunc(BlendMode),
    /// Instanced draw issued
    DrawElementsInstanced {
        /// Primitive topology
        topology: PrimitiveTopology,
        /// Index count
        index_count: u32,
        /// Instance count
        instances: u32,
    },
    /// Non-instanced draw issued
    DrawElements {
        /// Primitive topology
        topology: PrimitiveTopology,
        /// Index count
        index_count: u32,
    },
}

/// Uniform payload as recorded
#[derive(Debug, Clone, PartialEq)]
pub enum UniformPayload {
    /// Integer value
    Int(i32),
    /// Vector value
    Vec3([f32; 3]),
    /// Matrix value
    Mat4([f32; 16]),
    /// Array of `n` elements
    Array(usize),
}

/// A [`GpuDevice`] that records calls instead of executing them
#[derive(Debug, Default)]
pub struct RecordingDevice {
    calls: Vec<GpuCall>,
    next_handle: u32,
    unused_uniforms: HashSet<String>,
    uniform_locations: HashMap<(ProgramHandle, String), UniformLocation>,
    next_location: i32,
    uploads: HashMap<BufferHandle, Vec<u8>>,
    bound_array_buffer: Option<BufferHandle>,
    bound_element_buffer: Option<BufferHandle>,
    live_buffers: HashSet<BufferHandle>,
    live_textures: HashSet<TextureHandle>,
    live_vertex_arrays: HashSet<VertexArrayHandle>,
    fail_programs: bool,
}

impl RecordingDevice {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the named uniforms as optimized out (location `-1`)
    pub fn with_unused_uniforms<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unused_uniforms.extend(names.into_iter().map(Into::into));
        self
    }

    /// Make every subsequent program creation fail to link
    pub fn with_failing_programs(mut self) -> Self {
        self.fail_programs = true;
        self
    }

    /// All calls recorded so far
    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    /// Forget recorded calls (live object tracking is kept)
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Last bytes uploaded into a buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.uploads.get(&buffer).map(Vec::as_slice)
    }

    /// Number of buffers, textures and vertex arrays not yet deleted
    pub fn live_object_count(&self) -> usize {
        self.live_buffers.len() + self.live_textures.len() + self.live_vertex_arrays.len()
    }

    fn allocate(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record(&mut self, call: GpuCall) {
        log::trace!("gpu: {:?}", call);
        self.calls.push(call);
    }
}

impl GpuDevice for RecordingDevice {
    fn create_vertex_array(&mut self) -> VertexArrayHandle {
        let vao = VertexArrayHandle(self.allocate());
        self.live_vertex_arrays.insert(vao);
        self.record(GpuCall::CreateVertexArray(vao));
        vao
    }

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>) {
        self.record(GpuCall::BindVertexArray(vao));
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayHandle) {
        if !self.live_vertex_arrays.remove(&vao) {
            log::error!("Vertex array {:?} deleted twice", vao);
        }
        self.record(GpuCall::DeleteVertexArray(vao));
    }

    fn create_buffer(&mut self) -> BufferHandle {
        let buffer = BufferHandle(self.allocate());
        self.live_buffers.insert(buffer);
        self.record(GpuCall::CreateBuffer(buffer));
        buffer
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        match target {
            BufferTarget::Array => self.bound_array_buffer = buffer,
            BufferTarget::ElementArray => self.bound_element_buffer = buffer,
        }
        self.record(GpuCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let bound = match target {
            BufferTarget::Array => self.bound_array_buffer,
            BufferTarget::ElementArray => self.bound_element_buffer,
        };
        if let Some(buffer) = bound {
            self.uploads.insert(buffer, data.to_vec());
        }
        self.record(GpuCall::BufferData { target, bytes: data.len(), usage });
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if !self.live_buffers.remove(&buffer) {
            log::error!("Buffer {:?} deleted twice", buffer);
        }
        self.uploads.remove(&buffer);
        self.record(GpuCall::DeleteBuffer(buffer));
    }

    fn enable_vertex_attrib(&mut self, index: u32) {
        self.record(GpuCall::EnableVertexAttrib(index));
    }

    fn vertex_attrib_pointer(&mut self, index: u32, components: u32, stride_bytes: u32, offset_bytes: u32) {
        self.record(GpuCall::VertexAttribPointer {
            index,
            components,
            stride: stride_bytes,
            offset: offset_bytes,
        });
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.record(GpuCall::VertexAttribDivisor(index, divisor));
    }

    fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> Result<ProgramHandle, GpuError> {
        if vertex_source.trim().is_empty() {
            return Err(GpuError::Compile("empty vertex stage".to_string()));
        }
        if fragment_source.trim().is_empty() {
            return Err(GpuError::Compile("empty fragment stage".to_string()));
        }
        if self.fail_programs {
            return Err(GpuError::Link("recording device configured to fail".to_string()));
        }
        let program = ProgramHandle(self.allocate());
        self.record(GpuCall::CreateProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.record(GpuCall::DeleteProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> UniformLocation {
        if self.unused_uniforms.contains(name) {
            return UniformLocation::UNUSED;
        }
        let next = &mut self.next_location;
        *self
            .uniform_locations
            .entry((program, name.to_string()))
            .or_insert_with(|| {
                let location = UniformLocation(*next);
                *next += 1;
                location
            })
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.record(GpuCall::UseProgram(program));
    }

    fn uniform_int(&mut self, location: UniformLocation, value: i32) {
        self.record(GpuCall::Uniform(location, UniformPayload::Int(value)));
    }

    fn uniform_vec3(&mut self, location: UniformLocation, value: [f32; 3]) {
        self.record(GpuCall::Uniform(location, UniformPayload::Vec3(value)));
    }

    fn uniform_mat4(&mut self, location: UniformLocation, value: &[f32; 16]) {
        self.record(GpuCall::Uniform(location, UniformPayload::Mat4(*value)));
    }

    fn uniform_float_array(&mut self, location: UniformLocation, values: &[f32]) {
        self.record(GpuCall::Uniform(location, UniformPayload::Array(values.len())));
    }

    fn uniform_vec3_array(&mut self, location: UniformLocation, values: &[[f32; 3]]) {
        self.record(GpuCall::Uniform(location, UniformPayload::Array(values.len())));
    }

    fn uniform_vec4_array(&mut self, location: UniformLocation, values: &[[f32; 4]]) {
        self.record(GpuCall::Uniform(location, UniformPayload::Array(values.len())));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(GpuCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>) {
        self.record(GpuCall::BindTexture(target, texture));
    }

    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
        _min_filter: TextureFilter,
        _mag_filter: TextureFilter,
    ) -> Result<TextureHandle, GpuError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(GpuError::Texture(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected,
                width,
                height,
                rgba.len()
            )));
        }
        let texture = TextureHandle(self.allocate());
        self.live_textures.insert(texture);
        self.record(GpuCall::CreateTexture(texture));
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if !self.live_textures.remove(&texture) {
            log::error!("Texture {:?} deleted twice", texture);
        }
        self.record(GpuCall::DeleteTexture(texture));
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.record(GpuCall::SetCapability(capability, enabled));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GpuCall::DepthMask(write));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.record(GpuCall::DepthFunc(func));
    }

    fn blend_func(&mut self, mode: BlendMode) {
        self.record(GpuCall::BlendFunc(mode));
    }

    fn draw_elements_instanced(&mut self, topology: PrimitiveTopology, index_count: u32, instances: u32) {
        self.record(GpuCall::DrawElementsInstanced { topology, index_count, instances });
    }

    fn draw_elements(&mut self, topology: PrimitiveTopology, index_count: u32) {
        self.record(GpuCall::DrawElements { topology, index_count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_uniforms_report_minus_one() {
        let mut device = RecordingDevice::new().with_unused_uniforms(["brdfTexture"]);
        let program = device.create_program("void main(){}", "void main(){}").unwrap();
        assert_eq!(device.uniform_location(program, "brdfTexture"), UniformLocation::UNUSED);
        let view = device.uniform_location(program, "view");
        assert!(view.is_used());
        assert_eq!(device.uniform_location(program, "view"), view);
    }

    #[test]
    fn test_buffer_uploads_follow_binding() {
        let mut device = RecordingDevice::new();
        let buffer = device.create_buffer();
        device.bind_buffer(BufferTarget::Array, Some(buffer));
        device.buffer_data(BufferTarget::Array, &[1, 2, 3], BufferUsage::StaticDraw);
        assert_eq!(device.buffer_contents(buffer), Some(&[1u8, 2, 3][..]));
        device.delete_buffer(buffer);
        assert_eq!(device.live_object_count(), 0);
    }
}
