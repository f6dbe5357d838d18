//! GPU geometry resources
//!
//! Owns the vertex array and buffers behind every piece of geometry. The
//! renderable/headless choice is made once per build and threaded through
//! every geometry-producing call: headless geometry keeps CPU-side points
//! instead of GPU objects.

use super::geometry::{GeometryDescriptor, VERTEX_STRIDE};
use super::gpu::{
    BufferHandle, BufferTarget, BufferUsage, GpuDevice, PrimitiveTopology, VertexArrayHandle,
};
use crate::foundation::math::{Box3, Point3};

/// Attribute index of the vertex position
pub const POSITION_ATTRIBUTE: u32 = 0;
/// Attribute index of the vertex normal
pub const NORMAL_ATTRIBUTE: u32 = 1;
/// Attribute index of the texture coordinate
pub const TEX_COORD_ATTRIBUTE: u32 = 2;
/// First of the four attribute indices holding the instance model matrix
pub const MODEL_ATTRIBUTE: u32 = 3;

const FLOAT_SIZE: u32 = std::mem::size_of::<f32>() as u32;
const MATRIX_FLOATS: u32 = 16;

/// GPU objects owned by renderable geometry
#[derive(Debug, PartialEq, Eq)]
pub struct GpuGeometry {
    /// Vertex array object
    pub vao: VertexArrayHandle,
    /// Interleaved vertex buffer
    pub vertex_buffer: BufferHandle,
    /// Per-instance model matrix buffer
    pub model_buffer: BufferHandle,
    /// Index buffer
    pub index_buffer: BufferHandle,
}

/// Mesh geometry, immutable after creation
///
/// GPU objects are owned exclusively by this record and freed exactly once by
/// [`Geometry::destroy`], which consumes it.
#[derive(Debug)]
pub struct Geometry {
    bounds: Box3,
    topology: PrimitiveTopology,
    element_count: u32,
    vertices: Vec<Point3>,
    gpu: Option<GpuGeometry>,
}

impl Geometry {
    /// Bounds of the vertex positions
    pub fn bounds(&self) -> Box3 {
        self.bounds
    }

    /// Primitive topology
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Number of indices drawn
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// CPU-side vertex positions (headless geometry only)
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// GPU objects (renderable geometry only)
    pub fn gpu(&self) -> Option<&GpuGeometry> {
        self.gpu.as_ref()
    }

    /// Free the GPU objects
    pub fn destroy(self, device: &mut dyn GpuDevice) {
        if let Some(gpu) = self.gpu {
            device.delete_buffer(gpu.vertex_buffer);
            device.delete_buffer(gpu.model_buffer);
            device.delete_buffer(gpu.index_buffer);
            device.delete_vertex_array(gpu.vao);
        }
    }
}

/// Transient byte copy of data handed to the driver
///
/// The copy lives only for the duration of one upload and is released when
/// the guard drops, whether or not the upload succeeded.
pub struct StagingBuffer {
    bytes: Vec<u8>,
}

impl StagingBuffer {
    /// Stage a slice of plain-old-data values
    pub fn new<T: bytemuck::Pod>(data: &[T]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data).to_vec(),
        }
    }

    /// Staged bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Upload into the buffer bound to `target`
    pub fn upload(&self, device: &mut dyn GpuDevice, target: BufferTarget, usage: BufferUsage) {
        device.buffer_data(target, &self.bytes, usage);
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        log::trace!("Released {} staged bytes", self.bytes.len());
    }
}

/// Create geometry from a descriptor
///
/// Renderable geometry allocates a vertex array plus vertex, instance-model
/// and index buffers; the model matrix occupies four vec4 attributes that
/// advance once per instance. Headless geometry allocates nothing on the GPU
/// and keeps the decoded positions instead.
pub fn create_geometry(
    renderable: bool,
    device: &mut dyn GpuDevice,
    descriptor: &GeometryDescriptor,
) -> Geometry {
    let element_count = descriptor.index_data.len() as u32;
    if !renderable {
        let vertices = descriptor.positions().map(Point3::from).collect();
        return Geometry {
            bounds: descriptor.bounds,
            topology: PrimitiveTopology::Triangles,
            element_count,
            vertices,
            gpu: None,
        };
    }

    let vao = device.create_vertex_array();
    device.bind_vertex_array(Some(vao));

    // vertex buffer
    let vertex_buffer = device.create_buffer();
    device.bind_buffer(BufferTarget::Array, Some(vertex_buffer));
    {
        let staging = StagingBuffer::new(&descriptor.vertex_data);
        staging.upload(device, BufferTarget::Array, BufferUsage::StaticDraw);
    }
    let stride = VERTEX_STRIDE as u32 * FLOAT_SIZE;
    device.enable_vertex_attrib(POSITION_ATTRIBUTE);
    device.vertex_attrib_pointer(POSITION_ATTRIBUTE, 3, stride, 0);
    device.enable_vertex_attrib(NORMAL_ATTRIBUTE);
    device.vertex_attrib_pointer(NORMAL_ATTRIBUTE, 3, stride, 3 * FLOAT_SIZE);
    device.enable_vertex_attrib(TEX_COORD_ATTRIBUTE);
    device.vertex_attrib_pointer(TEX_COORD_ATTRIBUTE, 2, stride, 6 * FLOAT_SIZE);

    // instance model buffer, seeded with one identity matrix
    let model_buffer = device.create_buffer();
    device.bind_buffer(BufferTarget::Array, Some(model_buffer));
    {
        let identity: [f32; 16] = [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let staging = StagingBuffer::new(&identity);
        staging.upload(device, BufferTarget::Array, BufferUsage::DynamicDraw);
    }
    let matrix_stride = MATRIX_FLOATS * FLOAT_SIZE;
    for column in 0..4 {
        let attribute = MODEL_ATTRIBUTE + column;
        device.enable_vertex_attrib(attribute);
        device.vertex_attrib_pointer(attribute, 4, matrix_stride, column * 4 * FLOAT_SIZE);
        device.vertex_attrib_divisor(attribute, 1);
    }

    // index buffer
    let index_buffer = device.create_buffer();
    device.bind_buffer(BufferTarget::ElementArray, Some(index_buffer));
    {
        let staging = StagingBuffer::new(&descriptor.index_data);
        staging.upload(device, BufferTarget::ElementArray, BufferUsage::StaticDraw);
    }

    device.bind_vertex_array(None);
    device.bind_buffer(BufferTarget::Array, None);
    device.bind_buffer(BufferTarget::ElementArray, None);

    log::trace!(
        "Created geometry vao {:?} ({} vertices, {} indices)",
        vao,
        descriptor.vertex_count(),
        element_count
    );

    Geometry {
        bounds: descriptor.bounds,
        topology: PrimitiveTopology::Triangles,
        element_count,
        vertices: Vec::new(),
        gpu: Some(GpuGeometry { vao, vertex_buffer, model_buffer, index_buffer }),
    }
}
