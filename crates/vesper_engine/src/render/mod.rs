//! Rendering system
//!
//! The PBR asset pipeline and GPU draw protocol:
//! - [`geometry`]: mesh data to interleaved vertex/index layout, procedural primitives
//! - [`material`]: five-channel PBR material loading through a texture cache
//! - [`resources`]: vertex arrays and buffers, renderable or headless
//! - [`shader`]: uniform binding and draw state setup/teardown
//! - [`model`]: static model assembly from imported scenes
//! - [`renderer`]: batched static model drawing
//! - [`render_queue`]: layered render messages produced by views
//!
//! Every GPU call goes through the [`gpu::GpuDevice`] trait; [`recorder::RecordingDevice`]
//! is the instrumented headless implementation.

pub mod geometry;
pub mod gpu;
pub mod import;
pub mod material;
pub mod model;
pub mod obj_importer;
pub mod recorder;
pub mod render_queue;
pub mod renderer;
pub mod resources;
pub mod shader;
pub mod texture_cache;

pub use geometry::{cube_geometry, extract_geometry, quad_geometry, GeometryDescriptor, GeometryError};
pub use gpu::{GpuDevice, GpuError, TextureHandle};
pub use import::{ImportError, ImportedScene, PostProcessSteps, SceneImporter};
pub use material::{load_material, load_materials, Material, MaterialError, TextureCache, TextureError};
pub use model::{load_static_model, ModelError, StaticModel, Surface};
pub use obj_importer::ObjImporter;
pub use recorder::RecordingDevice;
pub use render_queue::{
    AssetTag, DrainedFrame, LayeredDescriptor, RenderDescriptor, RenderMessage, RenderMessageQueue, RenderQueue,
};
pub use renderer::{Camera, ImageBasedLighting, PbrRenderer, StaticModelInstance};
pub use resources::{create_geometry, Geometry};
pub use shader::{Light, ShaderError};
pub use texture_cache::ImageTextureCache;
