//! Static model assembly
//!
//! A static model is a flat list of surfaces built from an imported scene:
//! every (node, mesh) pair becomes one surface carrying the node's world
//! transform, the mesh geometry and its material. Models are immutable once
//! built; reloading an asset replaces the whole model.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use super::geometry::{extract_geometry, GeometryDescriptor, GeometryError};
use super::gpu::GpuDevice;
use super::import::{ImportError, ImportedScene, PostProcessSteps, SceneImporter};
use super::material::{load_materials, Material, MaterialError, TextureCache};
use super::resources::{create_geometry, Geometry};
use crate::foundation::math::{hash_matrix, Box3, Mat4};

/// Errors raised while loading a static model, annotated with the model file
#[derive(Error, Debug)]
pub enum ModelError {
    /// The importer failed or aborted
    #[error("Could not import model {path:?}")]
    Import {
        /// Model file
        path: PathBuf,
        /// Importer failure
        #[source]
        cause: ImportError,
    },
    /// A material failed to load
    #[error("Could not load materials of model {path:?}")]
    Material {
        /// Model file
        path: PathBuf,
        /// Material failure
        #[source]
        source: MaterialError,
    },
    /// A mesh could not be converted to geometry
    #[error("Could not build geometry of model {path:?}")]
    Geometry {
        /// Model file
        path: PathBuf,
        /// Geometry failure
        #[source]
        source: GeometryError,
    },
    /// A node references a mesh that does not exist
    #[error("Node '{node}' of model {path:?} references missing mesh {index}")]
    MeshIndexOutOfRange {
        /// Model file
        path: PathBuf,
        /// Node name
        node: String,
        /// Mesh index
        index: usize,
    },
    /// A mesh references a material that does not exist
    #[error("Mesh {mesh} of model {path:?} references missing material {index}")]
    MaterialIndexOutOfRange {
        /// Model file
        path: PathBuf,
        /// Mesh index
        mesh: usize,
        /// Material index
        index: usize,
    },
}

/// One drawable unit of a static model
///
/// The structural hash over transform, material and geometry identity is
/// computed once at construction; surfaces are never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Surface {
    transform: Mat4,
    bounds: Box3,
    material: Material,
    geometry: Rc<Geometry>,
    hash: u64,
}

impl Surface {
    /// Build a surface; its bounds are the geometry's local bounds
    pub fn new(transform: Mat4, material: Material, geometry: Rc<Geometry>) -> Self {
        let mut hasher = DefaultHasher::new();
        hash_matrix(&transform, &mut hasher);
        material.hash(&mut hasher);
        Rc::as_ptr(&geometry).hash(&mut hasher);
        Self {
            transform,
            bounds: geometry.bounds(),
            material,
            geometry,
            hash: hasher.finish(),
        }
    }

    /// World transform
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// Local (geometry) bounds
    pub fn bounds(&self) -> Box3 {
        self.bounds
    }

    /// Bounds transformed into model space
    pub fn world_bounds(&self) -> Box3 {
        self.bounds.transform(&self.transform)
    }

    /// Material
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Geometry shared with the owning model
    pub fn geometry(&self) -> &Rc<Geometry> {
        &self.geometry
    }

    /// Memoized structural hash
    pub fn structural_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.material == other.material
            && Rc::ptr_eq(&self.geometry, &other.geometry)
            && self
                .transform
                .iter()
                .zip(other.transform.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for Surface {}

impl Hash for Surface {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Aggregate bounds plus an ordered list of surfaces
#[derive(Debug)]
pub struct StaticModel {
    bounds: Box3,
    surfaces: Vec<Surface>,
    geometries: Vec<Rc<Geometry>>,
}

impl StaticModel {
    /// Model made of a single geometry drawn with one material
    ///
    /// Used for procedural fallback and test models.
    pub fn from_descriptor(
        renderable: bool,
        device: &mut dyn GpuDevice,
        descriptor: &GeometryDescriptor,
        material: Material,
    ) -> Self {
        let geometry = Rc::new(create_geometry(renderable, device, descriptor));
        let surface = Surface::new(Mat4::identity(), material, Rc::clone(&geometry));
        Self {
            bounds: surface.world_bounds(),
            surfaces: vec![surface],
            geometries: vec![geometry],
        }
    }

    /// Union of every surface's transformed bounds
    pub fn bounds(&self) -> Box3 {
        self.bounds
    }

    /// Surfaces in scene-walk order
    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    /// Free every geometry's GPU objects exactly once
    ///
    /// Geometry still shared outside the model is reported and left alone.
    pub fn destroy(self, device: &mut dyn GpuDevice) {
        drop(self.surfaces);
        release_geometries(self.geometries, device);
    }
}

fn release_geometries(geometries: Vec<Rc<Geometry>>, device: &mut dyn GpuDevice) {
    for geometry in geometries {
        match Rc::try_unwrap(geometry) {
            Ok(geometry) => geometry.destroy(device),
            Err(shared) => log::warn!(
                "Geometry with {} elements is still shared ({} references); not freed",
                shared.element_count(),
                Rc::strong_count(&shared)
            ),
        }
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Import a scene, converting importer panics into errors
fn import_scene(importer: &mut dyn SceneImporter, path: &Path) -> Result<ImportedScene, ModelError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| importer.import(path, PostProcessSteps::STATIC_MODEL)));
    let imported = match result {
        Ok(imported) => imported,
        Err(payload) => Err(ImportError::Aborted(describe_panic(payload.as_ref()))),
    };
    imported.map_err(|cause| ModelError::Import {
        path: path.to_path_buf(),
        cause,
    })
}

/// Load a static model from a scene file
///
/// Materials load before any geometry, and all geometry is created before
/// surfaces are assembled; a failure at any stage returns that stage's
/// error and frees whatever GPU objects were already created. When
/// `renderable` is false no textures or GPU objects are created and every
/// surface uses [`Material::default`].
pub fn load_static_model(
    renderable: bool,
    path: &Path,
    importer: &mut dyn SceneImporter,
    device: &mut dyn GpuDevice,
    cache: &mut dyn TextureCache,
) -> Result<StaticModel, ModelError> {
    let scene = import_scene(importer, path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let materials = load_materials(renderable, dir, &scene.materials, device, cache).map_err(|source| {
        ModelError::Material {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let mut geometries = Vec::with_capacity(scene.meshes.len());
    for mesh in &scene.meshes {
        match extract_geometry(mesh) {
            Ok(descriptor) => geometries.push(Rc::new(create_geometry(renderable, device, &descriptor))),
            Err(source) => {
                release_geometries(geometries, device);
                return Err(ModelError::Geometry {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    let surfaces = match assemble_surfaces(renderable, path, &scene, &materials, &geometries) {
        Ok(surfaces) => surfaces,
        Err(e) => {
            release_geometries(geometries, device);
            return Err(e);
        }
    };

    let bounds = surfaces
        .iter()
        .map(Surface::world_bounds)
        .reduce(|a, b| a.union(&b))
        .unwrap_or_else(Box3::zero);

    log::info!(
        "Loaded static model {:?}: {} surfaces, {} geometries, {} materials",
        path,
        surfaces.len(),
        geometries.len(),
        materials.len()
    );
    Ok(StaticModel { bounds, surfaces, geometries })
}

fn assemble_surfaces(
    renderable: bool,
    path: &Path,
    scene: &ImportedScene,
    materials: &[Material],
    geometries: &[Rc<Geometry>],
) -> Result<Vec<Surface>, ModelError> {
    let mut surfaces = Vec::new();
    for (node, world) in scene.root.collect_with_transforms() {
        for &mesh_index in &node.meshes {
            let geometry = geometries.get(mesh_index).ok_or_else(|| ModelError::MeshIndexOutOfRange {
                path: path.to_path_buf(),
                node: node.name.clone(),
                index: mesh_index,
            })?;
            let material = if renderable {
                let index = scene.meshes[mesh_index].material_index;
                *materials.get(index).ok_or_else(|| ModelError::MaterialIndexOutOfRange {
                    path: path.to_path_buf(),
                    mesh: mesh_index,
                    index,
                })?
            } else {
                Material::default()
            };
            surfaces.push(Surface::new(world, material, Rc::clone(geometry)));
        }
    }
    Ok(surfaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::geometry::cube_geometry;
    use crate::render::gpu::TextureHandle;
    use crate::render::import::{ImportedMesh, ImportedNode, MaterialDescription, TextureChannel};
    use crate::render::material::tests::{full_description, FakeTextureCache};
    use crate::render::material::MaterialError;
    use crate::render::recorder::RecordingDevice;

    fn triangle(name: &str, offset: f32, material_index: usize) -> ImportedMesh {
        ImportedMesh {
            name: name.to_string(),
            positions: vec![[offset, 0.0, 0.0], [offset + 1.0, 0.0, 0.0], [offset, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tex_coords: vec![vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]],
            faces: vec![[0, 1, 2]],
            material_index,
        }
    }

    fn scene(materials: Vec<MaterialDescription>) -> ImportedScene {
        let root = ImportedNode::new("root", Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)), vec![0])
            .with_child(ImportedNode::new("a", Mat4::new_scaling(2.0), vec![0, 1]));
        ImportedScene {
            meshes: vec![triangle("left", 0.0, 0), triangle("right", 3.0, 1)],
            materials,
            root,
        }
    }

    struct FakeImporter {
        scene: Option<ImportedScene>,
        steps: Option<PostProcessSteps>,
    }

    impl SceneImporter for FakeImporter {
        fn import(&mut self, _path: &Path, steps: PostProcessSteps) -> Result<ImportedScene, ImportError> {
            self.steps = Some(steps);
            match &self.scene {
                Some(scene) => Ok(scene.clone()),
                None => panic!("corrupt chunk header"),
            }
        }
    }

    fn importer(scene: ImportedScene) -> FakeImporter {
        FakeImporter { scene: Some(scene), steps: None }
    }

    #[test]
    fn test_surface_identity() {
        let mut device = RecordingDevice::new();
        let geometry = Rc::new(create_geometry(false, &mut device, &cube_geometry()));
        let other_geometry = Rc::new(create_geometry(false, &mut device, &cube_geometry()));
        let material = Material { albedo: TextureHandle(7), ..Material::default() };
        let transform = Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0));

        let a = Surface::new(transform, material, Rc::clone(&geometry));
        let b = Surface::new(transform, material, Rc::clone(&geometry));
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());

        let moved = Surface::new(Mat4::identity(), material, Rc::clone(&geometry));
        let recolored = Surface::new(transform, Material::default(), Rc::clone(&geometry));
        let reshaped = Surface::new(transform, material, other_geometry);
        for changed in [moved, recolored, reshaped] {
            assert_ne!(a, changed);
            assert_ne!(a.structural_hash(), changed.structural_hash());
        }
    }

    #[test]
    fn test_load_builds_one_surface_per_node_mesh_pair() {
        let mut device = RecordingDevice::new();
        let mut cache = FakeTextureCache::default();
        let mut importer = importer(scene(vec![full_description("brick"), full_description("stone")]));

        let model = load_static_model(true, Path::new("models/pair.obj"), &mut importer, &mut device, &mut cache).unwrap();
        assert_eq!(importer.steps, Some(PostProcessSteps::STATIC_MODEL));
        assert_eq!(model.surfaces().len(), 3);
        for surface in model.surfaces() {
            assert!(model.bounds().contains_box(&surface.world_bounds()));
        }
        // "right" under a: translate(1,0,0) * scale(2) puts its far corner at x = 1 + 2 * 4
        assert!((model.bounds().max().x - 9.0).abs() < 1e-5);
        assert_ne!(model.surfaces()[1].material(), model.surfaces()[2].material());
        assert!(Rc::ptr_eq(model.surfaces()[0].geometry(), model.surfaces()[1].geometry()));
        assert_eq!(cache.loads.len(), 10);

        model.destroy(&mut device);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_missing_channel_fails_without_partial_model() {
        let mut device = RecordingDevice::new();
        let mut cache = FakeTextureCache::default();
        let mut stone = full_description("stone");
        stone.textures.remove(&TextureChannel::Normals);
        let mut importer = importer(scene(vec![full_description("brick"), stone]));

        let err = load_static_model(true, Path::new("models/pair.obj"), &mut importer, &mut device, &mut cache)
            .unwrap_err();
        match err {
            ModelError::Material { path, source: MaterialError::MissingTextureChannel { material, channel } } => {
                assert_eq!(path, Path::new("models/pair.obj"));
                assert_eq!(material, "stone");
                assert_eq!(channel, TextureChannel::Normals);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_bad_mesh_releases_created_geometry() {
        let mut device = RecordingDevice::new();
        let mut cache = FakeTextureCache::default();
        let mut broken = scene(vec![full_description("brick"), full_description("stone")]);
        broken.meshes[1].normals.clear();
        let mut importer = importer(broken);

        let err = load_static_model(true, Path::new("pair.obj"), &mut importer, &mut device, &mut cache).unwrap_err();
        assert!(matches!(err, ModelError::Geometry { .. }));
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_importer_panic_becomes_error() {
        let mut device = RecordingDevice::new();
        let mut cache = FakeTextureCache::default();
        let mut importer = FakeImporter { scene: None, steps: None };
        let err = load_static_model(true, Path::new("bad.obj"), &mut importer, &mut device, &mut cache).unwrap_err();
        match err {
            ModelError::Import { path, cause: ImportError::Aborted(message) } => {
                assert_eq!(path, Path::new("bad.obj"));
                assert!(message.contains("corrupt chunk header"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_headless_load_uses_default_materials() {
        let mut device = RecordingDevice::new();
        let mut cache = FakeTextureCache::default();
        // headless loads never look at material descriptions
        let mut importer = importer(scene(Vec::new()));
        let model = load_static_model(false, Path::new("pair.obj"), &mut importer, &mut device, &mut cache).unwrap();
        assert!(device.calls().is_empty());
        assert!(cache.loads.is_empty());
        assert!(model.surfaces().iter().all(|s| *s.material() == Material::default()));
        assert_eq!(model.surfaces()[0].geometry().vertices().len(), 3);
    }

    #[test]
    fn test_missing_mesh_reference() {
        let mut device = RecordingDevice::new();
        let mut cache = FakeTextureCache::default();
        let mut dangling = scene(Vec::new());
        dangling.root.children[0].meshes.push(5);
        let mut importer = importer(dangling);
        let err = load_static_model(false, Path::new("pair.obj"), &mut importer, &mut device, &mut cache).unwrap_err();
        assert!(matches!(err, ModelError::MeshIndexOutOfRange { index: 5, .. }));
    }
}
