//! Scene import interface
//!
//! In-memory structures produced by a mesh-import library, and the trait the
//! static model assembler drives it through.

use std::collections::HashMap;
use std::path::Path;

use bitflags::bitflags;
use thiserror::Error;

use crate::foundation::math::Mat4;

bitflags! {
    /// Post-processing steps requested from the importer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PostProcessSteps: u32 {
        /// Split polygons into triangles
        const TRIANGULATE = 1 << 0;
        /// Merge vertices with identical position, normal and uv
        const JOIN_IDENTICAL_VERTICES = 1 << 1;
        /// Generate smoothed normals where the source has none
        const GEN_SMOOTH_NORMALS = 1 << 2;
        /// Split meshes exceeding the vertex limit
        const SPLIT_LARGE_MESHES = 1 << 3;
        /// Generate texture coordinates where the source has none
        const GEN_UV_COORDS = 1 << 4;
        /// Reverse the winding of every face
        const FLIP_WINDING_ORDER = 1 << 5;
        /// Drop faces with repeated vertex indices
        const FIND_DEGENERATES = 1 << 6;
        /// Replace NaN normals and uvs with zeros
        const FIND_INVALID_DATA = 1 << 7;
    }
}

impl PostProcessSteps {
    /// The fixed pipeline every static model is imported with
    pub const STATIC_MODEL: Self = Self::TRIANGULATE
        .union(Self::JOIN_IDENTICAL_VERTICES)
        .union(Self::GEN_SMOOTH_NORMALS)
        .union(Self::SPLIT_LARGE_MESHES)
        .union(Self::GEN_UV_COORDS)
        .union(Self::FLIP_WINDING_ORDER)
        .union(Self::FIND_DEGENERATES)
        .union(Self::FIND_INVALID_DATA);
}

/// Errors reported by an importer
#[derive(Error, Debug)]
pub enum ImportError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed source data
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Description
        message: String,
    },
    /// The file type is not supported by this importer
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// The importer panicked; the payload message is kept
    #[error("Importer aborted: {0}")]
    Aborted(String),
}

/// One mesh as delivered by the importer
///
/// Channels are per vertex; `tex_coords` holds one array per uv channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    /// Mesh name
    pub name: String,
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals
    pub normals: Vec<[f32; 3]>,
    /// Texture coordinate channels
    pub tex_coords: Vec<Vec<[f32; 2]>>,
    /// Triangle faces
    pub faces: Vec<[u32; 3]>,
    /// Index into [`ImportedScene::materials`]
    pub material_index: usize,
}

/// Texture slots a material description may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureChannel {
    /// Diffuse color (becomes albedo)
    Diffuse,
    /// Specular (becomes metalness)
    Specular,
    /// Height (becomes roughness)
    Height,
    /// Normal map
    Normals,
    /// Ambient (becomes ambient occlusion)
    Ambient,
    /// Emissive (not consumed by the PBR material)
    Emissive,
}

/// Material as described by the source file: texture file per channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialDescription {
    /// Material name
    pub name: String,
    /// Texture file per channel, relative to the model directory
    pub textures: HashMap<TextureChannel, String>,
}

impl MaterialDescription {
    /// Create an empty description
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            textures: HashMap::new(),
        }
    }

    /// Add a texture channel (builder pattern)
    pub fn with_texture(mut self, channel: TextureChannel, file: impl Into<String>) -> Self {
        self.textures.insert(channel, file.into());
        self
    }
}

/// Node of the imported scene hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedNode {
    /// Node name
    pub name: String,
    /// Transform relative to the parent node
    pub transform: Mat4,
    /// Indices into [`ImportedScene::meshes`]
    pub meshes: Vec<usize>,
    /// Child nodes
    pub children: Vec<ImportedNode>,
}

impl ImportedNode {
    /// Create a leaf node
    pub fn new(name: impl Into<String>, transform: Mat4, meshes: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            transform,
            meshes,
            children: Vec::new(),
        }
    }

    /// Add a child node (builder pattern)
    pub fn with_child(mut self, child: ImportedNode) -> Self {
        self.children.push(child);
        self
    }

    /// Every node with its world transform, parents before children
    ///
    /// World transforms are the pre-multiplied chain `root * ... * parent * node`.
    pub fn collect_with_transforms(&self) -> Vec<(&ImportedNode, Mat4)> {
        let mut nodes = Vec::new();
        let mut stack = vec![(self, self.transform)];
        while let Some((node, world)) = stack.pop() {
            nodes.push((node, world));
            // reverse so children come out in declaration order
            for child in node.children.iter().rev() {
                stack.push((child, world * child.transform));
            }
        }
        nodes
    }
}

/// Complete imported scene
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedScene {
    /// Meshes
    pub meshes: Vec<ImportedMesh>,
    /// Material descriptions
    pub materials: Vec<MaterialDescription>,
    /// Root of the node hierarchy
    pub root: ImportedNode,
}

/// External mesh-import library
pub trait SceneImporter {
    /// Import the scene at `path` applying `steps`
    fn import(&mut self, path: &Path, steps: PostProcessSteps) -> Result<ImportedScene, ImportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_static_model_steps_are_fixed() {
        let steps = PostProcessSteps::STATIC_MODEL;
        assert!(steps.contains(PostProcessSteps::TRIANGULATE));
        assert!(steps.contains(PostProcessSteps::FLIP_WINDING_ORDER));
        assert!(steps.contains(PostProcessSteps::JOIN_IDENTICAL_VERTICES));
    }

    #[test]
    fn test_collect_composes_parent_first() {
        let root = ImportedNode::new("root", Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)), vec![])
            .with_child(
                ImportedNode::new("a", Mat4::new_scaling(2.0), vec![0]).with_child(ImportedNode::new(
                    "b",
                    Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)),
                    vec![1],
                )),
            )
            .with_child(ImportedNode::new("c", Mat4::identity(), vec![0]));

        let nodes = root.collect_with_transforms();
        let names: Vec<_> = nodes.iter().map(|(n, _)| n.name.as_str()).collect();
        assert_eq!(names, vec!["root", "a", "b", "c"]);

        // b: translate(1,0,0) * scale(2) * translate(0,1,0) maps origin to (1,2,0)
        let (_, b_world) = nodes[2];
        let origin = b_world.transform_point(&crate::foundation::math::Point3::origin());
        assert_relative_eq!(origin.coords, Vec3::new(1.0, 2.0, 0.0));
    }
}
