//! Wavefront OBJ/MTL scene importer
//!
//! A small [`SceneImporter`] for `.obj` files and the `.mtl` libraries they
//! reference. Each `o`/`g` statement opens a node; `usemtl` switches the
//! material and starts a new mesh within that node. The requested
//! [`PostProcessSteps`] are applied while meshes are built.

use std::collections::HashMap;
use std::path::Path;

use super::import::{
    ImportError, ImportedMesh, ImportedNode, ImportedScene, MaterialDescription, PostProcessSteps,
    SceneImporter, TextureChannel,
};
use crate::foundation::math::{Mat4, Vec3};

/// Vertex limit applied by [`PostProcessSteps::SPLIT_LARGE_MESHES`]
pub const DEFAULT_SPLIT_VERTEX_LIMIT: usize = 1_000_000;

/// Name of the material used by faces preceding any `usemtl`
const DEFAULT_MATERIAL: &str = "DefaultMaterial";

/// One face corner: position, optional uv and optional normal (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    position: usize,
    tex_coord: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug)]
struct Polygon {
    line: usize,
    corners: Vec<Corner>,
}

#[derive(Debug)]
struct Group {
    node: String,
    material: String,
    polygons: Vec<Polygon>,
}

/// Raw parse state shared by every group
#[derive(Debug, Default)]
struct ObjData {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    tex_coords: Vec<[f32; 2]>,
    groups: Vec<Group>,
    libraries: Vec<String>,
}

/// Importer for Wavefront OBJ files
#[derive(Debug, Clone)]
pub struct ObjImporter {
    split_vertex_limit: usize,
}

impl Default for ObjImporter {
    fn default() -> Self {
        Self {
            split_vertex_limit: DEFAULT_SPLIT_VERTEX_LIMIT,
        }
    }
}

impl ObjImporter {
    /// Create an importer with the default split limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the vertex limit used when splitting large meshes
    pub fn with_split_vertex_limit(mut self, limit: usize) -> Self {
        self.split_vertex_limit = limit.max(3);
        self
    }

    /// Import OBJ text; `dir` resolves `mtllib` references
    pub fn import_str(&self, text: &str, dir: &Path, steps: PostProcessSteps) -> Result<ImportedScene, ImportError> {
        let data = parse_obj(text)?;

        let mut materials = Vec::new();
        for library in &data.libraries {
            let path = dir.join(library);
            match std::fs::read_to_string(&path) {
                Ok(contents) => materials.extend(parse_mtl(&contents)?),
                Err(e) => log::warn!("Material library {:?} unavailable: {}", path, e),
            }
        }

        let mut meshes = Vec::new();
        let mut node_meshes: Vec<(String, Vec<usize>)> = Vec::new();
        for group in &data.groups {
            let material_index = match materials.iter().position(|m: &MaterialDescription| m.name == group.material) {
                Some(index) => index,
                None => {
                    if group.material != DEFAULT_MATERIAL {
                        log::warn!("Material '{}' not found in any library; using an empty description", group.material);
                    }
                    materials.push(MaterialDescription::new(group.material.clone()));
                    materials.len() - 1
                }
            };
            let built = self.build_meshes(&data, group, material_index, steps)?;
            let first = meshes.len();
            meshes.extend(built);
            let indices: Vec<usize> = (first..meshes.len()).collect();
            match node_meshes.iter_mut().find(|(name, _)| *name == group.node) {
                Some((_, existing)) => existing.extend(indices),
                None => node_meshes.push((group.node.clone(), indices)),
            }
        }

        let mut root = ImportedNode::new("root", Mat4::identity(), Vec::new());
        for (name, indices) in node_meshes {
            root = root.with_child(ImportedNode::new(name, Mat4::identity(), indices));
        }
        log::debug!("Imported {} meshes and {} materials", meshes.len(), materials.len());
        Ok(ImportedScene { meshes, materials, root })
    }

    /// Turn one group's polygons into one or more triangle meshes
    fn build_meshes(
        &self,
        data: &ObjData,
        group: &Group,
        material_index: usize,
        steps: PostProcessSteps,
    ) -> Result<Vec<ImportedMesh>, ImportError> {
        let mut triangles = Vec::new();
        for polygon in &group.polygons {
            if polygon.corners.len() < 3 {
                continue;
            }
            if polygon.corners.len() > 3 && !steps.contains(PostProcessSteps::TRIANGULATE) {
                return Err(ImportError::Parse {
                    line: polygon.line,
                    message: format!("{}-sided face without triangulation", polygon.corners.len()),
                });
            }
            // fan triangulation
            for i in 1..polygon.corners.len() - 1 {
                let triangle = [polygon.corners[0], polygon.corners[i], polygon.corners[i + 1]];
                if steps.contains(PostProcessSteps::FIND_DEGENERATES)
                    && (triangle[0].position == triangle[1].position
                        || triangle[1].position == triangle[2].position
                        || triangle[0].position == triangle[2].position)
                {
                    continue;
                }
                triangles.push(triangle);
            }
        }

        let limit = if steps.contains(PostProcessSteps::SPLIT_LARGE_MESHES) {
            self.split_vertex_limit
        } else {
            usize::MAX
        };
        let join = steps.contains(PostProcessSteps::JOIN_IDENTICAL_VERTICES);

        let mut chunks: Vec<(Vec<Corner>, Vec<[u32; 3]>)> = Vec::new();
        let mut corners: Vec<Corner> = Vec::new();
        let mut faces: Vec<[u32; 3]> = Vec::new();
        let mut joined: HashMap<Corner, u32> = HashMap::new();
        for triangle in triangles {
            if corners.len() + 3 > limit {
                chunks.push((std::mem::take(&mut corners), std::mem::take(&mut faces)));
                joined.clear();
            }
            let mut face = [0u32; 3];
            for (slot, corner) in face.iter_mut().zip(triangle) {
                *slot = if join {
                    *joined.entry(corner).or_insert_with(|| {
                        corners.push(corner);
                        (corners.len() - 1) as u32
                    })
                } else {
                    corners.push(corner);
                    (corners.len() - 1) as u32
                };
            }
            if steps.contains(PostProcessSteps::FLIP_WINDING_ORDER) {
                face.reverse();
            }
            faces.push(face);
        }
        if !faces.is_empty() {
            chunks.push((corners, faces));
        }

        let split = chunks.len() > 1;
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, (corners, faces))| {
                let name = if split {
                    format!("{}_{}", group.node, index)
                } else {
                    group.node.clone()
                };
                assemble_mesh(data, name, &corners, faces, material_index, steps)
            })
            .collect()
    }
}

impl SceneImporter for ObjImporter {
    fn import(&mut self, path: &Path, steps: PostProcessSteps) -> Result<ImportedScene, ImportError> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if !extension.eq_ignore_ascii_case("obj") {
            return Err(ImportError::UnsupportedFormat(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        log::debug!("Importing OBJ scene {:?}", path);
        self.import_str(&text, dir, steps)
    }
}

fn lookup<T: Copy>(pool: &[T], index: usize, what: &str) -> Result<T, ImportError> {
    pool.get(index).copied().ok_or_else(|| ImportError::Parse {
        line: 0,
        message: format!("{what} index {} out of range", index + 1),
    })
}

fn assemble_mesh(
    data: &ObjData,
    name: String,
    corners: &[Corner],
    faces: Vec<[u32; 3]>,
    material_index: usize,
    steps: PostProcessSteps,
) -> Result<ImportedMesh, ImportError> {
    let positions = corners
        .iter()
        .map(|c| lookup(&data.positions, c.position, "position"))
        .collect::<Result<Vec<_>, _>>()?;

    let mut normals = Vec::new();
    if corners.iter().all(|c| c.normal.is_some()) {
        for corner in corners {
            normals.push(lookup(&data.normals, corner.normal.unwrap_or_default(), "normal")?);
        }
    } else if steps.contains(PostProcessSteps::GEN_SMOOTH_NORMALS) {
        let flipped = steps.contains(PostProcessSteps::FLIP_WINDING_ORDER);
        normals = smooth_normals(corners, &positions, &faces, flipped, data)?;
    }

    let mut tex_coords = Vec::new();
    if corners.iter().all(|c| c.tex_coord.is_some()) {
        let mut channel = Vec::with_capacity(corners.len());
        for corner in corners {
            channel.push(lookup(&data.tex_coords, corner.tex_coord.unwrap_or_default(), "texture coordinate")?);
        }
        tex_coords.push(channel);
    } else if steps.contains(PostProcessSteps::GEN_UV_COORDS) {
        tex_coords.push(planar_uvs(&positions));
    }

    if steps.contains(PostProcessSteps::FIND_INVALID_DATA) {
        for normal in &mut normals {
            if normal.iter().any(|n| !n.is_finite()) {
                *normal = [0.0; 3];
            }
        }
        for uv in tex_coords.iter_mut().flatten() {
            if uv.iter().any(|n| !n.is_finite()) {
                *uv = [0.0; 2];
            }
        }
    }

    Ok(ImportedMesh {
        name,
        positions,
        normals,
        tex_coords,
        faces,
        material_index,
    })
}

/// Area-weighted normals averaged over every face sharing a position
///
/// Corners carrying an explicit normal keep it.
fn smooth_normals(
    corners: &[Corner],
    positions: &[[f32; 3]],
    faces: &[[u32; 3]],
    flipped: bool,
    data: &ObjData,
) -> Result<Vec<[f32; 3]>, ImportError> {
    let mut accumulated: HashMap<usize, Vec3> = HashMap::new();
    for face in faces {
        let [a, b, c] = face.map(|i| Vec3::from(positions[i as usize]));
        // normals face the authored winding, not the flipped one
        let normal = if flipped { (c - a).cross(&(b - a)) } else { (b - a).cross(&(c - a)) };
        for index in face {
            *accumulated.entry(corners[*index as usize].position).or_insert_with(Vec3::zeros) += normal;
        }
    }
    corners
        .iter()
        .map(|corner| match corner.normal {
            Some(index) => lookup(&data.normals, index, "normal"),
            None => {
                let sum = accumulated.get(&corner.position).copied().unwrap_or_else(Vec3::zeros);
                Ok(sum.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::y).into())
            }
        })
        .collect()
}

/// Project positions onto their XY bounds
fn planar_uvs(positions: &[[f32; 3]]) -> Vec<[f32; 2]> {
    let (mut min, mut max) = ([f32::MAX; 2], [f32::MIN; 2]);
    for p in positions {
        for axis in 0..2 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    let extent = [max[0] - min[0], max[1] - min[1]];
    positions
        .iter()
        .map(|p| {
            let mut uv = [0.0; 2];
            for axis in 0..2 {
                if extent[axis] > f32::EPSILON {
                    uv[axis] = (p[axis] - min[axis]) / extent[axis];
                }
            }
            uv
        })
        .collect()
}

fn parse_floats<const N: usize>(tokens: &[&str], line: usize, what: &str) -> Result<[f32; N], ImportError> {
    let mut values = [0.0; N];
    if tokens.len() < N {
        return Err(ImportError::Parse {
            line,
            message: format!("{what} needs {N} components"),
        });
    }
    for (value, token) in values.iter_mut().zip(tokens) {
        *value = token.parse().map_err(|_| ImportError::Parse {
            line,
            message: format!("Invalid {what} component '{token}'"),
        })?;
    }
    Ok(values)
}

/// Resolve a 1-based (or negative, relative) OBJ index against a pool length
fn parse_index(token: &str, count: usize, line: usize) -> Result<usize, ImportError> {
    let invalid = || ImportError::Parse {
        line,
        message: format!("Invalid index '{token}'"),
    };
    let raw: i64 = token.parse().map_err(|_| invalid())?;
    let resolved = match raw {
        0 => return Err(invalid()),
        r if r > 0 => r - 1,
        r => count as i64 + r,
    };
    if resolved < 0 || resolved as usize >= count {
        return Err(ImportError::Parse {
            line,
            message: format!("Index '{token}' out of range"),
        });
    }
    Ok(resolved as usize)
}

fn parse_corner(token: &str, data: &ObjData, line: usize) -> Result<Corner, ImportError> {
    let mut parts = token.split('/');
    let position = parse_index(parts.next().unwrap_or_default(), data.positions.len(), line)?;
    let tex_coord = match parts.next() {
        Some(t) if !t.is_empty() => Some(parse_index(t, data.tex_coords.len(), line)?),
        _ => None,
    };
    let normal = match parts.next() {
        Some(n) if !n.is_empty() => Some(parse_index(n, data.normals.len(), line)?),
        _ => None,
    };
    Ok(Corner { position, tex_coord, normal })
}

fn parse_obj(text: &str) -> Result<ObjData, ImportError> {
    let mut data = ObjData::default();
    let mut node = "default".to_string();
    let mut material = DEFAULT_MATERIAL.to_string();

    for (number, line) in text.lines().enumerate() {
        let line_number = number + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (command, args) = (tokens[0], &tokens[1..]);
        match command {
            "v" => data.positions.push(parse_floats::<3>(args, line_number, "vertex")?),
            "vn" => data.normals.push(parse_floats::<3>(args, line_number, "normal")?),
            "vt" => data.tex_coords.push(parse_floats::<2>(args, line_number, "texture coordinate")?),
            "o" | "g" => {
                node = args.first().map_or_else(|| "default".to_string(), |n| (*n).to_string());
            }
            "usemtl" => {
                material = args
                    .first()
                    .map(|n| (*n).to_string())
                    .ok_or_else(|| ImportError::Parse { line: line_number, message: "usemtl missing name".into() })?;
            }
            "mtllib" => data.libraries.extend(args.iter().map(|a| (*a).to_string())),
            "f" => {
                let corners = args
                    .iter()
                    .map(|token| parse_corner(token, &data, line_number))
                    .collect::<Result<Vec<_>, _>>()?;
                let polygon = Polygon { line: line_number, corners };
                match data.groups.last_mut() {
                    Some(group) if group.node == node && group.material == material => group.polygons.push(polygon),
                    _ => data.groups.push(Group {
                        node: node.clone(),
                        material: material.clone(),
                        polygons: vec![polygon],
                    }),
                }
            }
            // smoothing groups, lines, points and the rest are ignored
            _ => {}
        }
    }

    if data.positions.is_empty() {
        return Err(ImportError::Parse {
            line: 0,
            message: "No vertices found".to_string(),
        });
    }
    Ok(data)
}

/// Parse MTL text into material descriptions, in file order
///
/// Texture statements map to channels as: `map_Kd` diffuse, `map_Ks`
/// specular, `disp`/`map_Disp` height, `norm`/`map_Bump`/`bump` normals,
/// `map_Ka` ambient, `map_Ke` emissive. Option flags before the file name
/// are skipped.
pub fn parse_mtl(contents: &str) -> Result<Vec<MaterialDescription>, ImportError> {
    let mut materials: Vec<MaterialDescription> = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else { continue };
        let channel = match command {
            "newmtl" => {
                let name = tokens.next().ok_or_else(|| ImportError::Parse {
                    line: number + 1,
                    message: "newmtl missing material name".to_string(),
                })?;
                materials.push(MaterialDescription::new(name));
                continue;
            }
            "map_Kd" => TextureChannel::Diffuse,
            "map_Ks" => TextureChannel::Specular,
            "disp" | "map_Disp" => TextureChannel::Height,
            "norm" | "map_Bump" | "bump" => TextureChannel::Normals,
            "map_Ka" => TextureChannel::Ambient,
            "map_Ke" => TextureChannel::Emissive,
            _ => continue,
        };
        let file = tokens.last().ok_or_else(|| ImportError::Parse {
            line: number + 1,
            message: format!("{command} missing texture path"),
        })?;
        match materials.last_mut() {
            Some(material) => {
                material.textures.insert(channel, file.to_string());
            }
            None => log::warn!("Line {}: {} before any newmtl", number + 1, command),
        }
    }
    Ok(materials)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_OBJ: &str = "\
mtllib quad.mtl
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl brick
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    const QUAD_MTL: &str = "\
newmtl brick
Kd 0.8 0.8 0.8
map_Kd brick_albedo.png
map_Ks brick_metal.png
disp brick_rough.png
map_Bump -bm 1.0 brick_normal.png
map_Ka brick_ao.png
";

    #[test]
    fn test_mtl_channels() {
        let materials = parse_mtl(QUAD_MTL).unwrap();
        assert_eq!(materials.len(), 1);
        let brick = &materials[0];
        assert_eq!(brick.textures[&TextureChannel::Diffuse], "brick_albedo.png");
        assert_eq!(brick.textures[&TextureChannel::Height], "brick_rough.png");
        assert_eq!(brick.textures[&TextureChannel::Normals], "brick_normal.png");
        assert_eq!(brick.textures.len(), 5);
    }

    #[test]
    fn test_import_triangulates_and_resolves_materials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("quad.obj"), QUAD_OBJ).unwrap();
        std::fs::write(dir.path().join("quad.mtl"), QUAD_MTL).unwrap();

        let scene = ObjImporter::new()
            .import(&dir.path().join("quad.obj"), PostProcessSteps::STATIC_MODEL)
            .unwrap();
        assert_eq!(scene.meshes.len(), 1);
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.positions.len(), 4, "identical corners are joined");
        assert_eq!(mesh.normals.len(), 4);
        assert_eq!(mesh.tex_coords.len(), 1);
        assert_eq!(scene.materials[mesh.material_index].name, "brick");
        // fan (0,1,2) flipped
        assert_eq!(mesh.faces[0], [2, 1, 0]);
        assert_eq!(scene.root.children[0].name, "quad");
        assert_eq!(scene.root.children[0].meshes, vec![0]);
    }

    #[test]
    fn test_quads_need_triangulation() {
        let err = ObjImporter::new()
            .import_str(QUAD_OBJ, Path::new("."), PostProcessSteps::empty())
            .unwrap_err();
        assert!(matches!(err, ImportError::Parse { line: 13, .. }));
    }

    #[test]
    fn test_generated_normals_and_uvs() {
        let obj = "v 0 0 0\nv 2 0 0\nv 0 2 0\nf 1 2 3\n";
        let steps = PostProcessSteps::GEN_SMOOTH_NORMALS | PostProcessSteps::GEN_UV_COORDS;
        let scene = ObjImporter::new().import_str(obj, Path::new("."), steps).unwrap();
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.normals, vec![[0.0, 0.0, 1.0]; 3]);
        assert_eq!(mesh.tex_coords[0], vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);

        let bare = ObjImporter::new().import_str(obj, Path::new("."), PostProcessSteps::empty()).unwrap();
        assert!(bare.meshes[0].normals.is_empty());
        assert!(bare.meshes[0].tex_coords.is_empty());
    }

    #[test]
    fn test_degenerates_dropped_and_large_meshes_split() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 2 4 3\nf 1 1 2\n";
        let steps = PostProcessSteps::FIND_DEGENERATES | PostProcessSteps::SPLIT_LARGE_MESHES;
        let scene = ObjImporter::new()
            .with_split_vertex_limit(3)
            .import_str(obj, Path::new("."), steps)
            .unwrap();
        assert_eq!(scene.meshes.len(), 2);
        assert!(scene.meshes.iter().all(|m| m.faces.len() == 1));
        assert_eq!(scene.root.children[0].meshes, vec![0, 1]);
    }

    #[test]
    fn test_negative_indices_and_bad_extension() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let scene = ObjImporter::new().import_str(obj, Path::new("."), PostProcessSteps::empty()).unwrap();
        assert_eq!(scene.meshes[0].faces, vec![[0, 1, 2]]);

        let err = ObjImporter::new()
            .import(Path::new("model.fbx"), PostProcessSteps::STATIC_MODEL)
            .unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
    }
}
