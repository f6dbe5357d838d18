//! Geometry extraction and procedural primitives
//!
//! Converts imported mesh data into the flat interleaved layout uploaded to
//! the GPU, and synthesizes the engine's fallback quad and cube directly in
//! that layout.

use thiserror::Error;

use super::import::ImportedMesh;
use crate::foundation::math::{Box3, Vec3};

/// Floats per interleaved vertex: position(3) + normal(3) + uv(2)
pub const VERTEX_STRIDE: usize = 8;

/// Errors raised while extracting geometry from a mesh
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// The mesh lacks a required vertex channel or its channels disagree
    #[error("Incompatible mesh '{mesh}': {reason}")]
    IncompatibleMesh {
        /// Mesh name
        mesh: String,
        /// What is wrong with it
        reason: String,
    },
}

impl GeometryError {
    fn incompatible(mesh: &ImportedMesh, reason: impl Into<String>) -> Self {
        Self::IncompatibleMesh {
            mesh: mesh.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Flat vertex/index data ready for upload, plus its bounds
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryDescriptor {
    /// Interleaved `[pos3, normal3, uv2]` floats
    pub vertex_data: Vec<f32>,
    /// Triangle indices
    pub index_data: Vec<u32>,
    /// Bounds of every vertex position
    pub bounds: Box3,
}

impl GeometryDescriptor {
    /// Number of vertices in `vertex_data`
    pub fn vertex_count(&self) -> usize {
        self.vertex_data.len() / VERTEX_STRIDE
    }

    /// Positions decoded from the interleaved data
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertex_data
            .chunks_exact(VERTEX_STRIDE)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
    }
}

/// Extract interleaved geometry from an imported mesh
///
/// Face indices are emitted in reverse order to undo the exporter winding
/// convention, and the V texture coordinate is flipped to `1 - v`.
pub fn extract_geometry(mesh: &ImportedMesh) -> Result<GeometryDescriptor, GeometryError> {
    let vertex_count = mesh.positions.len();
    if vertex_count == 0 {
        return Err(GeometryError::incompatible(mesh, "mesh has no vertices"));
    }
    if mesh.normals.is_empty() {
        return Err(GeometryError::incompatible(mesh, "mesh has no normals"));
    }
    let Some(tex_coords) = mesh.tex_coords.first() else {
        return Err(GeometryError::incompatible(mesh, "mesh has no texture coordinate channel 0"));
    };
    if mesh.normals.len() != vertex_count || tex_coords.len() != vertex_count {
        return Err(GeometryError::incompatible(
            mesh,
            format!(
                "channel lengths disagree ({} positions, {} normals, {} uvs)",
                vertex_count,
                mesh.normals.len(),
                tex_coords.len()
            ),
        ));
    }

    let mut vertex_data = Vec::with_capacity(vertex_count * VERTEX_STRIDE);
    for ((position, normal), uv) in mesh.positions.iter().zip(&mesh.normals).zip(tex_coords) {
        vertex_data.extend_from_slice(position);
        vertex_data.extend_from_slice(normal);
        vertex_data.push(uv[0]);
        vertex_data.push(1.0 - uv[1]);
    }

    let mut index_data = Vec::with_capacity(mesh.faces.len() * 3);
    for face in &mesh.faces {
        if let Some(bad) = face.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(GeometryError::incompatible(
                mesh,
                format!("face index {} out of range for {} vertices", bad, vertex_count),
            ));
        }
        index_data.extend(face.iter().rev());
    }

    let bounds = Box3::from_points(mesh.positions.iter().map(|p| Vec3::new(p[0], p[1], p[2])))
        .unwrap_or_default();

    Ok(GeometryDescriptor { vertex_data, index_data, bounds })
}

/// Unit quad in the XY plane facing +Z, centered at the origin
///
/// Also used as the full-screen quad of the deferred lighting pass.
pub fn quad_geometry() -> GeometryDescriptor {
    #[rustfmt::skip]
    let vertex_data = vec![
        // position          normal           uv
        -1.0, -1.0, 0.0,     0.0, 0.0, 1.0,   0.0, 0.0,
         1.0, -1.0, 0.0,     0.0, 0.0, 1.0,   1.0, 0.0,
         1.0,  1.0, 0.0,     0.0, 0.0, 1.0,   1.0, 1.0,
        -1.0,  1.0, 0.0,     0.0, 0.0, 1.0,   0.0, 1.0,
    ];
    let index_data = vec![0, 1, 2, 2, 3, 0];
    GeometryDescriptor {
        vertex_data,
        index_data,
        bounds: Box3::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(2.0, 2.0, 0.0)),
    }
}

/// Unit cube centered at the origin with one vertex per face corner
///
/// 6 faces x 4 vertices = 24 vertices, so every face gets its own normal.
pub fn cube_geometry() -> GeometryDescriptor {
    #[rustfmt::skip]
    let vertex_data = vec![
        // right
         0.5, -0.5, -0.5,    1.0,  0.0,  0.0,   0.0, 0.0,
         0.5,  0.5, -0.5,    1.0,  0.0,  0.0,   0.0, 1.0,
         0.5,  0.5,  0.5,    1.0,  0.0,  0.0,   1.0, 1.0,
         0.5, -0.5,  0.5,    1.0,  0.0,  0.0,   1.0, 0.0,
        // left
        -0.5, -0.5,  0.5,   -1.0,  0.0,  0.0,   0.0, 0.0,
        -0.5,  0.5,  0.5,   -1.0,  0.0,  0.0,   0.0, 1.0,
        -0.5,  0.5, -0.5,   -1.0,  0.0,  0.0,   1.0, 1.0,
        -0.5, -0.5, -0.5,   -1.0,  0.0,  0.0,   1.0, 0.0,
        // top
        -0.5,  0.5, -0.5,    0.0,  1.0,  0.0,   0.0, 0.0,
        -0.5,  0.5,  0.5,    0.0,  1.0,  0.0,   0.0, 1.0,
         0.5,  0.5,  0.5,    0.0,  1.0,  0.0,   1.0, 1.0,
         0.5,  0.5, -0.5,    0.0,  1.0,  0.0,   1.0, 0.0,
        // bottom
        -0.5, -0.5,  0.5,    0.0, -1.0,  0.0,   0.0, 0.0,
        -0.5, -0.5, -0.5,    0.0, -1.0,  0.0,   0.0, 1.0,
         0.5, -0.5, -0.5,    0.0, -1.0,  0.0,   1.0, 1.0,
         0.5, -0.5,  0.5,    0.0, -1.0,  0.0,   1.0, 0.0,
        // front
        -0.5, -0.5,  0.5,    0.0,  0.0,  1.0,   0.0, 0.0,
         0.5, -0.5,  0.5,    0.0,  0.0,  1.0,   1.0, 0.0,
         0.5,  0.5,  0.5,    0.0,  0.0,  1.0,   1.0, 1.0,
        -0.5,  0.5,  0.5,    0.0,  0.0,  1.0,   0.0, 1.0,
        // back
         0.5, -0.5, -0.5,    0.0,  0.0, -1.0,   0.0, 0.0,
        -0.5, -0.5, -0.5,    0.0,  0.0, -1.0,   1.0, 0.0,
        -0.5,  0.5, -0.5,    0.0,  0.0, -1.0,   1.0, 1.0,
         0.5,  0.5, -0.5,    0.0,  0.0, -1.0,   0.0, 1.0,
    ];
    let index_data = (0..6u32)
        .flat_map(|face| {
            let base = face * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect();
    GeometryDescriptor {
        vertex_data,
        index_data,
        bounds: Box3::new(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(1.0, 1.0, 1.0)),
    }
}
