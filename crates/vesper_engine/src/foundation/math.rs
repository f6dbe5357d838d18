//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics and game development.

pub use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Axis-aligned bounding box stored as an origin (minimum corner) and a size
///
/// This is the bounding volume produced by geometry extraction and unioned
/// by static model assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    /// Minimum corner
    pub origin: Vec3,
    /// Extent along each axis (never negative for a non-empty box)
    pub size: Vec3,
}

impl Box3 {
    /// Create a box from its minimum corner and size
    pub fn new(origin: Vec3, size: Vec3) -> Self {
        Self { origin, size }
    }

    /// The degenerate box at the origin
    pub fn zero() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros())
    }

    /// Create a box spanning the given minimum and maximum corners
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self::new(min, max - min)
    }

    /// Smallest box containing every point, or `None` for an empty iterator
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| {
            (min.inf(&p), max.sup(&p))
        });
        Some(Self::from_min_max(min, max))
    }

    /// Maximum corner
    pub fn max(&self) -> Vec3 {
        self.origin + self.size
    }

    /// Center of the box
    pub fn center(&self) -> Vec3 {
        self.origin + self.size * 0.5
    }

    /// The eight corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        let min = self.origin;
        let max = self.max();
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &Self) -> Self {
        Self::from_min_max(self.origin.inf(&other.origin), self.max().sup(&other.max()))
    }

    /// Bounds of this box after transforming all eight corners by `matrix`
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let corners = self
            .corners()
            .map(|corner| matrix.transform_point(&Point3::from(corner)).coords);
        // eight corners, never empty
        Self::from_points(corners).unwrap_or(*self)
    }

    /// Whether the point lies inside or on the boundary of the box
    pub fn contains_point(&self, point: &Vec3) -> bool {
        let max = self.max();
        point.x >= self.origin.x && point.x <= max.x &&
        point.y >= self.origin.y && point.y <= max.y &&
        point.z >= self.origin.z && point.z <= max.z
    }

    /// Whether `other` lies entirely inside this box, with a small tolerance
    pub fn contains_box(&self, other: &Self) -> bool {
        const EPSILON: f32 = 1.0e-4;
        let min = self.origin.add_scalar(-EPSILON);
        let max = self.max().add_scalar(EPSILON);
        let other_max = other.max();
        other.origin.x >= min.x && other.origin.y >= min.y && other.origin.z >= min.z &&
        other_max.x <= max.x && other_max.y <= max.y && other_max.z <= max.z
    }
}

impl Default for Box3 {
    fn default() -> Self {
        Self::zero()
    }
}

/// Hash the bit pattern of a matrix into `state`
///
/// Float matrices are not `Hash`; identical bit patterns hash identically,
/// which is the equality used for surface deduplication.
pub fn hash_matrix<H: std::hash::Hasher>(matrix: &Mat4, state: &mut H) {
    use std::hash::Hash;
    for value in matrix.iter() {
        value.to_bits().hash(state);
    }
}
