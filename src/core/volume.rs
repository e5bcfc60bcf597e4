// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::math::aabb::AABB;
use crate::math::constants::{Float, Vector3f};
use crate::textures::provider::TextureHandle;

use std::fmt;

/// Grid size in voxels, X varying fastest in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Dimensions {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }

    pub fn slice_voxels(&self) -> usize {
        self.x * self.y
    }

    /// Total voxel count, or an error if it does not fit in memory indices.
    pub fn voxel_count(&self) -> Result<usize> {
        self.x
            .checked_mul(self.y)
            .and_then(|v| v.checked_mul(self.z))
            .ok_or_else(|| VolumeError::malformed("DimSize", format!("{} overflows", self)))
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.y + y) * self.x + x
    }

    /// Inverse of `index`.
    pub fn coords(&self, index: usize) -> (usize, usize, usize) {
        let x = index % self.x;
        let y = (index / self.x) % self.y;
        let z = index / self.slice_voxels();
        (x, y, z)
    }

    /// Every side halved, rounding up, never below one voxel.
    pub fn halved(&self) -> Self {
        Self {
            x: ((self.x + 1) / 2).max(1),
            y: ((self.y + 1) / 2).max(1),
            z: ((self.z + 1) / 2).max(1),
        }
    }

    pub fn as_vector(&self) -> Vector3f {
        Vector3f::new(self.x as Float, self.y as Float, self.z as Float)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// World placement of a volume: an axis-aligned box covering
/// `dimensions * spacing` physical units starting at `origin`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeGeometry {
    pub bounds: AABB,
    pub dimensions: Dimensions,
}

impl VolumeGeometry {
    pub fn new(origin: Vector3f, spacing: Vector3f, dimensions: Dimensions) -> Self {
        let extent = spacing.component_mul(&dimensions.as_vector());
        Self { bounds: AABB::new(origin, origin + extent), dimensions }
    }

    pub fn extent(&self) -> Vector3f {
        self.bounds.diagnal()
    }

    /// Maps a world position into normalized texture space `[0, 1]^3`.
    pub fn to_uvw(&self, p: &Vector3f) -> Vector3f {
        let extent = self.extent();
        let rel = p - self.bounds.p_min;
        Vector3f::new(safe_div(rel.x, extent.x), safe_div(rel.y, extent.y), safe_div(rel.z, extent.z))
    }

    pub fn from_uvw(&self, uvw: &Vector3f) -> Vector3f {
        self.bounds.p_min + uvw.component_mul(&self.extent())
    }

    /// World position of the centre of voxel `(x, y, z)` in a grid of
    /// `grid` voxels spanning these bounds.
    pub fn voxel_center(&self, grid: &Dimensions, x: usize, y: usize, z: usize) -> Vector3f {
        let uvw = Vector3f::new(
            (x as Float + 0.5) / grid.x as Float,
            (y as Float + 0.5) / grid.y as Float,
            (z as Float + 0.5) / grid.z as Float,
        );
        self.from_uvw(&uvw)
    }
}

fn safe_div(a: Float, b: Float) -> Float {
    if b.abs() < 1e-12 {
        0.0
    } else {
        a / b
    }
}

/// A device-resident volume that can be bound to a compute dispatch.
pub trait Volume: Send + Sync {
    fn geometry(&self) -> &VolumeGeometry;
    fn texture(&self) -> &TextureHandle;

    fn bbox(&self) -> AABB {
        self.geometry().bounds
    }
}
