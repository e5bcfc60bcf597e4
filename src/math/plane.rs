// Copyright @yucwang 2026

use super::constants::{Float, Vector3f};

/// Half-space `normal . p + distance >= 0`. Points on the negative side are
/// clipped away.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClipPlane {
    pub normal: Vector3f,
    pub distance: Float,
}

impl ClipPlane {
    pub fn new(normal: Vector3f, distance: Float) -> Self {
        Self { normal, distance }
    }

    /// Plane through `center`, keeping everything `direction` points at.
    pub fn from_point_direction(center: Vector3f, direction: Vector3f) -> Self {
        Self { normal: direction, distance: -direction.dot(&center) }
    }

    pub fn signed_distance(&self, p: &Vector3f) -> Float {
        self.normal.dot(p) + self.distance
    }

    pub fn keeps(&self, p: &Vector3f) -> bool {
        self.signed_distance(p) >= 0.0
    }

    pub fn is_valid(&self) -> bool {
        self.normal.norm() > 1e-8 && self.distance.is_finite()
    }
}
