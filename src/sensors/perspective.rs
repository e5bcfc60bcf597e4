// Copyright @yucwang 2026

use crate::core::sensor::Sensor;
use crate::math::aabb::AABB;
use crate::math::constants::{Float, Vector2f, Vector3f};
use crate::math::ray::Ray3f;

pub struct PerspectiveCamera {
    origin: Vector3f,
    forward: Vector3f,
    right: Vector3f,
    up: Vector3f,
    tan_half_fov_y: Float,
    aspect: Float,
    width: usize,
    height: usize,
}

impl PerspectiveCamera {
    pub fn new(origin: Vector3f,
               target: Vector3f,
               up: Vector3f,
               fov_y_radians: Float,
               width: usize,
               height: usize) -> Self {
        let forward = (target - origin).normalize();
        let right = forward.cross(&up).normalize();
        let up = right.cross(&forward).normalize();
        let aspect = if height > 0 { width as Float / height as Float } else { 1.0 };

        Self {
            origin,
            forward,
            right,
            up,
            tan_half_fov_y: (0.5 * fov_y_radians).tan(),
            aspect,
            width,
            height,
        }
    }

    /// Camera on the +Z side of `bounds`, looking at its centre from far
    /// enough that the whole box fits the vertical field of view.
    pub fn framing(bounds: &AABB, fov_y_radians: Float, width: usize, height: usize) -> Self {
        let center = bounds.center();
        let radius = 0.5 * bounds.diagnal().norm();
        let distance = 1.1 * radius / (0.5 * fov_y_radians).sin().max(1e-3);
        let origin = center + Vector3f::new(0.0, 0.0, distance);
        Self::new(origin, center, Vector3f::new(0.0, 1.0, 0.0), fov_y_radians, width, height)
    }

    pub fn origin(&self) -> Vector3f {
        self.origin
    }
}

impl Sensor for PerspectiveCamera {
    fn sample_ray(&self, u: &Vector2f) -> Ray3f {
        let px = (2.0 * u.x - 1.0) * self.aspect * self.tan_half_fov_y;
        let py = (1.0 - 2.0 * u.y) * self.tan_half_fov_y;

        let d_camera = Vector3f::new(px, py, 1.0).normalize();
        let dir = (self.right * d_camera.x + self.up * d_camera.y + self.forward * d_camera.z).normalize();
        Ray3f::new(self.origin, dir, Some(0.0), None)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn describe(&self) -> String {
        format!("PerspectiveCamera\n  origin: {:?}\n  forward: {:?}\n  resolution: {}x{}",
                self.origin.as_slice(), self.forward.as_slice(), self.width, self.height)
    }
}
