// Copyright @yucwang 2026

use crate::core::sensor::Sensor;
use crate::math::constants::{Float, Vector2f, Vector3f};
use crate::math::ray::Ray3f;

/// Parallel-projection camera. `scale` is half the film height in world
/// units.
pub struct OrthographicCamera {
    origin: Vector3f,
    forward: Vector3f,
    right: Vector3f,
    up: Vector3f,
    half_height: Float,
    half_width: Float,
    width: usize,
    height: usize,
}

impl OrthographicCamera {
    pub fn new(origin: Vector3f,
               target: Vector3f,
               up: Vector3f,
               scale: Float,
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
            half_height: scale,
            half_width: scale * aspect,
            width,
            height,
        }
    }
}

impl Sensor for OrthographicCamera {
    fn sample_ray(&self, u: &Vector2f) -> Ray3f {
        let offset = self.right * ((2.0 * u.x - 1.0) * self.half_width)
            + self.up * ((1.0 - 2.0 * u.y) * self.half_height);
        Ray3f::new(self.origin + offset, self.forward, Some(0.0), None)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn describe(&self) -> String {
        format!("OrthographicCamera\n  origin: {:?}\n  half extent: {} x {}",
                self.origin.as_slice(), self.half_width, self.half_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rays_are_parallel_and_offset() {
        let cam = OrthographicCamera::new(
            Vector3f::new(0.0, 0.0, 5.0),
            Vector3f::zeros(),
            Vector3f::new(0.0, 1.0, 0.0),
            2.0,
            20,
            10,
        );
        let a = cam.sample_ray(&Vector2f::new(0.0, 0.0));
        let b = cam.sample_ray(&Vector2f::new(1.0, 1.0));
        assert_eq!(a.dir(), b.dir());
        assert!((a.origin() - Vector3f::new(-4.0, 2.0, 5.0)).norm() < 1e-6);
        assert!((b.origin() - Vector3f::new(4.0, -2.0, 5.0)).norm() < 1e-6);
    }
}
