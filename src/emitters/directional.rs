// Copyright @yucwang 2026

use crate::core::emitter::{validate_intensity, Emitter};
use crate::core::error::{Result, VolumeError};
use crate::math::constants::{Float, Vector3f};
use crate::math::ray::Ray3f;

/// Parallel light travelling along `direction`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalEmitter {
    pub direction: Vector3f,
    pub intensity: Float,
}

impl DirectionalEmitter {
    pub fn new(direction: Vector3f, intensity: Float) -> Self {
        Self { direction, intensity }
    }
}

impl Emitter for DirectionalEmitter {
    fn ray_to_light(&self, p: &Vector3f) -> Ray3f {
        Ray3f::new(*p, -self.direction, Some(0.0), None)
    }

    fn intensity(&self) -> Float {
        self.intensity
    }

    fn validate(&self) -> Result<()> {
        let len = self.direction.norm();
        if !(len.is_finite() && len > 0.0) {
            return Err(VolumeError::invalid("direction", "must be a non-zero finite vector"));
        }
        validate_intensity(self.intensity)
    }

    fn describe(&self) -> String {
        format!("DirectionalEmitter\n  direction: {:?}\n  intensity: {}", self.direction.as_slice(), self.intensity)
    }
}
