// Copyright @yucwang 2026

use crate::core::emitter::{validate_intensity, Emitter};
use crate::core::error::{Result, VolumeError};
use crate::math::constants::{Float, Vector3f};
use crate::math::ray::Ray3f;

/// Omnidirectional light at `position`. Intensity does not fall off with
/// distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointEmitter {
    pub position: Vector3f,
    pub intensity: Float,
}

impl PointEmitter {
    pub fn new(position: Vector3f, intensity: Float) -> Self {
        Self { position, intensity }
    }
}

impl Emitter for PointEmitter {
    fn ray_to_light(&self, p: &Vector3f) -> Ray3f {
        let to_light = self.position - p;
        Ray3f::new(*p, to_light, Some(0.0), Some(to_light.norm()))
    }

    fn intensity(&self) -> Float {
        self.intensity
    }

    fn validate(&self) -> Result<()> {
        if !self.position.iter().all(|v| v.is_finite()) {
            return Err(VolumeError::invalid("position", "must be finite"));
        }
        validate_intensity(self.intensity)
    }

    fn describe(&self) -> String {
        format!("PointEmitter\n  position: {:?}\n  intensity: {}", self.position.as_slice(), self.intensity)
    }
}
