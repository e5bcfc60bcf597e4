// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::emitters::directional::DirectionalEmitter;
use crate::emitters::point::PointEmitter;
use crate::math::constants::{Float, Vector3f};
use crate::math::ray::Ray3f;

/// A light the illumination pass propagates through the volume.
pub trait Emitter: Send + Sync {
    /// Ray from `p` toward the light, bounded by the light's distance.
    fn ray_to_light(&self, p: &Vector3f) -> Ray3f;

    fn intensity(&self) -> Float;

    fn validate(&self) -> Result<()>;

    fn describe(&self) -> String {
        String::from("Emitter")
    }
}

/// The supported lights, as plain values so changes can be compared.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightParameters {
    Directional(DirectionalEmitter),
    Point(PointEmitter),
}

impl LightParameters {
    pub fn directional(direction: Vector3f, intensity: Float) -> Self {
        LightParameters::Directional(DirectionalEmitter::new(direction, intensity))
    }

    pub fn point(position: Vector3f, intensity: Float) -> Self {
        LightParameters::Point(PointEmitter::new(position, intensity))
    }

    pub fn emitter(&self) -> &dyn Emitter {
        match self {
            LightParameters::Directional(e) => e,
            LightParameters::Point(e) => e,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.emitter().validate()
    }
}

impl Default for LightParameters {
    fn default() -> Self {
        LightParameters::directional(Vector3f::new(0.0, 0.0, -1.0), 1.0)
    }
}

pub(crate) fn validate_intensity(intensity: Float) -> Result<()> {
    if !(intensity.is_finite() && intensity >= 0.0) {
        return Err(VolumeError::invalid("intensity", format!("{} must be non-negative", intensity)));
    }
    Ok(())
}
