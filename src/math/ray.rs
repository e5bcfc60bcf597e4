// Copyright 2020 @TwoCookingMice

use super::constants::{Float, Vector3f, FLOAT_MAX};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray3f {
    origin: Vector3f,
    dir: Vector3f,
    pub min_t: Float,
    pub max_t: Float
}

impl Ray3f {
    /// Builds a ray with a unit direction. `max_t` defaults to unbounded.
    pub fn new(o: Vector3f, d: Vector3f,
               min_t: Option<Float>, max_t: Option<Float>) -> Self {
        let len = d.norm();
        let dir = if len > 0.0 { d / len } else { Vector3f::zeros() };
        Self { origin: o, dir,
               min_t: min_t.unwrap_or(0.0),
               max_t: max_t.unwrap_or(FLOAT_MAX) }
    }

    pub fn origin(&self) -> Vector3f {
        self.origin
    }

    pub fn dir(&self) -> Vector3f {
        self.dir
    }

    pub fn at(&self, t: Float) -> Vector3f {
        self.origin + self.dir * t
    }

    pub fn is_degenerate(&self) -> bool {
        self.dir == Vector3f::zeros() || self.max_t <= self.min_t
    }
}

/* Tests for Ray */
