// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::math::constants::{Float, Vector4f};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlPoint {
    pub value: Float,
    pub rgba: Vector4f,
}

impl ControlPoint {
    pub fn new(value: Float, rgba: Vector4f) -> Self {
        Self { value, rgba }
    }
}

/// Piecewise-linear map from normalized density to straight RGBA.
/// Immutable once built; points are sorted by value.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunction {
    points: Vec<ControlPoint>,
}

impl TransferFunction {
    pub fn new(points: Vec<ControlPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(VolumeError::invalid("transfer_function", "needs at least one control point"));
        }
        for (i, point) in points.iter().enumerate() {
            if !point.value.is_finite() {
                return Err(VolumeError::invalid("transfer_function", format!("point {} has a non-finite value", i)));
            }
            if point.rgba.iter().any(|c| !(0.0..=1.0).contains(c)) {
                return Err(VolumeError::invalid("transfer_function", format!("point {} colour is outside [0, 1]", i)));
            }
        }
        if points.windows(2).any(|w| w[1].value < w[0].value) {
            return Err(VolumeError::invalid("transfer_function", "control points must be non-decreasing in value"));
        }
        Ok(Self { points })
    }

    /// Black-to-white ramp with opacity following density.
    pub fn grayscale() -> Self {
        Self {
            points: vec![
                ControlPoint::new(0.0, Vector4f::new(0.0, 0.0, 0.0, 0.0)),
                ControlPoint::new(1.0, Vector4f::new(1.0, 1.0, 1.0, 1.0)),
            ],
        }
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// RGBA at `value`, clamped to the end points outside the table.
    pub fn evaluate(&self, value: Float) -> Vector4f {
        let first = &self.points[0];
        let last = &self.points[self.points.len() - 1];
        if value.is_nan() || value <= first.value {
            return first.rgba;
        }
        if value >= last.value {
            return last.rgba;
        }

        // First point strictly above `value`; in range because of the checks above.
        let upper = self.points.partition_point(|p| p.value <= value);
        let a = &self.points[upper - 1];
        let b = &self.points[upper];
        let span = b.value - a.value;
        if span <= 0.0 {
            return b.rgba;
        }
        let t = (value - a.value) / span;
        a.rgba * (1.0 - t) + b.rgba * t
    }

    pub fn opacity(&self, value: Float) -> Float {
        self.evaluate(value)[3]
    }

    /// `(value, opacity)` pairs. The illumination pass only depends on
    /// these, so colour edits do not force a light rebuild.
    pub fn opacity_points(&self) -> Vec<(Float, Float)> {
        self.points.iter().map(|p| (p.value, p.rgba[3])).collect()
    }

    /// Samples the function into `size` evenly spaced entries over `[0, 1]`.
    pub fn bake(&self, size: usize) -> Vec<Vector4f> {
        match size {
            0 => Vec::new(),
            1 => vec![self.evaluate(0.0)],
            n => (0..n).map(|i| self.evaluate(i as Float / (n - 1) as Float)).collect(),
        }
    }
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::grayscale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_ramp() -> TransferFunction {
        TransferFunction::new(vec![
            ControlPoint::new(0.0, Vector4f::new(0.0, 0.0, 0.0, 0.0)),
            ControlPoint::new(1.0, Vector4f::new(1.0, 0.0, 0.0, 1.0)),
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_between_points() {
        let tf = red_ramp();
        let mid = tf.evaluate(0.25);
        assert!((mid - Vector4f::new(0.25, 0.0, 0.0, 0.25)).norm() < 1e-6);
        assert_eq!(tf.evaluate(-1.0), Vector4f::zeros());
        assert_eq!(tf.evaluate(2.0), Vector4f::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(tf.evaluate(Float::NAN), Vector4f::zeros());
    }

    #[test]
    fn step_and_single_point_tables() {
        let step = TransferFunction::new(vec![
            ControlPoint::new(0.0, Vector4f::zeros()),
            ControlPoint::new(0.5, Vector4f::zeros()),
            ControlPoint::new(0.5, Vector4f::new(1.0, 1.0, 1.0, 1.0)),
            ControlPoint::new(1.0, Vector4f::new(1.0, 1.0, 1.0, 1.0)),
        ])
        .unwrap();
        assert_eq!(step.opacity(0.49), 0.0);
        assert_eq!(step.opacity(0.5), 1.0);
        assert_eq!(step.opacity(0.75), 1.0);

        let single = TransferFunction::new(vec![ControlPoint::new(0.3, Vector4f::new(0.1, 0.2, 0.3, 0.4))]).unwrap();
        assert_eq!(single.evaluate(0.0), Vector4f::new(0.1, 0.2, 0.3, 0.4));
        assert_eq!(single.evaluate(0.9), Vector4f::new(0.1, 0.2, 0.3, 0.4));
    }

    #[test]
    fn rejects_invalid_tables() {
        assert!(TransferFunction::new(Vec::new()).is_err());
        assert!(TransferFunction::new(vec![
            ControlPoint::new(0.5, Vector4f::zeros()),
            ControlPoint::new(0.2, Vector4f::zeros()),
        ])
        .is_err());
        assert!(TransferFunction::new(vec![ControlPoint::new(0.5, Vector4f::new(2.0, 0.0, 0.0, 1.0))]).is_err());
    }

    #[test]
    fn bake_covers_unit_interval() {
        let baked = TransferFunction::grayscale().bake(5);
        assert_eq!(baked.len(), 5);
        assert_eq!(baked[0], Vector4f::zeros());
        assert!((baked[2] - Vector4f::new(0.5, 0.5, 0.5, 0.5)).norm() < 1e-6);
        assert_eq!(baked[4], Vector4f::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(red_ramp().opacity_points(), vec![(0.0, 0.0), (1.0, 1.0)]);
    }
}
