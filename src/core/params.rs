// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::math::constants::Float;
use crate::math::plane::ClipPlane;
use crate::volumes::VolumeFilterMode;

/// DICOM-style window applied to normalized density before the transfer
/// function lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowingParameters {
    pub center: Float,
    pub width: Float,
    /// Samples below the window are skipped instead of clamped.
    pub low_cutoff: bool,
    /// Samples above the window are skipped instead of clamped.
    pub high_cutoff: bool,
}

impl Default for WindowingParameters {
    fn default() -> Self {
        Self { center: 0.5, width: 1.0, low_cutoff: true, high_cutoff: true }
    }
}

impl WindowingParameters {
    /// Windowed value in `[0, 1]`, or `None` when a cutoff discards it.
    pub fn apply(&self, value: Float) -> Option<Float> {
        let x = (value - (self.center - 0.5 * self.width)) / self.width;
        if x < 0.0 {
            if self.low_cutoff { None } else { Some(0.0) }
        } else if x > 1.0 {
            if self.high_cutoff { None } else { Some(1.0) }
        } else {
            Some(x)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.center.is_finite() {
            return Err(VolumeError::invalid("window_center", "must be finite"));
        }
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(VolumeError::invalid("window_width", format!("{} must be positive", self.width)));
        }
        Ok(())
    }

    /// Window covering `[min, max]` in normalized units.
    pub fn from_range(min: Float, max: Float) -> Result<Self> {
        if !(min < max) {
            return Err(VolumeError::invalid("window", format!("[{}, {}] must satisfy min < max", min, max)));
        }
        Ok(Self { center: 0.5 * (min + max), width: max - min, ..Self::default() })
    }
}

/// Per-frame raymarch configuration, validated before every dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct RayMarchParameters {
    /// Distance between samples in world units.
    pub step_size: Float,
    pub illumination_enabled: bool,
    pub clip_planes: Vec<ClipPlane>,
    pub windowing: WindowingParameters,
    pub early_termination_opacity: Float,
    /// Path length over which a transfer function opacity is reached.
    pub opacity_unit_length: Float,
    pub filter_mode: VolumeFilterMode,
    pub jitter: bool,
    pub seed: u64,
    /// Light added to the illumination term so shadowed voxels stay visible.
    pub ambient: Float,
    pub max_steps: usize,
}

impl Default for RayMarchParameters {
    fn default() -> Self {
        Self {
            step_size: 1.0,
            illumination_enabled: true,
            clip_planes: Vec::new(),
            windowing: WindowingParameters::default(),
            early_termination_opacity: 0.99,
            opacity_unit_length: 1.0,
            filter_mode: VolumeFilterMode::Trilinear,
            jitter: false,
            seed: 0,
            ambient: 0.0,
            max_steps: 65536,
        }
    }
}

impl RayMarchParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(VolumeError::invalid("step_size", format!("{} must be positive", self.step_size)));
        }
        if !(self.early_termination_opacity > 0.0 && self.early_termination_opacity <= 1.0) {
            return Err(VolumeError::invalid(
                "early_termination",
                format!("{} must lie in (0, 1]", self.early_termination_opacity),
            ));
        }
        if !(self.opacity_unit_length.is_finite() && self.opacity_unit_length > 0.0) {
            return Err(VolumeError::invalid(
                "opacity_unit_length",
                format!("{} must be positive", self.opacity_unit_length),
            ));
        }
        if !(self.ambient.is_finite() && self.ambient >= 0.0) {
            return Err(VolumeError::invalid("ambient", format!("{} must be non-negative", self.ambient)));
        }
        if self.max_steps == 0 {
            return Err(VolumeError::invalid("max_steps", "must be positive"));
        }
        if let Some(i) = self.clip_planes.iter().position(|p| !p.is_valid()) {
            return Err(VolumeError::invalid("clip_plane", format!("plane {} has a zero or non-finite normal", i)));
        }
        self.windowing.validate()
    }
}

/// Corrects an opacity defined per `unit_length` of path for a step `dt`.
pub fn correct_opacity(alpha: Float, dt: Float, unit_length: Float) -> Float {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha >= 1.0 {
        return 1.0;
    }
    1.0 - (1.0 - alpha).powf(dt / unit_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::constants::Vector3f;

    #[test]
    fn default_window_is_identity() {
        let w = WindowingParameters::default();
        assert_eq!(w.apply(0.0), Some(0.0));
        assert_eq!(w.apply(0.3), Some(0.3));
        assert_eq!(w.apply(1.0), Some(1.0));
    }

    #[test]
    fn window_cutoffs() {
        let mut w = WindowingParameters::from_range(0.25, 0.75).unwrap();
        assert_eq!(w.apply(0.5), Some(0.5));
        assert_eq!(w.apply(0.1), None);
        assert_eq!(w.apply(0.9), None);
        w.low_cutoff = false;
        w.high_cutoff = false;
        assert_eq!(w.apply(0.1), Some(0.0));
        assert_eq!(w.apply(0.9), Some(1.0));
        assert!(WindowingParameters::from_range(0.5, 0.5).is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(RayMarchParameters::default().validate().is_ok());
        let mut p = RayMarchParameters::default();
        p.step_size = 0.0;
        assert!(matches!(p.validate(), Err(VolumeError::InvalidParameter { name: "step_size", .. })));
        let mut p = RayMarchParameters::default();
        p.clip_planes.push(ClipPlane::new(Vector3f::zeros(), 0.0));
        assert!(p.validate().is_err());
        let mut p = RayMarchParameters::default();
        p.windowing.width = -1.0;
        assert!(p.validate().is_err());
        let mut p = RayMarchParameters::default();
        p.early_termination_opacity = 1.5;
        assert!(p.validate().is_err());
    }

    #[test]
    fn opacity_correction_composes() {
        let a = 0.4;
        let half = correct_opacity(a, 0.5, 1.0);
        let composed = 1.0 - (1.0 - half) * (1.0 - half);
        assert!((composed - a).abs() < 1e-6);
        assert_eq!(correct_opacity(1.0, 0.1, 1.0), 1.0);
        assert_eq!(correct_opacity(0.0, 3.0, 1.0), 0.0);
    }
}
