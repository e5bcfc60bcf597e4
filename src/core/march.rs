// Copyright @yucwang 2026

use crate::core::params::{correct_opacity, WindowingParameters};
use crate::core::transfer_function::TransferFunction;
use crate::math::constants::{Float, Vector3f, Vector4f};
use crate::math::ray::Ray3f;

/// One density sample taken along a ray.
#[derive(Clone, Copy, Debug)]
pub struct MarchSample {
    pub t: Float,
    pub dt: Float,
    pub position: Vector3f,
    pub density: Float,
}

/// Per-step accumulation rule. Returning `false` ends the march.
pub trait MarchAccumulator {
    fn accumulate(&mut self, sample: &MarchSample) -> bool;
}

/// Parametric interval of a ray and how to step through it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarchSegment {
    pub t0: Float,
    pub t1: Float,
    pub step_size: Float,
    /// Offset of each sample inside its step, in `[0, 1)`.
    pub jitter: Float,
    pub max_steps: usize,
}

impl MarchSegment {
    /// `(n, dt)`: `n = ceil(len / step_size)` uniform steps covering the
    /// whole interval exactly.
    pub fn steps(&self) -> (usize, Float) {
        let length = self.t1 - self.t0;
        if !(length > 0.0) || !(self.step_size > 0.0) || self.max_steps == 0 {
            return (0, 0.0);
        }
        let n = ((length / self.step_size).ceil() as usize).clamp(1, self.max_steps);
        (n, length / n as Float)
    }
}

/// Samples `density` along `ray` over `segment`, handing every sample to
/// `acc`. Returns the number of samples taken.
pub fn march_segment<F, A>(ray: &Ray3f, segment: &MarchSegment, density: F, acc: &mut A) -> usize
where
    F: Fn(&Vector3f) -> Float,
    A: MarchAccumulator,
{
    let (n, dt) = segment.steps();
    for i in 0..n {
        let t = segment.t0 + (i as Float + segment.jitter) * dt;
        let position = ray.at(t);
        let sample = MarchSample { t, dt, position, density: density(&position) };
        if !acc.accumulate(&sample) {
            return i + 1;
        }
    }
    n
}

/// Front-to-back "over" compositing of premultiplied colour.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrontToBack {
    pub color: Vector3f,
    pub alpha: Float,
}

impl FrontToBack {
    /// Adds a straight colour `rgb` with opacity `a` behind what is already
    /// accumulated. Both terms stay in `[0, 1]`.
    pub fn add(&mut self, rgb: &Vector3f, a: Float) {
        let weight = a.clamp(0.0, 1.0) * (1.0 - self.alpha);
        self.color = (self.color + rgb * weight).map(|c| c.clamp(0.0, 1.0));
        self.alpha = (self.alpha + weight).clamp(0.0, 1.0);
    }

    pub fn rgba(&self) -> Vector4f {
        Vector4f::new(self.color.x, self.color.y, self.color.z, self.alpha)
    }
}

/// Shared classification of a density sample: window, transfer function
/// and step-length opacity correction.
#[derive(Clone, Copy)]
pub struct Classifier<'a> {
    pub transfer_function: &'a TransferFunction,
    pub windowing: &'a WindowingParameters,
    pub opacity_unit_length: Float,
}

impl<'a> Classifier<'a> {
    /// Straight RGBA with step-corrected opacity, `None` for samples the
    /// window discards.
    pub fn classify(&self, density: Float, dt: Float) -> Option<Vector4f> {
        let value = self.windowing.apply(density)?;
        let mut rgba = self.transfer_function.evaluate(value);
        rgba[3] = correct_opacity(rgba[3], dt, self.opacity_unit_length);
        Some(rgba)
    }
}

/// Accumulator of the visible pass.
pub struct Compositor<'a, L: Fn(&Vector3f) -> Float> {
    classifier: Classifier<'a>,
    termination: Float,
    /// Light reaching a position; `None` renders unlit.
    lighting: Option<L>,
    ambient: Float,
    pub result: FrontToBack,
}

impl<'a, L: Fn(&Vector3f) -> Float> Compositor<'a, L> {
    pub fn new(classifier: Classifier<'a>, termination: Float, lighting: Option<L>, ambient: Float) -> Self {
        Self { classifier, termination, lighting, ambient, result: FrontToBack::default() }
    }
}

impl<'a, L: Fn(&Vector3f) -> Float> MarchAccumulator for Compositor<'a, L> {
    fn accumulate(&mut self, sample: &MarchSample) -> bool {
        if let Some(rgba) = self.classifier.classify(sample.density, sample.dt) {
            let mut rgb = Vector3f::new(rgba[0], rgba[1], rgba[2]);
            if let Some(light) = &self.lighting {
                rgb *= self.ambient + light(&sample.position);
            }
            self.result.add(&rgb, rgba[3]);
        }
        self.result.alpha < self.termination
    }
}

/// Accumulator of the light pass: transmittance toward the light.
pub struct Transmittance<'a> {
    classifier: Classifier<'a>,
    cutoff: Float,
    pub value: Float,
}

impl<'a> Transmittance<'a> {
    /// Marching stops once transmittance drops below `cutoff`.
    pub fn new(classifier: Classifier<'a>, cutoff: Float) -> Self {
        Self { classifier, cutoff, value: 1.0 }
    }
}

impl<'a> MarchAccumulator for Transmittance<'a> {
    fn accumulate(&mut self, sample: &MarchSample) -> bool {
        if let Some(rgba) = self.classifier.classify(sample.density, sample.dt) {
            self.value *= 1.0 - rgba[3];
        }
        if self.value < self.cutoff {
            self.value = 0.0;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transfer_function::ControlPoint;
    use proptest::prelude::*;

    struct Recorder(Vec<Float>);

    impl MarchAccumulator for Recorder {
        fn accumulate(&mut self, sample: &MarchSample) -> bool {
            self.0.push(sample.t);
            true
        }
    }

    fn ray() -> Ray3f {
        Ray3f::new(Vector3f::zeros(), Vector3f::new(1.0, 0.0, 0.0), None, None)
    }

    fn red() -> TransferFunction {
        TransferFunction::new(vec![
            ControlPoint::new(0.0, Vector4f::zeros()),
            ControlPoint::new(1.0, Vector4f::new(1.0, 0.0, 0.0, 1.0)),
        ])
        .unwrap()
    }

    #[test]
    fn steps_cover_segment_uniformly() {
        let segment = MarchSegment { t0: 1.0, t1: 2.0, step_size: 0.3, jitter: 0.5, max_steps: 100 };
        assert_eq!(segment.steps(), (4, 0.25));
        let mut rec = Recorder(Vec::new());
        assert_eq!(march_segment(&ray(), &segment, |_| 0.0, &mut rec), 4);
        assert_eq!(rec.0, vec![1.125, 1.375, 1.625, 1.875]);

        let empty = MarchSegment { t0: 1.0, t1: 1.0, ..segment };
        assert_eq!(march_segment(&ray(), &empty, |_| 0.0, &mut rec), 0);
        let capped = MarchSegment { max_steps: 2, ..segment };
        assert_eq!(capped.steps(), (2, 0.5));
    }

    #[test]
    fn opaque_red_saturates_for_any_step() {
        let tf = red();
        let windowing = WindowingParameters::default();
        let classifier = Classifier { transfer_function: &tf, windowing: &windowing, opacity_unit_length: 1.0 };
        for step in [0.01, 0.1, 0.5, 2.0] {
            let segment = MarchSegment { t0: 0.0, t1: 2.0, step_size: step, jitter: 0.5, max_steps: 65536 };
            let mut compositor = Compositor::new(classifier, 0.99, None::<fn(&Vector3f) -> Float>, 0.0);
            march_segment(&ray(), &segment, |_| 1.0, &mut compositor);
            let rgba = compositor.result.rgba();
            assert!((rgba[3] - 1.0).abs() < 1e-5, "step {}: alpha {}", step, rgba[3]);
            assert!((rgba - Vector4f::new(1.0, 0.0, 0.0, 1.0)).norm() < 1e-5);
        }
    }

    #[test]
    fn early_termination_stops_marching() {
        let tf = TransferFunction::new(vec![ControlPoint::new(0.0, Vector4f::new(1.0, 1.0, 1.0, 0.5))]).unwrap();
        let windowing = WindowingParameters::default();
        let classifier = Classifier { transfer_function: &tf, windowing: &windowing, opacity_unit_length: 1.0 };
        let segment = MarchSegment { t0: 0.0, t1: 100.0, step_size: 1.0, jitter: 0.5, max_steps: 65536 };
        let mut compositor = Compositor::new(classifier, 0.99, None::<fn(&Vector3f) -> Float>, 0.0);
        let taken = march_segment(&ray(), &segment, |_| 0.5, &mut compositor);
        assert_eq!(taken, 7);
        assert!(compositor.result.alpha >= 0.99);
    }

    #[test]
    fn lighting_scales_colour_not_opacity() {
        let tf = TransferFunction::new(vec![ControlPoint::new(0.0, Vector4f::new(1.0, 1.0, 1.0, 0.5))]).unwrap();
        let windowing = WindowingParameters::default();
        let classifier = Classifier { transfer_function: &tf, windowing: &windowing, opacity_unit_length: 1.0 };
        let segment = MarchSegment { t0: 0.0, t1: 1.0, step_size: 1.0, jitter: 0.5, max_steps: 8 };
        let mut compositor = Compositor::new(classifier, 0.99, Some(|_: &Vector3f| 0.5), 0.1);
        march_segment(&ray(), &segment, |_| 0.5, &mut compositor);
        assert!((compositor.result.alpha - 0.5).abs() < 1e-6);
        assert!((compositor.result.color.x - 0.3).abs() < 1e-6);
    }

    #[test]
    fn transmittance_attenuates_and_skips_windowed_samples() {
        let tf = TransferFunction::new(vec![ControlPoint::new(0.0, Vector4f::new(1.0, 1.0, 1.0, 0.5))]).unwrap();
        let windowing = WindowingParameters::from_range(0.0, 0.5).unwrap();
        let classifier = Classifier { transfer_function: &tf, windowing: &windowing, opacity_unit_length: 1.0 };
        let segment = MarchSegment { t0: 0.0, t1: 2.0, step_size: 1.0, jitter: 0.5, max_steps: 8 };

        let mut t = Transmittance::new(classifier, 1e-3);
        march_segment(&ray(), &segment, |_| 0.25, &mut t);
        assert!((t.value - 0.25).abs() < 1e-6);

        let mut t = Transmittance::new(classifier, 1e-3);
        march_segment(&ray(), &segment, |_| 0.9, &mut t);
        assert_eq!(t.value, 1.0);
    }

    proptest! {
        #[test]
        fn accumulated_opacity_is_monotonic_and_bounded(
            steps in proptest::collection::vec((0.0f32..=1.0, 0.0f32..=1.0), 0..64)
        ) {
            let mut acc = FrontToBack::default();
            let mut previous = 0.0;
            for (c, a) in steps {
                acc.add(&Vector3f::new(c, c, c), a);
                prop_assert!(acc.alpha >= previous);
                prop_assert!(acc.alpha <= 1.0);
                prop_assert!(acc.color.iter().all(|v| (0.0..=1.0).contains(v)));
                previous = acc.alpha;
            }
        }
    }
}
