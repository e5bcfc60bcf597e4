// Copyright @yucwang 2026

use crate::core::device::{Dispatch, GpuDevice};
use crate::core::error::Result;
use crate::core::kernel::{ComputeKernel, TextureView};
use crate::core::march::{march_segment, Classifier, Compositor, MarchSegment};
use crate::core::params::RayMarchParameters;
use crate::core::rng::LcgRng;
use crate::core::sensor::Sensor;
use crate::core::transfer_function::TransferFunction;
use crate::core::volume::{Volume, VolumeGeometry};
use crate::math::bitmap::Bitmap;
use crate::math::constants::{Float, Vector2f, Vector3f};
use crate::volumes::density_volume::DensityVolume;
use crate::volumes::illumination_volume::IlluminationVolume;
use crate::volumes::sampler::VolumeSampler;
use crate::volumes::VolumeFilterMode;

use std::sync::Arc;
use std::time::Instant;

/// Largest in-step offset the jitter may produce; keeps samples in `[0, 1)`.
const MAX_JITTER: Float = 0.999_999;

/// One lane per pixel. Writes premultiplied RGBA.
struct RaymarchKernel<'a> {
    sensor: &'a dyn Sensor,
    width: usize,
    height: usize,
    geometry: VolumeGeometry,
    illumination: Option<VolumeGeometry>,
    transfer_function: &'a TransferFunction,
    params: &'a RayMarchParameters,
}

impl<'a> RaymarchKernel<'a> {
    fn jitter(&self, lane: usize) -> Float {
        if !self.params.jitter {
            return 0.5;
        }
        let mut rng = LcgRng::new(self.params.seed ^ (lane as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        rng.next_u32();
        rng.next_f32().min(MAX_JITTER)
    }
}

impl<'a> ComputeKernel for RaymarchKernel<'a> {
    fn name(&self) -> &'static str {
        "raymarch"
    }

    fn lanes(&self) -> usize {
        self.width * self.height
    }

    fn channels(&self) -> usize {
        4
    }

    fn invoke(&self, lane: usize, textures: &[TextureView<'_>], out: &mut [f32]) {
        out.iter_mut().for_each(|v| *v = 0.0);

        let (x, y) = (lane % self.width, lane / self.width);
        let u = Vector2f::new(
            (x as Float + 0.5) / self.width as Float,
            (y as Float + 0.5) / self.height as Float,
        );
        let ray = self.sensor.sample_ray(&u);
        if ray.is_degenerate() {
            return;
        }
        let (t0, t1) = match self.geometry.bounds.clipped_range(&ray, &self.params.clip_planes) {
            Some(range) => range,
            None => return,
        };
        let density = match textures.first() {
            Some(view) => VolumeSampler::new(*view, self.geometry, self.params.filter_mode),
            None => return,
        };
        let light = match (self.illumination, textures.get(1)) {
            (Some(geometry), Some(view)) => {
                let sampler = VolumeSampler::new(*view, geometry, VolumeFilterMode::Trilinear);
                Some(move |p: &Vector3f| sampler.sample_world(p))
            }
            _ => None,
        };

        let classifier = Classifier {
            transfer_function: self.transfer_function,
            windowing: &self.params.windowing,
            opacity_unit_length: self.params.opacity_unit_length,
        };
        let segment = MarchSegment {
            t0,
            t1,
            step_size: self.params.step_size,
            jitter: self.jitter(lane),
            max_steps: self.params.max_steps,
        };
        let mut compositor = Compositor::new(
            classifier,
            self.params.early_termination_opacity,
            light,
            self.params.ambient,
        );
        march_segment(&ray, &segment, |p| density.sample_world(p), &mut compositor);

        let rgba = compositor.result.rgba();
        out[..4].copy_from_slice(rgba.as_slice());
    }
}

/// Issues the visible pass for a sensor and reads the frame back.
pub struct RaymarchExecutor {
    device: Arc<dyn GpuDevice>,
}

impl RaymarchExecutor {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self { device }
    }

    /// Renders one frame. The illumination volume is bound only when
    /// `params.illumination_enabled` is set; the frame is unlit otherwise.
    pub fn render(&self,
                  density: &DensityVolume,
                  illumination: Option<&IlluminationVolume>,
                  transfer_function: &TransferFunction,
                  sensor: &dyn Sensor,
                  params: &RayMarchParameters) -> Result<Bitmap> {
        params.validate()?;
        let (width, height) = (sensor.width(), sensor.height());
        if width == 0 || height == 0 {
            return Ok(Bitmap::new(width, height));
        }

        let illumination = illumination.filter(|_| params.illumination_enabled);
        let mut bindings = vec![density.texture().id()];
        if let Some(light) = illumination {
            bindings.push(light.texture().id());
        }

        let kernel = RaymarchKernel {
            sensor,
            width,
            height,
            geometry: *density.geometry(),
            illumination: illumination.map(|light| *light.geometry()),
            transfer_function,
            params,
        };

        let start = Instant::now();
        let mut output = vec![0.0f32; width * height * 4];
        self.device.dispatch_compute(
            Dispatch { kernel: &kernel, bindings: &bindings, cancel: None },
            &mut output,
        )?;
        log::info!("Raymarched {}x{} frame in {:.2?}.", width, height, start.elapsed());

        Ok(Bitmap::from_rgba_slice(width, height, &output))
    }
}
