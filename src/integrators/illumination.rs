// Copyright @yucwang 2026

use crate::core::device::{CancelToken, Dispatch, TextureFormat};
use crate::core::emitter::{Emitter, LightParameters};
use crate::core::error::{Result, VolumeError};
use crate::core::kernel::{ComputeKernel, TextureView};
use crate::core::march::{march_segment, Classifier, MarchSegment, Transmittance};
use crate::core::params::{RayMarchParameters, WindowingParameters};
use crate::core::transfer_function::TransferFunction;
use crate::core::volume::{Dimensions, Volume, VolumeGeometry};
use crate::math::constants::{Float, Vector3f};
use crate::math::plane::ClipPlane;
use crate::textures::provider::VolumeTextureProvider;
use crate::volumes::density_volume::DensityVolume;
use crate::volumes::illumination_volume::IlluminationVolume;
use crate::volumes::sampler::VolumeSampler;
use crate::volumes::VolumeFilterMode;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

/// Transmittance below which a light march stops.
const TRANSMITTANCE_CUTOFF: Float = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IlluminationSettings {
    /// Build the light grid at half the density resolution per axis.
    pub half_resolution: bool,
    /// Light march step; defaults to the visible pass step.
    pub step_size: Option<Float>,
}

impl Default for IlluminationSettings {
    fn default() -> Self {
        Self { half_resolution: false, step_size: None }
    }
}

/// Every input the light volume depends on. Two equal keys produce the
/// same volume, so an unchanged key never rebuilds.
#[derive(Clone, Debug, PartialEq)]
pub struct IlluminationKey {
    density_generation: u64,
    lights: Vec<LightParameters>,
    opacity_points: Vec<(Float, Float)>,
    windowing: WindowingParameters,
    clip_planes: Vec<ClipPlane>,
    step_size: Float,
    opacity_unit_length: Float,
    filter_mode: VolumeFilterMode,
    settings: IlluminationSettings,
}

impl IlluminationKey {
    pub fn new(density: &DensityVolume,
               lights: &[LightParameters],
               transfer_function: &TransferFunction,
               params: &RayMarchParameters,
               settings: &IlluminationSettings) -> Self {
        Self {
            density_generation: density.generation(),
            lights: lights.to_vec(),
            opacity_points: transfer_function.opacity_points(),
            windowing: params.windowing,
            clip_planes: params.clip_planes.clone(),
            step_size: settings.step_size.unwrap_or(params.step_size),
            opacity_unit_length: params.opacity_unit_length,
            filter_mode: params.filter_mode,
            settings: *settings,
        }
    }
}

/// One lane per light-grid voxel: march from the voxel centre toward each
/// light and store the sum of the light that arrives.
struct LightPropagationKernel<'a> {
    grid: Dimensions,
    geometry: VolumeGeometry,
    lights: &'a [LightParameters],
    transfer_function: &'a TransferFunction,
    params: &'a RayMarchParameters,
    step_size: Float,
}

impl<'a> ComputeKernel for LightPropagationKernel<'a> {
    fn name(&self) -> &'static str {
        "light propagation"
    }

    fn lanes(&self) -> usize {
        self.grid.x * self.grid.y * self.grid.z
    }

    fn channels(&self) -> usize {
        1
    }

    fn invoke(&self, lane: usize, textures: &[TextureView<'_>], out: &mut [f32]) {
        let (x, y, z) = self.grid.coords(lane);
        let p = self.geometry.voxel_center(&self.grid, x, y, z);
        let density = textures
            .first()
            .map(|view| VolumeSampler::new(*view, self.geometry, self.params.filter_mode));
        out[0] = self
            .lights
            .iter()
            .map(|light| self.arriving_light(light.emitter(), &p, density.as_ref()))
            .sum();
    }
}

impl<'a> LightPropagationKernel<'a> {
    fn arriving_light(&self, emitter: &dyn Emitter, p: &Vector3f, density: Option<&VolumeSampler<'_>>) -> Float {
        let ray = emitter.ray_to_light(p);
        let range = match self.geometry.bounds.clipped_range(&ray, &self.params.clip_planes) {
            Some(range) => range,
            None => return emitter.intensity(),
        };
        let density = match density {
            Some(density) => density,
            None => return emitter.intensity(),
        };

        let classifier = Classifier {
            transfer_function: self.transfer_function,
            windowing: &self.params.windowing,
            opacity_unit_length: self.params.opacity_unit_length,
        };
        let segment = MarchSegment {
            t0: range.0,
            t1: range.1,
            step_size: self.step_size,
            jitter: 0.5,
            max_steps: self.params.max_steps,
        };
        let mut transmittance = Transmittance::new(classifier, TRANSMITTANCE_CUTOFF);
        march_segment(&ray, &segment, |q| density.sample_world(q), &mut transmittance);
        emitter.intensity() * transmittance.value
    }
}

/// Builds and publishes the illumination volume. Builds are full
/// recomputes into a fresh texture; the published volume is swapped only
/// once a build has completed and was not superseded.
pub struct IlluminationVolumeBuilder {
    provider: VolumeTextureProvider,
    settings: IlluminationSettings,
    current: RwLock<Option<Arc<IlluminationVolume>>>,
    current_key: Mutex<Option<IlluminationKey>>,
    in_flight: Mutex<Option<Arc<CancelToken>>>,
    builds_completed: AtomicUsize,
}

impl IlluminationVolumeBuilder {
    pub fn new(provider: VolumeTextureProvider, settings: IlluminationSettings) -> Self {
        Self {
            provider,
            settings,
            current: RwLock::new(None),
            current_key: Mutex::new(None),
            in_flight: Mutex::new(None),
            builds_completed: AtomicUsize::new(0),
        }
    }

    /// Snapshot of the published volume.
    pub fn current(&self) -> Option<Arc<IlluminationVolume>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn builds_completed(&self) -> usize {
        self.builds_completed.load(Ordering::Relaxed)
    }

    pub fn needs_rebuild(&self, key: &IlluminationKey) -> bool {
        self.current().is_none() || lock(&self.current_key).as_ref() != Some(key)
    }

    /// Cancels the in-flight build, if any.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.in_flight).take() {
            log::debug!("Cancelling in-flight illumination build.");
            token.cancel();
        }
    }

    /// Drops the published volume, e.g. when its density volume goes away.
    pub fn invalidate(&self) {
        self.cancel();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        *lock(&self.current_key) = None;
    }

    /// Returns the published volume when it matches the inputs, otherwise
    /// rebuilds.
    pub fn ensure(&self,
                  density: &DensityVolume,
                  lights: &[LightParameters],
                  transfer_function: &TransferFunction,
                  params: &RayMarchParameters) -> Result<Arc<IlluminationVolume>> {
        let key = IlluminationKey::new(density, lights, transfer_function, params, &self.settings);
        if !self.needs_rebuild(&key) {
            if let Some(volume) = self.current() {
                return Ok(volume);
            }
        }
        self.rebuild(density, lights, transfer_function, params)
    }

    /// Recomputes the light volume. A build started meanwhile cancels this
    /// one, which then returns `BuildCancelled` and leaves the published
    /// volume untouched.
    pub fn rebuild(&self,
                   density: &DensityVolume,
                   lights: &[LightParameters],
                   transfer_function: &TransferFunction,
                   params: &RayMarchParameters) -> Result<Arc<IlluminationVolume>> {
        for light in lights {
            light.validate()?;
        }
        params.validate()?;
        let key = IlluminationKey::new(density, lights, transfer_function, params, &self.settings);
        let step_size = key.step_size;
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(VolumeError::invalid("illumination.step_size", format!("{} must be positive", step_size)));
        }

        let token = Arc::new(CancelToken::new());
        if let Some(previous) = lock(&self.in_flight).replace(Arc::clone(&token)) {
            log::debug!("Superseding in-flight illumination build.");
            previous.cancel();
        }

        let result = self.build(density, lights, transfer_function, params, step_size, &token);

        let mut in_flight = lock(&self.in_flight);
        let ours = in_flight.as_ref().map_or(false, |t| Arc::ptr_eq(t, &token));
        if ours {
            *in_flight = None;
        }
        let volume = match result {
            Ok(volume) if !token.is_cancelled() => volume,
            Ok(_) | Err(VolumeError::BuildCancelled) => {
                log::debug!("Illumination build cancelled; keeping the published volume.");
                return Err(VolumeError::BuildCancelled);
            }
            Err(e) => return Err(e),
        };

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&volume));
        *lock(&self.current_key) = Some(key);
        drop(in_flight);
        self.builds_completed.fetch_add(1, Ordering::Relaxed);
        Ok(volume)
    }

    fn build(&self,
             density: &DensityVolume,
             lights: &[LightParameters],
             transfer_function: &TransferFunction,
             params: &RayMarchParameters,
             step_size: Float,
             token: &CancelToken) -> Result<Arc<IlluminationVolume>> {
        let start = Instant::now();
        let geometry = *density.geometry();
        let grid = if self.settings.half_resolution {
            geometry.dimensions.halved()
        } else {
            geometry.dimensions
        };

        let kernel = LightPropagationKernel { grid, geometry, lights, transfer_function, params, step_size };
        let mut output = vec![0.0f32; grid.voxel_count()?];
        let bindings = [density.texture().id()];
        self.provider.device().dispatch_compute(
            Dispatch { kernel: &kernel, bindings: &bindings, cancel: Some(token) },
            &mut output,
        )?;
        if token.is_cancelled() {
            return Err(VolumeError::BuildCancelled);
        }

        let texture = self.provider.create(grid, TextureFormat::R32Float)?;
        let bytes: Vec<u8> = output.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.provider.upload(&texture, &bytes)?;

        log::info!("Illumination volume {} built in {:.2?} ({} lights).", grid, start.elapsed(), lights.len());
        Ok(Arc::new(IlluminationVolume::new(texture, geometry, density.generation())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::{GpuDevice, TextureDescriptor, TextureId};
    use crate::core::transfer_function::ControlPoint;
    use crate::devices::host::HostDevice;
    use crate::io::header::{ByteOrder, ElementType, VolumeHeader};
    use crate::io::packer::PackOptions;
    use crate::math::constants::{Vector3f, Vector4f};
    use std::io::Cursor;
    use std::sync::atomic::AtomicBool;

    fn cube(provider: &VolumeTextureProvider, fill: u8) -> DensityVolume {
        let dims = Dimensions::new(4, 4, 4);
        let header = VolumeHeader::raw("mem.raw", dims, ElementType::UInt8, ByteOrder::Little,
                                       Vector3f::new(1.0, 1.0, 1.0)).unwrap();
        DensityVolume::upload(provider, header, &mut Cursor::new(vec![fill; 64]), PackOptions::default()).unwrap()
    }

    fn setup(fill: u8) -> (Arc<HostDevice>, VolumeTextureProvider, DensityVolume) {
        let device = Arc::new(HostDevice::new().with_threads(2));
        let provider = VolumeTextureProvider::new(device.clone());
        let density = cube(&provider, fill);
        (device, provider, density)
    }

    /// Cancels the next light propagation dispatch from inside the device.
    struct InterruptingDevice {
        inner: HostDevice,
        armed: AtomicBool,
    }

    impl GpuDevice for InterruptingDevice {
        fn create_texture_3d(&self, descriptor: TextureDescriptor) -> Result<TextureId> {
            self.inner.create_texture_3d(descriptor)
        }

        fn write_texture_3d(&self, id: TextureId, first_slice: usize, bytes: &[u8]) -> Result<()> {
            self.inner.write_texture_3d(id, first_slice, bytes)
        }

        fn dispatch_compute(&self, dispatch: Dispatch<'_>, output: &mut [f32]) -> Result<()> {
            if dispatch.kernel.name() == "light propagation" && self.armed.swap(false, Ordering::SeqCst) {
                if let Some(token) = dispatch.cancel {
                    token.cancel();
                }
            }
            self.inner.dispatch_compute(dispatch, output)
        }

        fn release_resource(&self, id: TextureId) {
            self.inner.release_resource(id);
        }
    }

    fn light_x() -> LightParameters {
        LightParameters::directional(Vector3f::new(1.0, 0.0, 0.0), 1.0)
    }

    fn read_f32(device: &HostDevice, volume: &IlluminationVolume) -> Vec<f32> {
        device
            .read_texture(volume.texture().id())
            .unwrap()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn empty_volume_is_fully_lit() {
        let (device, provider, density) = setup(0);
        let builder = IlluminationVolumeBuilder::new(provider, IlluminationSettings::default());
        let volume = builder
            .rebuild(&density, &[light_x()], &TransferFunction::grayscale(), &RayMarchParameters::default())
            .unwrap();
        assert!(read_f32(&device, &volume).iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert_eq!(builder.builds_completed(), 1);
    }

    #[test]
    fn light_decays_away_from_the_source() {
        let (device, provider, density) = setup(255);
        let tf = TransferFunction::new(vec![ControlPoint::new(0.0, Vector4f::new(1.0, 1.0, 1.0, 0.2))]).unwrap();
        let builder = IlluminationVolumeBuilder::new(provider, IlluminationSettings::default());
        let volume = builder.rebuild(&density, &[light_x()], &tf, &RayMarchParameters::default()).unwrap();
        let values = read_f32(&device, &volume);
        let dims = Dimensions::new(4, 4, 4);
        // Light travels +X, so voxels at higher x sit deeper in the volume.
        for x in 1..4 {
            assert!(values[dims.index(x, 1, 1)] < values[dims.index(x - 1, 1, 1)]);
        }
        // From x = 0.5 there are 0.5 units of 0.2 opacity per unit before the face.
        assert!((values[dims.index(0, 2, 2)] - 0.8f32.powf(0.5)).abs() < 1e-4);
    }

    #[test]
    fn half_resolution_grid() {
        let (device, provider, density) = setup(10);
        let settings = IlluminationSettings { half_resolution: true, step_size: Some(2.0) };
        let builder = IlluminationVolumeBuilder::new(provider, settings);
        let volume = builder
            .rebuild(&density, &[light_x()], &TransferFunction::grayscale(), &RayMarchParameters::default())
            .unwrap();
        assert_eq!(volume.texture().dimensions(), Dimensions::new(2, 2, 2));
        assert_eq!(read_f32(&device, &volume).len(), 8);
        assert_eq!(volume.bbox(), density.bbox());
    }

    #[test]
    fn unchanged_inputs_do_not_rebuild() {
        let (_device, provider, density) = setup(100);
        let builder = IlluminationVolumeBuilder::new(provider, IlluminationSettings::default());
        let tf = TransferFunction::grayscale();
        let params = RayMarchParameters::default();
        let first = builder.ensure(&density, &[light_x()], &tf, &params).unwrap();
        let second = builder.ensure(&density, &[light_x()], &tf, &params).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.builds_completed(), 1);

        let moved = LightParameters::directional(Vector3f::new(0.0, 1.0, 0.0), 1.0);
        let third = builder.ensure(&density, &[moved], &tf, &params).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(builder.builds_completed(), 2);

        let recoloured = TransferFunction::new(vec![
            ControlPoint::new(0.0, Vector4f::new(1.0, 0.0, 0.0, 0.0)),
            ControlPoint::new(1.0, Vector4f::new(0.0, 1.0, 0.0, 1.0)),
        ])
        .unwrap();
        builder.ensure(&density, &[moved], &recoloured, &params).unwrap();
        assert_eq!(builder.builds_completed(), 2);
    }

    #[test]
    fn failed_build_keeps_published_volume() {
        let (_device, provider, density) = setup(100);
        let builder = IlluminationVolumeBuilder::new(provider, IlluminationSettings::default());
        let tf = TransferFunction::grayscale();
        let published = builder.rebuild(&density, &[light_x()], &tf, &RayMarchParameters::default()).unwrap();

        let bad_light = LightParameters::directional(Vector3f::zeros(), 1.0);
        assert!(builder.rebuild(&density, &[bad_light], &tf, &RayMarchParameters::default()).is_err());
        let current = builder.current().unwrap();
        assert!(Arc::ptr_eq(&published, &current));
    }

    #[test]
    fn two_lights_add_their_contributions() {
        let (device, provider, density) = setup(200);
        let tf = TransferFunction::new(vec![ControlPoint::new(0.0, Vector4f::new(1.0, 1.0, 1.0, 0.3))]).unwrap();
        let params = RayMarchParameters::default();
        let from_above = LightParameters::point(Vector3f::new(2.0, 2.0, 9.0), 0.5);
        let builder = IlluminationVolumeBuilder::new(provider, IlluminationSettings::default());

        let a = read_f32(&device, &builder.rebuild(&density, &[light_x()], &tf, &params).unwrap());
        let b = read_f32(&device, &builder.rebuild(&density, &[from_above], &tf, &params).unwrap());
        let both = read_f32(&device, &builder.rebuild(&density, &[light_x(), from_above], &tf, &params).unwrap());
        for i in 0..both.len() {
            assert!((both[i] - (a[i] + b[i])).abs() < 1e-5, "voxel {}", i);
        }

        let none = read_f32(&device, &builder.rebuild(&density, &[], &tf, &params).unwrap());
        assert!(none.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn light_list_is_part_of_the_key() {
        let (_device, provider, density) = setup(50);
        let builder = IlluminationVolumeBuilder::new(provider, IlluminationSettings::default());
        let tf = TransferFunction::grayscale();
        let params = RayMarchParameters::default();
        let second = LightParameters::directional(Vector3f::new(0.0, 0.0, 1.0), 0.5);
        builder.ensure(&density, &[light_x()], &tf, &params).unwrap();
        builder.ensure(&density, &[light_x(), second], &tf, &params).unwrap();
        builder.ensure(&density, &[light_x(), second], &tf, &params).unwrap();
        assert_eq!(builder.builds_completed(), 2);
    }

    #[test]
    fn cancelled_build_keeps_published_volume() {
        let device = Arc::new(InterruptingDevice { inner: HostDevice::new().with_threads(2), armed: AtomicBool::new(false) });
        let provider = VolumeTextureProvider::new(device.clone());
        let density = cube(&provider, 120);
        let builder = IlluminationVolumeBuilder::new(provider, IlluminationSettings::default());
        let tf = TransferFunction::grayscale();
        let params = RayMarchParameters::default();
        let published = builder.rebuild(&density, &[light_x()], &tf, &params).unwrap();
        assert_eq!(device.inner.texture_count(), 2);

        device.armed.store(true, Ordering::SeqCst);
        let moved = LightParameters::directional(Vector3f::new(0.0, 1.0, 0.0), 1.0);
        let err = builder.ensure(&density, &[moved], &tf, &params).unwrap_err();
        assert!(matches!(err, VolumeError::BuildCancelled));
        assert!(Arc::ptr_eq(&published, &builder.current().unwrap()));
        assert_eq!(builder.builds_completed(), 1);
        assert_eq!(device.inner.texture_count(), 2);

        // The superseded inputs still count as stale.
        let rebuilt = builder.ensure(&density, &[moved], &tf, &params).unwrap();
        assert!(!Arc::ptr_eq(&published, &rebuilt));
        assert_eq!(builder.builds_completed(), 2);
    }
}
