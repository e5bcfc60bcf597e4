// Copyright @yucwang 2026

use crate::core::device::GpuDevice;
use crate::core::emitter::LightParameters;
use crate::core::error::{Result, VolumeError};
use crate::core::params::RayMarchParameters;
use crate::core::sensor::Sensor;
use crate::core::transfer_function::TransferFunction;
use crate::integrators::illumination::{IlluminationSettings, IlluminationVolumeBuilder};
use crate::integrators::raymarching::RaymarchExecutor;
use crate::io;
use crate::io::header::VolumeHeader;
use crate::io::packer::PackOptions;
use crate::math::bitmap::Bitmap;
use crate::textures::provider::VolumeTextureProvider;
use crate::volumes::density_volume::DensityVolume;
use crate::volumes::illumination_volume::IlluminationVolume;

use std::io::{Read, Seek};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Owns the loaded volume, its appearance and the lights, and drives frames.
/// Every method takes `&self`: loading may run on one thread while another
/// keeps rendering the previous volume.
pub struct VolumeScene {
    provider: VolumeTextureProvider,
    executor: RaymarchExecutor,
    density: RwLock<Option<Arc<DensityVolume>>>,
    transfer_function: RwLock<Arc<TransferFunction>>,
    lights: RwLock<Vec<LightParameters>>,
    illumination: IlluminationVolumeBuilder,
}

impl VolumeScene {
    pub fn new(device: Arc<dyn GpuDevice>, illumination: IlluminationSettings) -> Self {
        let provider = VolumeTextureProvider::new(device.clone());
        Self {
            executor: RaymarchExecutor::new(device),
            illumination: IlluminationVolumeBuilder::new(provider.clone(), illumination),
            provider,
            density: RwLock::new(None),
            transfer_function: RwLock::new(Arc::new(TransferFunction::default())),
            lights: RwLock::new(vec![LightParameters::default()]),
        }
    }

    pub fn provider(&self) -> &VolumeTextureProvider {
        &self.provider
    }

    pub fn illumination(&self) -> &IlluminationVolumeBuilder {
        &self.illumination
    }

    /// Loads a `.mhd`/`.mha`/`.vol` dataset and makes it current.
    pub fn load_volume(&self, path: &Path, options: PackOptions) -> Result<Arc<DensityVolume>> {
        let header = io::load_header(path)?;
        self.load_from_header(header, options)
    }

    /// Loads the payload an already parsed header points at, e.g. a
    /// headerless raw file.
    pub fn load_from_header(&self, header: VolumeHeader, options: PackOptions) -> Result<Arc<DensityVolume>> {
        io::validate_payload_file(&header)?;
        let mut reader = io::open_payload(&header)?;
        self.load_from_reader(header, &mut reader, options)
    }

    /// Packs and uploads from any seekable stream positioned at the first
    /// voxel. The current volume is replaced only if the whole upload
    /// succeeded.
    pub fn load_from_reader<R: Read + Seek>(&self,
                                            header: VolumeHeader,
                                            reader: &mut R,
                                            options: PackOptions) -> Result<Arc<DensityVolume>> {
        header.validate()?;
        let volume = Arc::new(DensityVolume::upload(&self.provider, header, reader, options)?);

        let previous = write(&self.density).replace(Arc::clone(&volume));
        self.illumination.invalidate();
        if let Some(previous) = previous {
            log::debug!("Replaced density volume generation {}.", previous.generation());
        }
        Ok(volume)
    }

    /// Drops the current volume and its illumination.
    pub fn unload(&self) {
        write(&self.density).take();
        self.illumination.invalidate();
    }

    /// Snapshot of the current volume.
    pub fn density(&self) -> Option<Arc<DensityVolume>> {
        read(&self.density).clone()
    }

    pub fn transfer_function(&self) -> Arc<TransferFunction> {
        Arc::clone(&read(&self.transfer_function))
    }

    /// An opacity change supersedes any illumination build in flight.
    pub fn set_transfer_function(&self, transfer_function: TransferFunction) {
        let mut current = write(&self.transfer_function);
        if current.opacity_points() != transfer_function.opacity_points() {
            self.illumination.cancel();
        }
        *current = Arc::new(transfer_function);
    }

    pub fn lights(&self) -> Vec<LightParameters> {
        read(&self.lights).clone()
    }

    /// Replaces every light. Their contributions add up in one illumination
    /// volume; an empty list leaves only the ambient term. A changed list
    /// supersedes any illumination build in flight.
    pub fn set_lights(&self, lights: Vec<LightParameters>) -> Result<()> {
        for light in &lights {
            light.validate()?;
        }
        let mut current = write(&self.lights);
        if *current != lights {
            self.illumination.cancel();
        }
        *current = lights;
        Ok(())
    }

    pub fn add_light(&self, light: LightParameters) -> Result<()> {
        light.validate()?;
        self.illumination.cancel();
        write(&self.lights).push(light);
        Ok(())
    }

    pub fn cancel_illumination(&self) {
        self.illumination.cancel();
    }

    /// Brings the illumination volume up to date with the current state.
    /// `None` when illumination is off or nothing is loaded.
    pub fn update_illumination(&self, params: &RayMarchParameters) -> Result<Option<Arc<IlluminationVolume>>> {
        if !params.illumination_enabled {
            return Ok(None);
        }
        let density = match self.density() {
            Some(density) => density,
            None => return Ok(None),
        };
        let transfer_function = self.transfer_function();
        self.illumination
            .ensure(&density, &self.lights(), &transfer_function, params)
            .map(Some)
    }

    /// Renders one frame of the current volume. An empty scene renders
    /// transparent.
    pub fn render_frame(&self, sensor: &dyn Sensor, params: &RayMarchParameters) -> Result<Bitmap> {
        params.validate()?;
        let density = match self.density() {
            Some(density) => density,
            None => {
                log::debug!("No volume loaded; rendering an empty frame.");
                return Ok(Bitmap::new(sensor.width(), sensor.height()));
            }
        };

        let illumination = match self.update_illumination(params) {
            Ok(volume) => volume,
            Err(VolumeError::BuildCancelled) => self
                .illumination
                .current()
                .filter(|v| v.density_generation() == density.generation()),
            Err(e) => return Err(e),
        };
        let transfer_function = self.transfer_function();
        self.executor.render(&density, illumination.as_deref(), &transfer_function, sensor, params)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
