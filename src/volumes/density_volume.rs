// Copyright @yucwang 2026

use crate::core::error::Result;
use crate::core::volume::{Volume, VolumeGeometry};
use crate::io::header::VolumeHeader;
use crate::io::packer::{PackOptions, VolumeDataPacker};
use crate::textures::provider::{TextureHandle, VolumeTextureProvider};

use std::io::{Read, Seek};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Device-resident scalar volume, normalized to `[0, 1]`. Immutable once
/// uploaded.
#[derive(Debug)]
pub struct DensityVolume {
    texture: TextureHandle,
    header: VolumeHeader,
    geometry: VolumeGeometry,
    value_range: (f64, f64),
    generation: u64,
}

impl DensityVolume {
    /// Packs the payload from `reader` straight into a new texture, one
    /// chunk at a time. On error the texture is released and nothing
    /// escapes.
    pub fn upload<R: Read + Seek>(provider: &VolumeTextureProvider,
                                  header: VolumeHeader,
                                  reader: &mut R,
                                  options: PackOptions) -> Result<Self> {
        let packer = VolumeDataPacker::new(&header, options)?;
        let texture = provider.create(header.dimensions, packer.output_format())?;
        let summary = packer.pack(reader, |first_slice, bytes| provider.upload_slices(&texture, first_slice, bytes))?;

        log::info!(
            "Uploaded {} volume as {:?} ({} bytes, range [{}, {}]).",
            header.dimensions, summary.format, summary.bytes_written, summary.value_range.0, summary.value_range.1
        );
        let geometry = header.geometry();
        Ok(Self {
            texture,
            header,
            geometry,
            value_range: summary.value_range,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        })
    }

    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Original-unit range that maps onto `[0, 1]`.
    pub fn value_range(&self) -> (f64, f64) {
        self.value_range
    }

    /// Unique per upload; lets dependents detect a replaced volume.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Original units to texture units.
    pub fn normalize_value(&self, value: f64) -> f64 {
        let (lo, hi) = self.value_range;
        if hi > lo { (value - lo) / (hi - lo) } else { 0.0 }
    }

    /// Texture units back to original units.
    pub fn denormalize_value(&self, value: f64) -> f64 {
        let (lo, hi) = self.value_range;
        value * (hi - lo) + lo
    }

    /// Original-unit width to texture-unit width.
    pub fn normalize_range(&self, range: f64) -> f64 {
        let (lo, hi) = self.value_range;
        if hi > lo { range / (hi - lo) } else { 0.0 }
    }
}

impl Volume for DensityVolume {
    fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    fn texture(&self) -> &TextureHandle {
        &self.texture
    }
}
