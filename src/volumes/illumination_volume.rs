// Copyright @yucwang 2026

use crate::core::volume::{Volume, VolumeGeometry};
use crate::textures::provider::TextureHandle;

/// Per-voxel light reaching the density volume, one R32 float per voxel.
/// Covers the same box as the density volume it was built from.
#[derive(Debug)]
pub struct IlluminationVolume {
    texture: TextureHandle,
    geometry: VolumeGeometry,
    density_generation: u64,
}

impl IlluminationVolume {
    pub fn new(texture: TextureHandle, geometry: VolumeGeometry, density_generation: u64) -> Self {
        Self { texture, geometry, density_generation }
    }

    /// Generation of the density volume this was propagated through.
    pub fn density_generation(&self) -> u64 {
        self.density_generation
    }
}

impl Volume for IlluminationVolume {
    fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    fn texture(&self) -> &TextureHandle {
        &self.texture
    }
}
