// Copyright @yucwang 2026

use crate::core::device::{GpuDevice, TextureDescriptor, TextureFormat, TextureId};
use crate::core::error::{Result, VolumeError};
use crate::core::volume::Dimensions;

use std::fmt;
use std::sync::Arc;

/// Owning reference to a device texture. The texture is released when the
/// handle is dropped, so a handle is never `Clone`.
pub struct TextureHandle {
    id: TextureId,
    descriptor: TextureDescriptor,
    device: Arc<dyn GpuDevice>,
}

impl TextureHandle {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn descriptor(&self) -> TextureDescriptor {
        self.descriptor
    }

    pub fn dimensions(&self) -> Dimensions {
        self.descriptor.dimensions
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureHandle")
            .field("id", &self.id)
            .field("dimensions", &self.descriptor.dimensions)
            .field("format", &self.descriptor.format)
            .finish()
    }
}

impl Drop for TextureHandle {
    fn drop(&mut self) {
        log::debug!("Releasing texture {} ({}).", self.id, self.descriptor.dimensions);
        self.device.release_resource(self.id);
    }
}

/// Creates, fills and releases 3D textures on a `GpuDevice`.
#[derive(Clone)]
pub struct VolumeTextureProvider {
    device: Arc<dyn GpuDevice>,
}

impl VolumeTextureProvider {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn create(&self, dimensions: Dimensions, format: TextureFormat) -> Result<TextureHandle> {
        if dimensions.is_empty() {
            return Err(VolumeError::invalid("dimensions", format!("{} has an empty side", dimensions)));
        }
        let descriptor = TextureDescriptor::new(dimensions, format);
        let id = self.device.create_texture_3d(descriptor)?;
        log::debug!("Created texture {} {} {:?}.", id, dimensions, format);
        Ok(TextureHandle { id, descriptor, device: Arc::clone(&self.device) })
    }

    /// Fills the whole texture. `bytes` must cover every voxel exactly.
    pub fn upload(&self, handle: &TextureHandle, bytes: &[u8]) -> Result<()> {
        let expected = handle.descriptor.byte_size()?;
        if bytes.len() != expected {
            return Err(VolumeError::SizeMismatch { expected: expected as u64, actual: bytes.len() as u64 });
        }
        self.device.write_texture_3d(handle.id, 0, bytes)
    }

    /// Fills whole Z slices starting at `first_slice`.
    pub fn upload_slices(&self, handle: &TextureHandle, first_slice: usize, bytes: &[u8]) -> Result<()> {
        let slice_bytes = handle.descriptor.slice_bytes();
        if slice_bytes == 0 || bytes.len() % slice_bytes != 0 {
            let whole = if slice_bytes == 0 { 0 } else { bytes.len() / slice_bytes * slice_bytes };
            return Err(VolumeError::SizeMismatch { expected: whole as u64, actual: bytes.len() as u64 });
        }
        let slices = bytes.len() / slice_bytes;
        if first_slice + slices > handle.descriptor.dimensions.z {
            let expected = (handle.descriptor.dimensions.z.saturating_sub(first_slice)) * slice_bytes;
            return Err(VolumeError::SizeMismatch { expected: expected as u64, actual: bytes.len() as u64 });
        }
        self.device.write_texture_3d(handle.id, first_slice, bytes)
    }

    /// Explicit release; equivalent to dropping the handle.
    pub fn release(&self, handle: TextureHandle) {
        drop(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::host::HostDevice;

    fn provider() -> (Arc<HostDevice>, VolumeTextureProvider) {
        let device = Arc::new(HostDevice::new());
        let provider = VolumeTextureProvider::new(device.clone());
        (device, provider)
    }

    #[test]
    fn handle_releases_on_drop() {
        let (device, provider) = provider();
        let handle = provider.create(Dimensions::new(2, 2, 2), TextureFormat::R8Unorm).unwrap();
        assert_eq!(device.texture_count(), 1);
        assert_eq!(device.allocated_bytes(), 8);
        provider.release(handle);
        assert_eq!(device.texture_count(), 0);
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn upload_requires_exact_size() {
        let (device, provider) = provider();
        let handle = provider.create(Dimensions::new(2, 2, 2), TextureFormat::R16Unorm).unwrap();
        let err = provider.upload(&handle, &[0u8; 15]).unwrap_err();
        assert!(matches!(err, VolumeError::SizeMismatch { expected: 16, actual: 15 }));
        provider.upload(&handle, &[7u8; 16]).unwrap();
        assert_eq!(device.read_texture(handle.id()).unwrap(), vec![7u8; 16]);
    }

    #[test]
    fn upload_slices_checks_bounds() {
        let (device, provider) = provider();
        let handle = provider.create(Dimensions::new(2, 1, 3), TextureFormat::R8Unorm).unwrap();
        provider.upload_slices(&handle, 1, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.read_texture(handle.id()).unwrap(), vec![0, 0, 1, 2, 3, 4]);
        assert!(provider.upload_slices(&handle, 2, &[1, 2, 3, 4]).is_err());
        assert!(provider.upload_slices(&handle, 0, &[1, 2, 3]).is_err());
    }

    #[test]
    fn empty_dimensions_are_rejected() {
        let (device, provider) = provider();
        assert!(provider.create(Dimensions::new(0, 2, 2), TextureFormat::R8Unorm).is_err());
        assert_eq!(device.texture_count(), 0);
    }
}
