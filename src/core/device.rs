// Copyright @yucwang 2026

use crate::core::error::Result;
use crate::core::kernel::ComputeKernel;
use crate::core::volume::Dimensions;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Opaque id of a device resource. Only meaningful to the device that
/// issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Texel formats a volume texture can be stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    R16Unorm,
    R32Float,
}

impl TextureFormat {
    pub fn byte_size(&self) -> usize {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::R16Unorm => 2,
            TextureFormat::R32Float => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub dimensions: Dimensions,
    pub format: TextureFormat,
}

impl TextureDescriptor {
    pub fn new(dimensions: Dimensions, format: TextureFormat) -> Self {
        Self { dimensions, format }
    }

    pub fn slice_bytes(&self) -> usize {
        self.dimensions.slice_voxels() * self.format.byte_size()
    }

    pub fn byte_size(&self) -> Result<usize> {
        Ok(self.dimensions.voxel_count()? * self.format.byte_size())
    }
}

/// Shared flag a dispatch polls to abandon work early.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// One compute dispatch: a kernel, the textures bound to it in binding
/// order, and an optional cancellation flag.
pub struct Dispatch<'a> {
    pub kernel: &'a dyn ComputeKernel,
    pub bindings: &'a [TextureId],
    pub cancel: Option<&'a CancelToken>,
}

/// The graphics-resource collaborator the core is written against. The
/// core never touches device memory except through these calls.
pub trait GpuDevice: Send + Sync {
    fn create_texture_3d(&self, descriptor: TextureDescriptor) -> Result<TextureId>;

    /// Writes whole Z slices starting at `first_slice`.
    fn write_texture_3d(&self, id: TextureId, first_slice: usize, bytes: &[u8]) -> Result<()>;

    /// Runs `kernel.lanes()` independent lanes. Lane `i` writes
    /// `output[i * channels..(i + 1) * channels]`. Returns
    /// `BuildCancelled` if the token fired before all lanes ran.
    fn dispatch_compute(&self, dispatch: Dispatch<'_>, output: &mut [f32]) -> Result<()>;

    fn release_resource(&self, id: TextureId);

    fn describe(&self) -> String {
        String::from("GpuDevice")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_sizes() {
        let desc = TextureDescriptor::new(Dimensions::new(4, 3, 2), TextureFormat::R16Unorm);
        assert_eq!(desc.slice_bytes(), 24);
        assert_eq!(desc.byte_size().unwrap(), 48);
    }

    #[test]
    fn cancel_token_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
