// Copyright @yucwang 2026

use crate::core::device::{TextureDescriptor, TextureFormat};
use crate::core::volume::Dimensions;
use crate::math::constants::Float;

/// Read-only view of a bound texture as seen by a running kernel.
#[derive(Clone, Copy)]
pub struct TextureView<'a> {
    descriptor: TextureDescriptor,
    data: &'a [u8],
}

impl<'a> TextureView<'a> {
    /// `data` must hold exactly one texel per voxel of `descriptor`.
    pub fn new(descriptor: TextureDescriptor, data: &'a [u8]) -> Option<Self> {
        match descriptor.byte_size() {
            Ok(size) if size == data.len() => Some(Self { descriptor, data }),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.descriptor.dimensions
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Texel value; unorm formats decode to `[0, 1]`.
    pub fn fetch(&self, x: usize, y: usize, z: usize) -> Float {
        let idx = self.descriptor.dimensions.index(x, y, z);
        match self.descriptor.format {
            TextureFormat::R8Unorm => self.data[idx] as Float / 255.0,
            TextureFormat::R16Unorm => {
                let b = idx * 2;
                u16::from_le_bytes([self.data[b], self.data[b + 1]]) as Float / 65535.0
            }
            TextureFormat::R32Float => {
                let b = idx * 4;
                Float::from_le_bytes([self.data[b], self.data[b + 1], self.data[b + 2], self.data[b + 3]])
            }
        }
    }
}

/// A compute program: `lanes()` independent invocations, each writing
/// `channels()` floats.
pub trait ComputeKernel: Sync {
    fn name(&self) -> &'static str;
    fn lanes(&self) -> usize;
    fn channels(&self) -> usize;
    fn invoke(&self, lane: usize, textures: &[TextureView<'_>], out: &mut [f32]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_decodes_formats() {
        let dims = Dimensions::new(2, 1, 1);
        let r8 = [0u8, 255];
        let view = TextureView::new(TextureDescriptor::new(dims, TextureFormat::R8Unorm), &r8).unwrap();
        assert_eq!(view.fetch(1, 0, 0), 1.0);

        let mut r16 = Vec::new();
        r16.extend_from_slice(&0u16.to_le_bytes());
        r16.extend_from_slice(&65535u16.to_le_bytes());
        let view = TextureView::new(TextureDescriptor::new(dims, TextureFormat::R16Unorm), &r16).unwrap();
        assert_eq!(view.fetch(0, 0, 0), 0.0);
        assert_eq!(view.fetch(1, 0, 0), 1.0);

        let mut r32 = Vec::new();
        r32.extend_from_slice(&0.25f32.to_le_bytes());
        r32.extend_from_slice(&2.5f32.to_le_bytes());
        let view = TextureView::new(TextureDescriptor::new(dims, TextureFormat::R32Float), &r32).unwrap();
        assert_eq!(view.fetch(1, 0, 0), 2.5);
    }

    #[test]
    fn view_rejects_wrong_length() {
        let dims = Dimensions::new(2, 2, 1);
        let data = [0u8; 3];
        assert!(TextureView::new(TextureDescriptor::new(dims, TextureFormat::R8Unorm), &data).is_none());
    }
}
