// Copyright @yucwang 2026

use crate::core::kernel::TextureView;
use crate::core::volume::VolumeGeometry;
use crate::math::constants::{Float, Vector3f};
use crate::volumes::VolumeFilterMode;

/// Filtered reads from a bound volume texture. Texel `i` is centred at
/// `(i + 0.5) / res` in texture space; reads outside clamp to the edge.
#[derive(Clone, Copy)]
pub struct VolumeSampler<'a> {
    view: TextureView<'a>,
    geometry: VolumeGeometry,
    filter_mode: VolumeFilterMode,
}

impl<'a> VolumeSampler<'a> {
    /// `geometry` places the texture in the world; its resolution may
    /// differ from the geometry's voxel grid.
    pub fn new(view: TextureView<'a>, geometry: VolumeGeometry, filter_mode: VolumeFilterMode) -> Self {
        Self { view, geometry, filter_mode }
    }

    pub fn sample_world(&self, p: &Vector3f) -> Float {
        self.sample_uvw(&self.geometry.to_uvw(p))
    }

    pub fn sample_uvw(&self, uvw: &Vector3f) -> Float {
        match self.filter_mode {
            VolumeFilterMode::Nearest => self.sample_nearest(uvw),
            VolumeFilterMode::Trilinear => self.sample_trilinear(uvw),
        }
    }

    fn sample_nearest(&self, p: &Vector3f) -> Float {
        let dims = self.view.dimensions();
        let xi = nearest_index(p.x, dims.x);
        let yi = nearest_index(p.y, dims.y);
        let zi = nearest_index(p.z, dims.z);
        self.view.fetch(xi, yi, zi)
    }

    fn sample_trilinear(&self, p: &Vector3f) -> Float {
        let dims = self.view.dimensions();
        let (x0, x1, tx) = linear_taps(p.x, dims.x);
        let (y0, y1, ty) = linear_taps(p.y, dims.y);
        let (z0, z1, tz) = linear_taps(p.z, dims.z);

        let c000 = self.view.fetch(x0, y0, z0);
        let c100 = self.view.fetch(x1, y0, z0);
        let c010 = self.view.fetch(x0, y1, z0);
        let c110 = self.view.fetch(x1, y1, z0);
        let c001 = self.view.fetch(x0, y0, z1);
        let c101 = self.view.fetch(x1, y0, z1);
        let c011 = self.view.fetch(x0, y1, z1);
        let c111 = self.view.fetch(x1, y1, z1);

        let c00 = c000 * (1.0 - tx) + c100 * tx;
        let c10 = c010 * (1.0 - tx) + c110 * tx;
        let c01 = c001 * (1.0 - tx) + c101 * tx;
        let c11 = c011 * (1.0 - tx) + c111 * tx;

        let c0 = c00 * (1.0 - ty) + c10 * ty;
        let c1 = c01 * (1.0 - ty) + c11 * ty;

        c0 * (1.0 - tz) + c1 * tz
    }
}

fn nearest_index(u: Float, res: usize) -> usize {
    let x = (u * res as Float).floor();
    (x.max(0.0) as usize).min(res - 1)
}

/// Two clamped taps and the blend weight along one axis.
fn linear_taps(u: Float, res: usize) -> (usize, usize, Float) {
    let x = u * res as Float - 0.5;
    let x0 = x.floor();
    let t = if x0.is_finite() { x - x0 } else { 0.0 };
    let last = res as isize - 1;
    let i0 = (x0 as isize).clamp(0, last) as usize;
    let i1 = (x0 as isize + 1).clamp(0, last) as usize;
    (i0, i1, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::{TextureDescriptor, TextureFormat};
    use crate::core::volume::Dimensions;
    use crate::io::header::{ByteOrder, ElementType, VolumeHeader};
    use crate::io::packer::{OutputPrecision, PackOptions, VolumeDataPacker};
    use std::io::Cursor;

    #[test]
    fn packed_values_roundtrip_at_voxel_centres() {
        let dims = Dimensions::new(3, 2, 4);
        let header = VolumeHeader::raw("mem.raw", dims, ElementType::UInt16, ByteOrder::Big,
                                       Vector3f::new(0.5, 2.0, 1.0)).unwrap();
        let raw: Vec<u16> = (0..24u16).map(|v| v * 2731).collect();
        let payload: Vec<u8> = raw.iter().flat_map(|v| v.to_be_bytes()).collect();

        for precision in [OutputPrecision::Auto, OutputPrecision::Float] {
            let options = PackOptions { precision, ..PackOptions::default() };
            let packer = VolumeDataPacker::new(&header, options).unwrap();
            let (packed, summary) = packer.pack_to_vec(&mut Cursor::new(payload.clone())).unwrap();
            let view = TextureView::new(TextureDescriptor::new(dims, summary.format), &packed).unwrap();
            let geometry = header.geometry();
            let sampler = VolumeSampler::new(view, geometry, VolumeFilterMode::Trilinear);

            for z in 0..dims.z {
                for y in 0..dims.y {
                    for x in 0..dims.x {
                        let expected = raw[dims.index(x, y, z)] as Float / 65535.0;
                        let p = geometry.voxel_center(&dims, x, y, z);
                        let got = sampler.sample_world(&p);
                        assert!((got - expected).abs() < 1e-4, "{:?} at ({}, {}, {}): {} vs {}",
                                precision, x, y, z, got, expected);
                    }
                }
            }
        }
    }

    #[test]
    fn trilinear_blends_and_clamps() {
        let dims = Dimensions::new(2, 1, 1);
        let data: Vec<u8> = [0.0f32, 1.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = TextureView::new(TextureDescriptor::new(dims, TextureFormat::R32Float), &data).unwrap();
        let geometry = VolumeGeometry::new(Vector3f::zeros(), Vector3f::new(1.0, 1.0, 1.0), dims);
        let linear = VolumeSampler::new(view, geometry, VolumeFilterMode::Trilinear);
        assert!((linear.sample_uvw(&Vector3f::new(0.5, 0.5, 0.5)) - 0.5).abs() < 1e-6);
        assert_eq!(linear.sample_uvw(&Vector3f::new(0.0, 0.5, 0.5)), 0.0);
        assert_eq!(linear.sample_uvw(&Vector3f::new(1.0, 0.5, 0.5)), 1.0);
        assert_eq!(linear.sample_uvw(&Vector3f::new(-3.0, 9.0, 0.5)), 0.0);

        let nearest = VolumeSampler::new(view, geometry, VolumeFilterMode::Nearest);
        assert_eq!(nearest.sample_uvw(&Vector3f::new(0.49, 0.5, 0.5)), 0.0);
        assert_eq!(nearest.sample_uvw(&Vector3f::new(0.51, 0.5, 0.5)), 1.0);
        assert_eq!(nearest.sample_uvw(&Vector3f::new(7.0, 0.5, 0.5)), 1.0);
    }
}
