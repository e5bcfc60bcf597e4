// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::core::volume::Dimensions;
use crate::io::header::{ByteOrder, DataLocation, ElementType, VolumeHeader};
use crate::math::constants::{Float, Vector3f};

use std::path::Path;

/// Size of a version 3 `VOL` header; the float payload follows directly.
pub const VOL_HEADER_BYTES: usize = 48;

/// Parses the binary header of a `VOL` grid. Only single-channel float32
/// grids are scalar volumes.
pub fn parse_header(bytes: &[u8], source: &Path) -> Result<VolumeHeader> {
    if bytes.len() < VOL_HEADER_BYTES {
        return Err(VolumeError::malformed("VOL", format!("{} header bytes, expected {}", bytes.len(), VOL_HEADER_BYTES)));
    }
    if &bytes[0..3] != b"VOL" {
        return Err(VolumeError::malformed("VOL", "missing magic"));
    }
    let version = bytes[3];
    if version != 3 {
        return Err(VolumeError::malformed("version", format!("unsupported vol version: {}", version)));
    }

    let mut cursor = 4usize;
    let encoding = read_i32(bytes, &mut cursor)?;
    let xres = read_i32(bytes, &mut cursor)?;
    let yres = read_i32(bytes, &mut cursor)?;
    let zres = read_i32(bytes, &mut cursor)?;
    let channels = read_i32(bytes, &mut cursor)?;

    if encoding != 1 {
        return Err(VolumeError::UnsupportedElementType(format!("vol encoding {}", encoding)));
    }
    if xres <= 0 || yres <= 0 || zres <= 0 {
        return Err(VolumeError::malformed("DimSize", format!("{} {} {} must be positive", xres, yres, zres)));
    }
    if channels != 1 {
        return Err(VolumeError::malformed("channels", format!("{} channels, only scalar volumes load", channels)));
    }

    let mut bounds = [0.0 as Float; 6];
    for b in bounds.iter_mut() {
        *b = read_f32(bytes, &mut cursor)?;
    }
    let p_min = Vector3f::new(bounds[0], bounds[1], bounds[2]);
    let p_max = Vector3f::new(bounds[3], bounds[4], bounds[5]);
    let dimensions = Dimensions::new(xres as usize, yres as usize, zres as usize);
    let spacing = (p_max - p_min).component_div(&dimensions.as_vector());

    let header = VolumeHeader {
        dimensions,
        spacing,
        origin: p_min,
        element_type: ElementType::Float32,
        byte_order: ByteOrder::Little,
        data: DataLocation { path: source.to_path_buf(), byte_offset: VOL_HEADER_BYTES as u64 },
    };
    header.validate()?;
    Ok(header)
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32> {
    if *cursor + 4 > bytes.len() {
        return Err(VolumeError::malformed("VOL", "unexpected eof while reading i32"));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(bytes: &[u8], cursor: &mut usize) -> Result<Float> {
    if *cursor + 4 > bytes.len() {
        return Err(VolumeError::malformed("VOL", "unexpected eof while reading f32"));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(Float::from_le_bytes(buf))
}

#[cfg(test)]
pub(crate) fn encode_header(dims: (i32, i32, i32), channels: i32, p_min: [f32; 3], p_max: [f32; 3]) -> Vec<u8> {
    let mut bytes = b"VOL".to_vec();
    bytes.push(3);
    for v in [1, dims.0, dims.1, dims.2, channels] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    for v in p_min.iter().chain(p_max.iter()) {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
