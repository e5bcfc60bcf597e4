// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::core::volume::{Dimensions, VolumeGeometry};
use crate::math::constants::{Float, Vector3f};

use std::fmt;
use std::path::PathBuf;

/// Scalar type of the voxels in a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
}

impl ElementType {
    pub fn byte_size(&self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
        }
    }

    pub fn from_met(name: &str) -> Result<Self> {
        match name {
            "MET_CHAR" => Ok(ElementType::Int8),
            "MET_UCHAR" => Ok(ElementType::UInt8),
            "MET_SHORT" => Ok(ElementType::Int16),
            "MET_USHORT" => Ok(ElementType::UInt16),
            "MET_INT" => Ok(ElementType::Int32),
            "MET_UINT" => Ok(ElementType::UInt32),
            "MET_FLOAT" => Ok(ElementType::Float32),
            other => Err(VolumeError::UnsupportedElementType(other.to_string())),
        }
    }

    pub fn met_name(&self) -> &'static str {
        match self {
            ElementType::Int8 => "MET_CHAR",
            ElementType::UInt8 => "MET_UCHAR",
            ElementType::Int16 => "MET_SHORT",
            ElementType::UInt16 => "MET_USHORT",
            ElementType::Int32 => "MET_INT",
            ElementType::UInt32 => "MET_UINT",
            ElementType::Float32 => "MET_FLOAT",
        }
    }

    /// Native value range of the type. Floats are treated as normalized.
    pub fn native_range(&self) -> (f64, f64) {
        match self {
            ElementType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            ElementType::UInt8 => (0.0, u8::MAX as f64),
            ElementType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            ElementType::UInt16 => (0.0, u16::MAX as f64),
            ElementType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            ElementType::UInt32 => (0.0, u32::MAX as f64),
            ElementType::Float32 => (0.0, 1.0),
        }
    }

    /// Decodes one element from exactly `byte_size()` bytes.
    pub fn decode(&self, bytes: &[u8], order: ByteOrder) -> f64 {
        match self {
            ElementType::Int8 => bytes[0] as i8 as f64,
            ElementType::UInt8 => bytes[0] as f64,
            ElementType::Int16 => {
                let raw = [bytes[0], bytes[1]];
                match order {
                    ByteOrder::Little => i16::from_le_bytes(raw) as f64,
                    ByteOrder::Big => i16::from_be_bytes(raw) as f64,
                }
            }
            ElementType::UInt16 => {
                let raw = [bytes[0], bytes[1]];
                match order {
                    ByteOrder::Little => u16::from_le_bytes(raw) as f64,
                    ByteOrder::Big => u16::from_be_bytes(raw) as f64,
                }
            }
            ElementType::Int32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                match order {
                    ByteOrder::Little => i32::from_le_bytes(raw) as f64,
                    ByteOrder::Big => i32::from_be_bytes(raw) as f64,
                }
            }
            ElementType::UInt32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                match order {
                    ByteOrder::Little => u32::from_le_bytes(raw) as f64,
                    ByteOrder::Big => u32::from_be_bytes(raw) as f64,
                }
            }
            ElementType::Float32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                match order {
                    ByteOrder::Little => f32::from_le_bytes(raw) as f64,
                    ByteOrder::Big => f32::from_be_bytes(raw) as f64,
                }
            }
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.met_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Where the raw voxels live.
#[derive(Clone, Debug, PartialEq)]
pub struct DataLocation {
    pub path: PathBuf,
    pub byte_offset: u64,
}

/// Validated description of a scalar volume payload.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeHeader {
    pub dimensions: Dimensions,
    pub spacing: Vector3f,
    pub origin: Vector3f,
    pub element_type: ElementType,
    pub byte_order: ByteOrder,
    pub data: DataLocation,
}

impl VolumeHeader {
    /// Header for a headerless raw file.
    pub fn raw(path: impl Into<PathBuf>,
               dimensions: Dimensions,
               element_type: ElementType,
               byte_order: ByteOrder,
               spacing: Vector3f) -> Result<Self> {
        let header = Self {
            dimensions,
            spacing,
            origin: Vector3f::zeros(),
            element_type,
            byte_order,
            data: DataLocation { path: path.into(), byte_offset: 0 },
        };
        header.validate()?;
        Ok(header)
    }

    /// Checks dimensions and spacing are positive and finite.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(VolumeError::malformed("DimSize", format!("{} must be positive", self.dimensions)));
        }
        self.dimensions.voxel_count()?;
        let spacing_ok = self.spacing.iter().all(|s| s.is_finite() && *s > 0.0);
        if !spacing_ok {
            return Err(VolumeError::malformed(
                "ElementSpacing",
                format!("{:?} must be positive", self.spacing.as_slice()),
            ));
        }
        if !self.origin.iter().all(|o| o.is_finite()) {
            return Err(VolumeError::malformed("Offset", "must be finite"));
        }
        Ok(())
    }

    pub fn payload_bytes(&self) -> Result<u64> {
        let voxels = self.dimensions.voxel_count()? as u64;
        voxels
            .checked_mul(self.element_type.byte_size() as u64)
            .ok_or_else(|| VolumeError::malformed("DimSize", "payload size overflows"))
    }

    /// `available` is the number of payload bytes reachable after the
    /// data offset.
    pub fn validate_payload(&self, available: u64) -> Result<()> {
        let expected = self.payload_bytes()?;
        if expected > available {
            return Err(VolumeError::SizeMismatch { expected, actual: available });
        }
        Ok(())
    }

    pub fn geometry(&self) -> VolumeGeometry {
        VolumeGeometry::new(self.origin, self.spacing, self.dimensions)
    }

    pub fn world_size(&self) -> Vector3f {
        self.spacing.component_mul(&self.dimensions.as_vector())
    }

    pub fn describe(&self) -> String {
        let size = self.world_size();
        format!(
            "File name {} details:\nDimensions = {}\nSpacing : {}\nWorld Size : {}\nOrigin : {}\nElement type : {} ({:?} endian)\nPayload offset : {}",
            self.data.path.display(),
            self.dimensions,
            format_vector(&self.spacing),
            format_vector(&size),
            format_vector(&self.origin),
            self.element_type,
            self.byte_order,
            self.data.byte_offset,
        )
    }
}

fn format_vector(v: &Vector3f) -> String {
    format!("X={} Y={} Z={}", v.x as Float, v.y as Float, v.z as Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_types_decode_with_byte_order() {
        assert_eq!(ElementType::Int8.decode(&[0xFF], ByteOrder::Little), -1.0);
        assert_eq!(ElementType::UInt16.decode(&[0x01, 0x02], ByteOrder::Little), 513.0);
        assert_eq!(ElementType::UInt16.decode(&[0x01, 0x02], ByteOrder::Big), 258.0);
        assert_eq!(ElementType::Int16.decode(&(-300i16).to_be_bytes(), ByteOrder::Big), -300.0);
        assert_eq!(ElementType::Float32.decode(&1.5f32.to_be_bytes(), ByteOrder::Big), 1.5);
        assert_eq!(ElementType::UInt32.decode(&7u32.to_le_bytes(), ByteOrder::Little), 7.0);
    }

    #[test]
    fn met_names_roundtrip() {
        for ty in [ElementType::Int8, ElementType::UInt8, ElementType::Int16, ElementType::UInt16,
                   ElementType::Int32, ElementType::UInt32, ElementType::Float32] {
            assert_eq!(ElementType::from_met(ty.met_name()).unwrap(), ty);
        }
        assert!(matches!(ElementType::from_met("MET_DOUBLE"), Err(VolumeError::UnsupportedElementType(_))));
    }

    #[test]
    fn payload_validation() {
        let header = VolumeHeader::raw("a.raw", Dimensions::new(4, 4, 4), ElementType::UInt16,
                                       ByteOrder::Little, Vector3f::new(1.0, 1.0, 2.0)).unwrap();
        assert_eq!(header.payload_bytes().unwrap(), 128);
        assert!(header.validate_payload(128).is_ok());
        assert!(header.validate_payload(1000).is_ok());
        assert!(matches!(header.validate_payload(127),
                         Err(VolumeError::SizeMismatch { expected: 128, actual: 127 })));
        assert_eq!(header.world_size(), Vector3f::new(4.0, 4.0, 8.0));
        assert!(header.describe().contains("Dimensions = 4x4x4"));
    }

    #[test]
    fn raw_header_rejects_bad_geometry() {
        assert!(VolumeHeader::raw("a.raw", Dimensions::new(0, 4, 4), ElementType::UInt8,
                                  ByteOrder::Little, Vector3f::new(1.0, 1.0, 1.0)).is_err());
        assert!(VolumeHeader::raw("a.raw", Dimensions::new(1, 4, 4), ElementType::UInt8,
                                  ByteOrder::Little, Vector3f::new(1.0, -1.0, 1.0)).is_err());
    }
}
