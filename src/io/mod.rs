// Copyright @yucwang 2026

pub mod exr_utils;
pub mod header;
pub mod mhd;
pub mod packer;
pub mod png_utils;
pub mod vol;

use crate::core::error::{Result, VolumeError};
use crate::math::bitmap::Bitmap;
use header::VolumeHeader;

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Reads a `.mhd`/`.mha` or `.vol` header and checks the payload it
/// references is large enough.
pub fn load_header(path: &Path) -> Result<VolumeHeader> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let header = match extension.as_str() {
        "mhd" | "mha" => {
            let mut reader = BufReader::new(File::open(path)?);
            let (text, header_len) = mhd::read_header_text(&mut reader)?;
            mhd::parse_header(&text, path, header_len)?
        }
        "vol" => {
            let mut bytes = Vec::with_capacity(vol::VOL_HEADER_BYTES);
            File::open(path)?
                .take(vol::VOL_HEADER_BYTES as u64)
                .read_to_end(&mut bytes)?;
            vol::parse_header(&bytes, path)?
        }
        other => {
            return Err(VolumeError::malformed(
                "extension",
                format!("'{}' is not a volume header; load raw files with explicit dimensions", other),
            ))
        }
    };

    validate_payload_file(&header)?;
    log::info!("Loaded header {}: {} {}.", path.display(), header.dimensions, header.element_type);
    Ok(header)
}

/// Checks the payload file holds every voxel the header promises.
pub fn validate_payload_file(header: &VolumeHeader) -> Result<()> {
    let len = fs::metadata(&header.data.path)?.len();
    header.validate_payload(len.saturating_sub(header.data.byte_offset))
}

/// Opens the payload positioned at its first voxel.
pub fn open_payload(header: &VolumeHeader) -> Result<BufReader<File>> {
    let mut reader = BufReader::new(File::open(&header.data.path)?);
    reader.seek(SeekFrom::Start(header.data.byte_offset))?;
    Ok(reader)
}

/// Writes `.exr` as float RGBA and anything else through the image crate.
pub fn write_image(bitmap: &Bitmap, path: &Path) -> Result<()> {
    let is_exr = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("exr"));
    if is_exr {
        exr_utils::write_exr_to_file(bitmap, path)
    } else {
        png_utils::write_png_to_file(bitmap, path)
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::temp_file;
    use super::*;
    use crate::core::volume::Dimensions;

    #[test]
    fn loads_mhd_with_external_payload() {
        let raw = temp_file("ext_payload.raw", &[1u8; 24]);
        let text = format!(
            "NDims = 3\nDimSize = 2 3 4\nElementType = MET_UCHAR\nElementDataFile = {}\n",
            raw.file_name().unwrap().to_str().unwrap()
        );
        let mhd = temp_file("ext_payload.mhd", text.as_bytes());
        let header = load_header(&mhd).unwrap();
        assert_eq!(header.dimensions, Dimensions::new(2, 3, 4));

        let mut payload = Vec::new();
        open_payload(&header).unwrap().read_to_end(&mut payload).unwrap();
        assert_eq!(payload, vec![1u8; 24]);
    }

    #[test]
    fn short_payload_is_size_mismatch() {
        let raw = temp_file("short_payload.raw", &[1u8; 23]);
        let text = format!(
            "DimSize = 2 3 4\nElementType = MET_UCHAR\nElementDataFile = {}\n",
            raw.file_name().unwrap().to_str().unwrap()
        );
        let mhd = temp_file("short_payload.mhd", text.as_bytes());
        assert!(matches!(load_header(&mhd), Err(VolumeError::SizeMismatch { expected: 24, actual: 23 })));
    }

    #[test]
    fn loads_local_mha_and_vol() {
        let text = "DimSize = 2 2 1\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n";
        let mut bytes = text.as_bytes().to_vec();
        bytes.extend_from_slice(&[9, 8, 7, 6]);
        let mha = temp_file("local.mha", &bytes);
        let header = load_header(&mha).unwrap();
        let mut payload = Vec::new();
        open_payload(&header).unwrap().read_to_end(&mut payload).unwrap();
        assert_eq!(payload, vec![9, 8, 7, 6]);

        let mut vol_bytes = vol::encode_header((1, 1, 2), 1, [0.0; 3], [1.0, 1.0, 2.0]);
        vol_bytes.extend_from_slice(&0.5f32.to_le_bytes());
        let vol_path = temp_file("short.vol", &vol_bytes);
        assert!(matches!(load_header(&vol_path), Err(VolumeError::SizeMismatch { expected: 8, actual: 4 })));
        vol_bytes.extend_from_slice(&0.75f32.to_le_bytes());
        let vol_path = temp_file("full.vol", &vol_bytes);
        assert_eq!(load_header(&vol_path).unwrap().dimensions, Dimensions::new(1, 1, 2));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(load_header(Path::new("scan.nrrd")), Err(VolumeError::MalformedHeader { .. })));
    }
}
