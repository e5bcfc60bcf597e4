// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::core::volume::Dimensions;
use crate::io::header::{ByteOrder, DataLocation, ElementType, VolumeHeader};
use crate::math::constants::{Float, Vector3f};

use std::io::BufRead;
use std::path::Path;

const IGNORED_KEYS: [&str; 8] = [
    "ObjectType",
    "BinaryData",
    "TransformMatrix",
    "Rotation",
    "Orientation",
    "CenterOfRotation",
    "AnatomicalOrientation",
    "Comment",
];

/// Reads MetaImage header lines up to and including `ElementDataFile`,
/// which always terminates the header. Returns the text and its length in
/// bytes, which is where a `LOCAL` payload starts.
pub fn read_header_text<R: BufRead>(reader: &mut R) -> Result<(String, u64)> {
    let mut text = String::new();
    let mut consumed = 0u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        consumed += read as u64;
        let decoded = std::str::from_utf8(&line)
            .map_err(|_| VolumeError::malformed("header", "header is not valid UTF-8 text"))?;
        text.push_str(decoded);
        if decoded.trim_start().starts_with("ElementDataFile") {
            break;
        }
    }
    Ok((text, consumed))
}

/// Parses MetaImage `key = value` text read from `source`. `header_len` is
/// the byte offset of a `LOCAL` payload; external data files are resolved
/// against the directory of `source`.
pub fn parse_header(text: &str, source: &Path, header_len: u64) -> Result<VolumeHeader> {
    let mut ndims: Option<usize> = None;
    let mut dim_size: Option<Vec<usize>> = None;
    let mut element_type: Option<ElementType> = None;
    let mut data_file: Option<String> = None;
    let mut spacing = Vector3f::new(1.0, 1.0, 1.0);
    let mut origin = Vector3f::zeros();
    let mut byte_order = ByteOrder::Little;
    let mut header_size: u64 = 0;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => {
                log::warn!("Ignoring header line {} without '=': {}", line_no + 1, line);
                continue;
            }
        };

        match key {
            "NDims" => {
                let n = parse_usize(key, value)?;
                if n != 2 && n != 3 {
                    return Err(VolumeError::malformed(key, format!("{} dimensions are not supported", n)));
                }
                ndims = Some(n);
            }
            "DimSize" => {
                let dims = value
                    .split_whitespace()
                    .map(|v| parse_usize(key, v))
                    .collect::<Result<Vec<_>>>()?;
                dim_size = Some(dims);
            }
            "ElementType" => element_type = Some(ElementType::from_met(value)?),
            "ElementDataFile" => data_file = Some(value.to_string()),
            "ElementSpacing" | "ElementSize" => spacing = parse_vector(key, value, 1.0)?,
            "Offset" | "Position" | "Origin" => origin = parse_vector(key, value, 0.0)?,
            "ElementByteOrderMSB" | "BinaryDataByteOrderMSB" | "ByteOrderMSB" => {
                byte_order = if parse_bool(key, value)? { ByteOrder::Big } else { ByteOrder::Little };
            }
            "HeaderSize" => {
                header_size = value
                    .parse::<u64>()
                    .map_err(|_| VolumeError::malformed(key, format!("'{}' is not a byte offset", value)))?;
            }
            "ElementNumberOfChannels" => {
                let channels = parse_usize(key, value)?;
                if channels != 1 {
                    return Err(VolumeError::malformed(key, format!("{} channels, only scalar volumes load", channels)));
                }
            }
            "CompressedData" => {
                if parse_bool(key, value)? {
                    return Err(VolumeError::malformed(key, "compressed payloads are not supported"));
                }
            }
            "CompressedDataSize" => {
                return Err(VolumeError::malformed(key, "compressed payloads are not supported"));
            }
            k if IGNORED_KEYS.contains(&k) => {}
            other => log::warn!("Ignoring unknown header key '{}'.", other),
        }
    }

    let dim_size = dim_size.ok_or_else(|| VolumeError::malformed("DimSize", "missing"))?;
    let ndims = ndims.unwrap_or(dim_size.len());
    if dim_size.len() != ndims {
        return Err(VolumeError::malformed(
            "DimSize",
            format!("{} values given for NDims = {}", dim_size.len(), ndims),
        ));
    }
    let dimensions = match dim_size.as_slice() {
        [x, y] => Dimensions::new(*x, *y, 1),
        [x, y, z] => Dimensions::new(*x, *y, *z),
        _ => return Err(VolumeError::malformed("DimSize", format!("{} values, expected 2 or 3", dim_size.len()))),
    };
    let element_type = element_type.ok_or_else(|| VolumeError::malformed("ElementType", "missing"))?;
    let data_file = data_file.ok_or_else(|| VolumeError::malformed("ElementDataFile", "missing"))?;

    let data = if data_file.eq_ignore_ascii_case("LOCAL") {
        DataLocation { path: source.to_path_buf(), byte_offset: header_len + header_size }
    } else if data_file.is_empty() || data_file.eq_ignore_ascii_case("LIST") || data_file.contains('%') {
        return Err(VolumeError::malformed("ElementDataFile", format!("'{}' is not a single data file", data_file)));
    } else {
        let base_dir = source.parent().unwrap_or_else(|| Path::new(""));
        DataLocation { path: base_dir.join(&data_file), byte_offset: header_size }
    };

    let header = VolumeHeader { dimensions, spacing, origin, element_type, byte_order, data };
    header.validate()?;
    Ok(header)
}

fn parse_usize(field: &str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|_| VolumeError::malformed(field, format!("'{}' is not a positive integer", value)))
}

fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(VolumeError::malformed(field, format!("'{}' is not a boolean", value))),
    }
}

/// Two-value vectors describe a single slice; `z` fills the third axis.
fn parse_vector(field: &str, value: &str, z: Float) -> Result<Vector3f> {
    let values = value
        .split_whitespace()
        .map(|v| v.parse::<Float>().map_err(|_| VolumeError::malformed(field, format!("'{}' is not a number", v))))
        .collect::<Result<Vec<_>>>()?;
    match values.as_slice() {
        [x, y] => Ok(Vector3f::new(*x, *y, z)),
        [x, y, z, ..] => Ok(Vector3f::new(*x, *y, *z)),
        _ => Err(VolumeError::malformed(field, format!("'{}' needs at least two values", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "ObjectType = Image\n\
                          NDims = 3\n\
                          DimSize = 256 256 128\n\
                          ElementSpacing = 0.5 0.5 1.25\n\
                          Offset = -10 0 5\n\
                          ElementByteOrderMSB = True\n\
                          ElementType = MET_SHORT\n\
                          ElementDataFile = head.raw\n";

    #[test]
    fn parses_external_data_header() {
        let header = parse_header(HEADER, Path::new("/data/head.mhd"), 0).unwrap();
        assert_eq!(header.dimensions, Dimensions::new(256, 256, 128));
        assert_eq!(header.spacing, Vector3f::new(0.5, 0.5, 1.25));
        assert_eq!(header.origin, Vector3f::new(-10.0, 0.0, 5.0));
        assert_eq!(header.element_type, ElementType::Int16);
        assert_eq!(header.byte_order, ByteOrder::Big);
        assert_eq!(header.data.path, Path::new("/data/head.raw"));
        assert_eq!(header.data.byte_offset, 0);
    }

    #[test]
    fn local_payload_starts_after_header() {
        let text = "NDims = 2\nDimSize = 4 3\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n";
        let mut bytes = text.as_bytes().to_vec();
        bytes.extend_from_slice(&[0xAB; 12]);
        let (read, len) = read_header_text(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(len, text.len() as u64);
        let header = parse_header(&read, Path::new("scan.mha"), len).unwrap();
        assert_eq!(header.dimensions, Dimensions::new(4, 3, 1));
        assert_eq!(header.data.byte_offset, text.len() as u64);
        assert_eq!(header.data.path, Path::new("scan.mha"));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = parse_header("ElementType = MET_UCHAR\nElementDataFile = a.raw\n", Path::new("."), 0).unwrap_err();
        assert!(matches!(err, VolumeError::MalformedHeader { ref field, .. } if field == "DimSize"));
        let err = parse_header("DimSize = 1 1 1\nElementDataFile = a.raw\n", Path::new("."), 0).unwrap_err();
        assert!(matches!(err, VolumeError::MalformedHeader { ref field, .. } if field == "ElementType"));
        let err = parse_header("DimSize = 1 1 1\nElementType = MET_UCHAR\n", Path::new("."), 0).unwrap_err();
        assert!(matches!(err, VolumeError::MalformedHeader { ref field, .. } if field == "ElementDataFile"));
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            "DimSize = 0 4 4\nElementType = MET_UCHAR\nElementDataFile = a.raw\n",
            "DimSize = 4 x 4\nElementType = MET_UCHAR\nElementDataFile = a.raw\n",
            "NDims = 3\nDimSize = 4 4\nElementType = MET_UCHAR\nElementDataFile = a.raw\n",
            "DimSize = 4 4 4\nElementSpacing = 1 0 1\nElementType = MET_UCHAR\nElementDataFile = a.raw\n",
            "DimSize = 4 4 4\nCompressedData = True\nElementType = MET_UCHAR\nElementDataFile = a.raw\n",
            "DimSize = 4 4 4\nElementNumberOfChannels = 3\nElementType = MET_UCHAR\nElementDataFile = a.raw\n",
        ];
        for text in bad.iter() {
            assert!(matches!(parse_header(text, Path::new("."), 0), Err(VolumeError::MalformedHeader { .. })), "{}", text);
        }
        let unsupported = "DimSize = 4 4 4\nElementType = MET_DOUBLE\nElementDataFile = a.raw\n";
        assert!(matches!(parse_header(unsupported, Path::new("."), 0), Err(VolumeError::UnsupportedElementType(_))));
    }
}
