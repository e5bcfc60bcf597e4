// Copyright @yucwang 2026

use crate::core::device::TextureFormat;
use crate::core::error::{Result, VolumeError};
use crate::io::header::VolumeHeader;

use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// How raw scalars are rescaled into `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Normalization {
    /// Native range of the element type. Float payloads are clamped.
    TypeRange,
    /// Observed `[min, max]` of the payload; costs a second read pass.
    DataRange,
    /// Explicit window in original units, `min < max`.
    Window { min: f64, max: f64 },
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::TypeRange
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputPrecision {
    /// R8 for 8-bit payloads, R16 otherwise.
    Auto,
    /// R32 float, no quantization.
    Float,
}

impl Default for OutputPrecision {
    fn default() -> Self {
        OutputPrecision::Auto
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackOptions {
    pub normalization: Normalization,
    pub precision: OutputPrecision,
    /// Upper bound on input bytes converted per chunk. At least one Z
    /// slice is always converted at a time.
    pub chunk_bytes: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            normalization: Normalization::default(),
            precision: OutputPrecision::default(),
            chunk_bytes: 16 << 20,
        }
    }
}

/// Result of a packing run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackSummary {
    pub format: TextureFormat,
    /// Original-unit range mapped onto `[0, 1]`.
    pub value_range: (f64, f64),
    pub bytes_written: u64,
}

/// Streams a raw payload into normalized texels, whole Z slices at a time.
pub struct VolumeDataPacker<'a> {
    header: &'a VolumeHeader,
    options: PackOptions,
}

impl<'a> VolumeDataPacker<'a> {
    pub fn new(header: &'a VolumeHeader, options: PackOptions) -> Result<Self> {
        header.validate()?;
        if let Normalization::Window { min, max } = options.normalization {
            if !min.is_finite() || !max.is_finite() || min >= max {
                return Err(VolumeError::invalid("window", format!("[{}, {}] must satisfy min < max", min, max)));
            }
        }
        if options.chunk_bytes == 0 {
            return Err(VolumeError::invalid("chunk_bytes", "must be positive"));
        }
        Ok(Self { header, options })
    }

    pub fn output_format(&self) -> TextureFormat {
        match self.options.precision {
            OutputPrecision::Float => TextureFormat::R32Float,
            OutputPrecision::Auto => match self.header.element_type.byte_size() {
                1 => TextureFormat::R8Unorm,
                _ => TextureFormat::R16Unorm,
            },
        }
    }

    /// Slices converted per chunk, never more than the volume holds.
    fn slices_per_chunk(&self) -> usize {
        let slice_bytes = self.header.dimensions.slice_voxels() * self.header.element_type.byte_size();
        (self.options.chunk_bytes / slice_bytes.max(1)).max(1).min(self.header.dimensions.z.max(1))
    }

    /// Converts the payload read from `reader`, which must be positioned at
    /// its first byte. `sink` receives `(first_slice, texels)` for each
    /// chunk in Z order.
    pub fn pack<R, F>(&self, reader: &mut R, mut sink: F) -> Result<PackSummary>
    where
        R: Read + Seek,
        F: FnMut(usize, &[u8]) -> Result<()>,
    {
        let value_range = match self.options.normalization {
            Normalization::TypeRange => self.header.element_type.native_range(),
            Normalization::Window { min, max } => (min, max),
            Normalization::DataRange => {
                let start = reader.stream_position()?;
                let range = self.scan_range(reader)?;
                reader.seek(SeekFrom::Start(start))?;
                range
            }
        };

        let dims = self.header.dimensions;
        let element_type = self.header.element_type;
        let byte_order = self.header.byte_order;
        let in_size = element_type.byte_size();
        let format = self.output_format();
        let slice_bytes = dims.slice_voxels() * in_size;
        let expected = self.header.payload_bytes()?;
        let slices_per_chunk = self.slices_per_chunk();

        let mut input = vec![0u8; slices_per_chunk * slice_bytes];
        let mut output = Vec::with_capacity(slices_per_chunk * dims.slice_voxels() * format.byte_size());
        let mut read_total = 0u64;
        let mut written = 0u64;
        let mut first_slice = 0usize;

        while first_slice < dims.z {
            let slices = slices_per_chunk.min(dims.z - first_slice);
            let chunk = &mut input[..slices * slice_bytes];
            let read = read_full(reader, chunk)?;
            read_total += read as u64;
            if read < chunk.len() {
                return Err(VolumeError::TruncatedPayload { expected, read: read_total });
            }

            output.clear();
            for raw in chunk.chunks_exact(in_size) {
                let n = normalize(element_type.decode(raw, byte_order), value_range);
                write_texel(&mut output, format, n);
            }
            sink(first_slice, &output)?;
            written += output.len() as u64;
            first_slice += slices;
        }

        Ok(PackSummary { format, value_range, bytes_written: written })
    }

    /// Packs the whole payload into memory.
    pub fn pack_to_vec<R: Read + Seek>(&self, reader: &mut R) -> Result<(Vec<u8>, PackSummary)> {
        let capacity = self.header.dimensions.voxel_count()? * self.output_format().byte_size();
        let mut packed = Vec::with_capacity(capacity);
        let summary = self.pack(reader, |_, bytes| {
            packed.extend_from_slice(bytes);
            Ok(())
        })?;
        Ok((packed, summary))
    }

    fn scan_range<R: Read>(&self, reader: &mut R) -> Result<(f64, f64)> {
        let in_size = self.header.element_type.byte_size();
        let slice_bytes = self.header.dimensions.slice_voxels() * in_size;
        let expected = self.header.payload_bytes()?;
        let mut buffer = vec![0u8; self.slices_per_chunk() * slice_bytes];
        let mut remaining = expected;
        let mut read_total = 0u64;
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;

        while remaining > 0 {
            let want = (buffer.len() as u64).min(remaining) as usize;
            let chunk = &mut buffer[..want];
            let read = read_full(reader, chunk)?;
            read_total += read as u64;
            if read < want {
                return Err(VolumeError::TruncatedPayload { expected, read: read_total });
            }
            for raw in chunk.chunks_exact(in_size) {
                let v = self.header.element_type.decode(raw, self.header.byte_order);
                if v.is_finite() {
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
            remaining -= want as u64;
        }

        if lo > hi {
            return Ok((0.0, 0.0));
        }
        log::debug!("Observed payload range [{}, {}].", lo, hi);
        Ok((lo, hi))
    }
}

/// Maps `v` from `range` onto `[0, 1]`. NaN and empty ranges map to 0.
pub fn normalize(v: f64, range: (f64, f64)) -> f64 {
    let (lo, hi) = range;
    if !(hi > lo) || v.is_nan() {
        return 0.0;
    }
    ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
}

fn write_texel(out: &mut Vec<u8>, format: TextureFormat, n: f64) {
    match format {
        TextureFormat::R8Unorm => out.push((n * 255.0).round() as u8),
        TextureFormat::R16Unorm => out.extend_from_slice(&((n * 65535.0).round() as u16).to_le_bytes()),
        TextureFormat::R32Float => out.extend_from_slice(&(n as f32).to_le_bytes()),
    }
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
