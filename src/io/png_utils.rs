// Copyright @yucwang 2026

use crate::core::error::{Result, VolumeError};
use crate::math::bitmap::Bitmap;

use image::{Rgba, RgbaImage};
use std::path::Path;

/// Converts premultiplied float RGBA into straight-alpha 8-bit RGBA.
pub fn to_rgba8(bitmap: &Bitmap) -> RgbaImage {
    let width = bitmap.width();
    RgbaImage::from_fn(width as u32, bitmap.height() as u32, |x, y| {
        let p = bitmap[(x as usize, y as usize)];
        let alpha = p[3].clamp(0.0, 1.0);
        let unpremultiply = if alpha > 0.0 { 1.0 / alpha } else { 0.0 };
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([
            to_u8(p[0] * unpremultiply),
            to_u8(p[1] * unpremultiply),
            to_u8(p[2] * unpremultiply),
            to_u8(alpha),
        ])
    })
}

pub fn write_png_to_file(image: &Bitmap, file_path: &Path) -> Result<()> {
    log::info!("Starting writing png image: {}.", file_path.display());
    to_rgba8(image)
        .save(file_path)
        .map_err(|e| VolumeError::Image(e.to_string()))?;
    log::info!("PNG written to: {}.", file_path.display());
    Ok(())
}
