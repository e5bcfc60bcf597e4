/* Copyright 2020 @TwoCookingMice */

use crate::core::error::{Result, VolumeError};
use crate::math::bitmap::Bitmap;

use exr::prelude::*;
use std::path::Path;

// Write premultiplied RGBA Image to file
pub fn write_exr_to_file(image: &Bitmap, file_path: &Path) -> Result<()> {
    log::info!("Starting writing openexr images: {}.", file_path.display());

    let width = image.width();
    let pixels = image.pixels();
    write_rgba_file(file_path, width, image.height(), |x, y| {
        let p = pixels[y * width + x];
        (p[0], p[1], p[2], p[3])
    })
    .map_err(|e| VolumeError::Image(e.to_string()))?;

    log::info!("EXR written to: {}.", file_path.display());
    Ok(())
}

// Read RGBA EXR Image from file
pub fn read_exr_from_file(file_path: &Path) -> Result<Bitmap> {
    log::info!("Starting reading OpenEXR image from: {}.", file_path.display());

    let image = read_first_rgba_layer_from_file(
        file_path,
        |resolution, _| Bitmap::new(resolution.width(), resolution.height()),
        |bitmap: &mut Bitmap, position, (r, g, b, a): (f32, f32, f32, f32)| {
            bitmap[(position.x(), position.y())] = crate::math::constants::Vector4f::new(r, g, b, a);
        },
    )
    .map_err(|e| VolumeError::Image(e.to_string()))?;

    let bitmap = image.layer_data.channel_data.pixels;
    log::info!("OpenEXR loaded, width = {}, height = {}.", bitmap.width(), bitmap.height());
    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_utils::temp_file;
    use crate::math::constants::Vector4f;

    #[test]
    fn exr_roundtrip_keeps_alpha() {
        let mut bitmap = Bitmap::new(3, 2);
        bitmap[(2, 1)] = Vector4f::new(0.5, 0.25, 0.0, 0.5);
        let path = temp_file("roundtrip.exr", &[]);
        write_exr_to_file(&bitmap, &path).unwrap();
        let back = read_exr_from_file(&path).unwrap();
        assert_eq!(back.width(), 3);
        assert_eq!(back[(2, 1)], Vector4f::new(0.5, 0.25, 0.0, 0.5));
        assert_eq!(back[(0, 0)], Vector4f::zeros());
    }
}
