// Copyright 2020 @TwoCookingMice

use super::constants::{ Float, Vector4f };

use std::ops;
use std::vec::Vec;

/// Premultiplied RGBA image, row-major with the origin at the top left.
#[derive(Debug, Clone)]
pub struct Bitmap {
    data: Vec<Vector4f>,
    height: usize,
    width: usize
}

impl ops::Index<(usize, usize)> for Bitmap {
    type Output = Vector4f;

    fn index(&self, index: (usize, usize)) -> &Vector4f {
        assert!(index.0 < self.width && index.1 < self.height);
        &self.data[index.0 + self.width * index.1]
    }
}

impl ops::IndexMut<(usize, usize)> for Bitmap {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Vector4f {
        assert!(index.0 < self.width && index.1 < self.height);
        &mut self.data[index.0 + self.width * index.1]
    }
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        let pixel_number = width * height;
        Self { data: vec!(Vector4f::zeros(); pixel_number),
               width: width,
               height: height }
    }

    /// Builds a bitmap from interleaved RGBA floats, as written by a
    /// four-channel compute dispatch.
    pub fn from_rgba_slice(width: usize, height: usize, rgba: &[Float]) -> Self {
        let mut bitmap = Self::new(width, height);
        for (pixel, chunk) in bitmap.data.iter_mut().zip(rgba.chunks_exact(4)) {
            *pixel = Vector4f::new(chunk[0], chunk[1], chunk[2], chunk[3]);
        }
        bitmap
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[Vector4f] {
        &self.data
    }

    /// Blends the premultiplied image over an opaque or translucent
    /// background colour.
    pub fn composite_over(&self, background: Vector4f) -> Bitmap {
        let mut out = self.clone();
        for pixel in out.data.iter_mut() {
            let rest = 1.0 - pixel[3];
            *pixel += background * rest;
        }
        out
    }
}

/* Test for Bitmap */
#[cfg(test)]
mod tests {
    use super::Bitmap;
    use super::{ Vector4f };

    #[test]
    fn test_bitmap_basic_functions() {
        let mut bitmap = Bitmap::new(256usize, 128usize);
        assert_eq!(bitmap.width(), 256);
        assert_eq!(bitmap.height(), 128);

        bitmap[(5, 6)] = Vector4f::new(1.0, 0.5, 0.6, 1.0);
        assert_eq!(bitmap[(5, 6)][1], 0.5);
        assert_eq!(bitmap[(2, 6)][0], 0.0);
    }

    #[test]
    fn test_bitmap_from_rgba_and_composite() {
        let rgba = [0.5, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0];
        let bitmap = Bitmap::from_rgba_slice(2, 1, &rgba);
        assert_eq!(bitmap[(0, 0)], Vector4f::new(0.5, 0.0, 0.0, 0.5));

        let out = bitmap.composite_over(Vector4f::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(out[(0, 0)], Vector4f::new(0.5, 0.0, 0.5, 1.0));
        assert_eq!(out[(1, 0)], Vector4f::new(0.0, 0.0, 1.0, 1.0));
    }
}
