//! Displayable images and row-aligned pixel buffers for a presentation layer.

use image::{GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Result of the last apply, ready to show.
///
/// Most operations yield a grayscale image; overlays (blob boxes, match
/// markers) are drawn on an RGB copy.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedImage {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl ProcessedImage {
    pub fn width(&self) -> u32 {
        match self {
            ProcessedImage::Gray(img) => img.width(),
            ProcessedImage::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            ProcessedImage::Gray(img) => img.height(),
            ProcessedImage::Rgb(img) => img.height(),
        }
    }

    /// Samples per pixel (1 for gray, 3 for RGB).
    pub fn channels(&self) -> u8 {
        match self {
            ProcessedImage::Gray(_) => 1,
            ProcessedImage::Rgb(_) => 3,
        }
    }

    /// Copy into a buffer whose rows start on 4-byte boundaries.
    pub fn to_display_buffer(&self) -> DisplayBuffer {
        match self {
            ProcessedImage::Gray(img) => {
                DisplayBuffer::from_packed(img.width(), img.height(), 1, img.as_raw())
            }
            ProcessedImage::Rgb(img) => {
                DisplayBuffer::from_packed(img.width(), img.height(), 3, img.as_raw())
            }
        }
    }

    /// Expand to RGBA for canvas-style surfaces.
    pub fn to_rgba(&self) -> RgbaImage {
        match self {
            ProcessedImage::Gray(img) => image::DynamicImage::ImageLuma8(img.clone()).to_rgba8(),
            ProcessedImage::Rgb(img) => image::DynamicImage::ImageRgb8(img.clone()).to_rgba8(),
        }
    }
}

impl From<GrayImage> for ProcessedImage {
    fn from(img: GrayImage) -> Self {
        ProcessedImage::Gray(img)
    }
}

impl From<RgbImage> for ProcessedImage {
    fn from(img: RgbImage) -> Self {
        ProcessedImage::Rgb(img)
    }
}

/// Row stride in bytes for `width` pixels of `channels` samples, rounded up
/// to a multiple of 4.
#[inline]
pub fn aligned_stride(width: u32, channels: u8) -> usize {
    (width as usize * channels as usize + 3) & !3
}

/// 8-bit pixel data with 4-byte aligned rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBuffer {
    pub width: u32,
    pub height: u32,
    /// Samples per pixel
    pub channels: u8,
    /// Bytes per row including padding
    pub stride: usize,
    /// `stride * height` bytes, padding bytes zeroed
    pub pixels: Vec<u8>,
}

impl DisplayBuffer {
    /// Re-pack tightly packed rows (`width * channels` bytes each) into
    /// stride-aligned rows.
    pub fn from_packed(width: u32, height: u32, channels: u8, packed: &[u8]) -> Self {
        let row_len = width as usize * channels as usize;
        let stride = aligned_stride(width, channels);
        let mut pixels = vec![0u8; stride * height as usize];

        if row_len > 0 {
            for (dst, src) in pixels
                .chunks_exact_mut(stride)
                .zip(packed.chunks_exact(row_len))
            {
                dst[..row_len].copy_from_slice(src);
            }
        }

        Self {
            width,
            height,
            channels,
            stride,
            pixels,
        }
    }

    /// The `width * channels` meaningful bytes of row `y`.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        let len = self.width as usize * self.channels as usize;
        self.pixels.get(start..start + len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(4, 1), 4);
        assert_eq!(aligned_stride(5, 1), 8);
        assert_eq!(aligned_stride(5, 3), 16);
        assert_eq!(aligned_stride(0, 3), 0);
    }

    #[test]
    fn test_gray_buffer_is_padded() {
        let img = GrayImage::from_fn(3, 2, |x, y| Luma([(y * 3 + x) as u8 + 1]));
        let buf = ProcessedImage::Gray(img).to_display_buffer();

        assert_eq!(buf.stride, 4);
        assert_eq!(buf.pixels.len(), 8);
        assert_eq!(buf.pixels, vec![1, 2, 3, 0, 4, 5, 6, 0]);
        assert_eq!(buf.row(1), Some(&[4u8, 5, 6][..]));
        assert_eq!(buf.row(2), None);
    }

    #[test]
    fn test_rgb_buffer_dimensions() {
        let img = RgbImage::from_pixel(5, 3, Rgb([10, 20, 30]));
        let processed = ProcessedImage::from(img);
        assert_eq!(processed.channels(), 3);

        let buf = processed.to_display_buffer();
        assert_eq!(buf.stride % 4, 0);
        assert_eq!(buf.stride, 16);
        assert_eq!(buf.pixels.len(), 16 * 3);
        assert_eq!(buf.row(2), Some(&[10u8, 20, 30, 10, 20, 30, 10, 20, 30, 10, 20, 30, 10, 20, 30][..]));
    }

    #[test]
    fn test_to_rgba() {
        let img = GrayImage::from_pixel(2, 2, Luma([77]));
        let rgba = ProcessedImage::Gray(img).to_rgba();
        assert_eq!(rgba.get_pixel(1, 1).0, [77, 77, 77, 255]);
    }
}
