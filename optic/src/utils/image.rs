use crate::devices::hardware::camera::{Buffer, PixelFormat};
use crate::error::{CaptureError, Result};
use image::{GrayImage, ImageBuffer, ImageError, ImageFormat, Luma, RgbImage};
use std::path::Path;

/// 16 bit single channel image, used for the 10/12/16 bit mono formats.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Pixel array reshaped from the pixel bytes of a buffer, rows first.
/// Only lives long enough to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedImage {
    /// 8 bit samples (mono or raw bayer).
    Gray8(GrayImage),
    /// 16 bit samples.
    Gray16(Gray16Image),
    /// 8 bit RGB triples.
    Rgb8(RgbImage),
}

impl CapturedImage {
    /// Reshape the pixel bytes of `buffer` into `height` rows of `width`
    /// pixels. Chunk data trailing the pixels is ignored.
    pub fn from_buffer(buffer: &Buffer) -> Result<Self> {
        let pixels = buffer.pixel_data()?;
        let (width, height) = (buffer.width, buffer.height);
        let mismatch = || {
            CaptureError::InvalidBuffer(format!(
                "{} pixel bytes can not be shaped into {width}x{height} {}",
                pixels.len(),
                buffer.pixel_format
            ))
        };

        match (buffer.pixel_format, buffer.bits_per_pixel) {
            (PixelFormat::Mono8 | PixelFormat::BayerRG8, 8) => {
                GrayImage::from_raw(width, height, pixels.to_vec())
                    .map(CapturedImage::Gray8)
                    .ok_or_else(mismatch)
            }
            (PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16, 16) => {
                let samples = pixels
                    .chunks_exact(2)
                    .map(|word| u16::from_le_bytes([word[0], word[1]]))
                    .collect();
                Gray16Image::from_raw(width, height, samples)
                    .map(CapturedImage::Gray16)
                    .ok_or_else(mismatch)
            }
            (PixelFormat::RGB8, 24) => RgbImage::from_raw(width, height, pixels.to_vec())
                .map(CapturedImage::Rgb8)
                .ok_or_else(mismatch),
            (format, bits_per_pixel) => Err(CaptureError::UnsupportedPixelFormat {
                pixel_format: format.to_string(),
                bits_per_pixel,
            }),
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            CapturedImage::Gray8(image) => image.width(),
            CapturedImage::Gray16(image) => image.width(),
            CapturedImage::Rgb8(image) => image.width(),
        }
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            CapturedImage::Gray8(image) => image.height(),
            CapturedImage::Gray16(image) => image.height(),
            CapturedImage::Rgb8(image) => image.height(),
        }
    }

    /// Encode as PNG at `path`. The parent directory must exist.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let saved = match self {
            CapturedImage::Gray8(image) => image.save_with_format(path, ImageFormat::Png),
            CapturedImage::Gray16(image) => image.save_with_format(path, ImageFormat::Png),
            CapturedImage::Rgb8(image) => image.save_with_format(path, ImageFormat::Png),
        };
        saved.map_err(|e| match e {
            ImageError::IoError(source) => CaptureError::Io { source },
            source => CaptureError::Image {
                path: path.to_path_buf(),
                source,
            },
        })
    }
}
