// THEORY:
// A `Frame` is the opaque unit handed over by the frame source: a raw byte buffer,
// its geometry and its pixel layout. It has no identity beyond the call that
// processes it. This module's only job is to turn it into an `RgbImage` or say why
// it cannot; everything downstream works on `RgbImage` and never sees raw bytes.

use crate::error::FrameError;
use image::{DynamicImage, RgbImage};

/// Pixel layout of a raw frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgr8,
    Bgra8,
    /// Single channel; carries no color and cannot be segmented by hue.
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A raw frame as delivered by the frame source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Converts the frame to packed RGB.
    pub fn to_rgb(&self) -> Result<RgbImage, FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }

        let expected = self.width as usize * self.height as usize * self.format.bytes_per_pixel();
        if self.data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: self.data.len(),
            });
        }

        let rgb: Vec<u8> = match self.format {
            PixelFormat::Rgb8 => self.data.clone(),
            PixelFormat::Rgba8 => self
                .data
                .chunks_exact(4)
                .flat_map(|p| [p[0], p[1], p[2]])
                .collect(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .flat_map(|p| [p[2], p[1], p[0]])
                .collect(),
            PixelFormat::Bgra8 => self
                .data
                .chunks_exact(4)
                .flat_map(|p| [p[2], p[1], p[0]])
                .collect(),
            PixelFormat::Gray8 => return Err(FrameError::UnsupportedFormat(self.format)),
        };

        RgbImage::from_raw(self.width, self.height, rgb).ok_or(FrameError::BufferSize {
            expected,
            actual: self.data.len(),
        })
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Frame::new(width, height, PixelFormat::Rgb8, image.into_raw())
    }
}

impl From<DynamicImage> for Frame {
    fn from(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageRgba8(rgba) => Frame::new(width, height, PixelFormat::Rgba8, rgba.into_raw()),
            DynamicImage::ImageLuma8(gray) => Frame::new(width, height, PixelFormat::Gray8, gray.into_raw()),
            other => Frame::from(other.to_rgb8()),
        }
    }
}
