// THEORY:
// The detector never sees the camera frame directly. It sees a processing frame:
// the original cropped to a user-drawn region of interest, then uniformly downscaled
// to keep per-frame cost low. `RoiScaleTransform` records both steps, and is the only
// thing needed to map a detection back:
//
//     original = processing / scale + roi.top_left
//
// A transform is a plain value. The pipeline copies the one in effect when a frame
// is captured and uses that copy for both preparing and correcting the frame, so a
// configuration change arriving mid-stream never pairs one frame's crop with
// another's correction.

use crate::core_modules::detection::Detection;
use crate::error::{ConfigError, FrameError};
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::fmt;

/// Axis-aligned rectangle in original-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle lies entirely inside a `width` x `height` frame.
    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64 && self.y as u64 + self.height as u64 <= height as u64
    }

    pub fn top_left(&self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// How the processing frame was derived from the original frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiScaleTransform {
    roi: Roi,
    scale: f64,
}

impl RoiScaleTransform {
    /// Validates `roi` against the original frame size and `scale` against (0, 1].
    pub fn new(roi: Roi, scale: f64, frame_size: (u32, u32)) -> Result<Self, ConfigError> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(ConfigError::InvalidScale(scale));
        }
        if roi.is_empty() {
            return Err(ConfigError::EmptyRoi { roi: roi.to_string() });
        }
        if !roi.fits_in(frame_size.0, frame_size.1) {
            return Err(ConfigError::RoiOutOfFrame {
                roi: roi.to_string(),
                width: frame_size.0,
                height: frame_size.1,
            });
        }
        Ok(Self { roi, scale })
    }

    /// The whole frame at full scale.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            roi: Roi::new(0, 0, width, height),
            scale: 1.0,
        }
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Processing-frame position to original-frame position.
    pub fn to_original(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let (left, top) = self.roi.top_left();
        (x / self.scale + left, y / self.scale + top)
    }

    /// Original-frame position to processing-frame position.
    pub fn to_processing(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let (left, top) = self.roi.top_left();
        ((x - left) * self.scale, (y - top) * self.scale)
    }

    /// Maps a detection into original-frame coordinates. Misses pass through.
    pub fn correct(&self, detection: Detection) -> Detection {
        if !detection.found {
            return detection;
        }
        Detection::found(self.to_original(detection.position))
    }

    /// Crops `frame` to the ROI and downscales it by `scale`.
    pub fn prepare_frame(&self, frame: &RgbImage) -> Result<RgbImage, FrameError> {
        let (width, height) = frame.dimensions();
        if !self.roi.fits_in(width, height) {
            return Err(FrameError::RoiOutOfBounds {
                roi: self.roi.to_string(),
                width,
                height,
            });
        }

        let covers_frame = self.roi.x == 0 && self.roi.y == 0 && self.roi.width == width && self.roi.height == height;
        let cropped = if covers_frame {
            frame.clone()
        } else {
            imageops::crop_imm(frame, self.roi.x, self.roi.y, self.roi.width, self.roi.height).to_image()
        };

        if self.scale == 1.0 {
            return Ok(cropped);
        }

        let scaled_width = (cropped.width() as f64 * self.scale) as u32;
        let scaled_height = (cropped.height() as f64 * self.scale) as u32;
        if scaled_width == 0 || scaled_height == 0 {
            return Err(FrameError::EmptyAfterScale(self.scale));
        }
        Ok(imageops::resize(&cropped, scaled_width, scaled_height, FilterType::Triangle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn transform() -> RoiScaleTransform {
        RoiScaleTransform::new(Roi::new(40, 30, 200, 100), 0.7, (640, 480)).expect("valid")
    }

    #[test]
    fn correction_scales_then_offsets() {
        let corrected = transform().correct(Detection::found((7.0, 14.0)));
        assert!(corrected.found);
        assert!((corrected.position.0 - 50.0).abs() < 1e-9);
        assert!((corrected.position.1 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn correction_round_trips() {
        let transform = transform();
        for position in [(0.0, 0.0), (12.5, 3.25), (139.9, 69.9)] {
            let back = transform.to_processing(transform.to_original(position));
            assert!((back.0 - position.0).abs() < 1e-9);
            assert!((back.1 - position.1).abs() < 1e-9);
        }
    }

    #[test]
    fn misses_pass_through_untouched() {
        let miss = Detection::not_found();
        assert_eq!(transform().correct(miss), miss);
    }

    #[test]
    fn invalid_transforms_are_rejected() {
        let roi = Roi::new(0, 0, 10, 10);
        assert_eq!(RoiScaleTransform::new(roi, 0.0, (10, 10)), Err(ConfigError::InvalidScale(0.0)));
        assert_eq!(RoiScaleTransform::new(roi, 1.5, (10, 10)), Err(ConfigError::InvalidScale(1.5)));
        assert!(matches!(
            RoiScaleTransform::new(Roi::new(5, 5, 10, 10), 1.0, (10, 10)),
            Err(ConfigError::RoiOutOfFrame { .. })
        ));
        assert!(matches!(
            RoiScaleTransform::new(Roi::new(0, 0, 0, 10), 1.0, (10, 10)),
            Err(ConfigError::EmptyRoi { .. })
        ));
    }

    #[test]
    fn prepare_crops_and_scales() {
        let mut frame = RgbImage::new(100, 80);
        frame.put_pixel(20, 10, Rgb([255, 0, 0]));
        let transform = RoiScaleTransform::new(Roi::new(20, 10, 50, 40), 0.5, (100, 80)).expect("valid");
        let prepared = transform.prepare_frame(&frame).expect("roi fits");
        assert_eq!(prepared.dimensions(), (25, 20));

        let unscaled = RoiScaleTransform::new(Roi::new(20, 10, 50, 40), 1.0, (100, 80)).expect("valid");
        let cropped = unscaled.prepare_frame(&frame).expect("roi fits");
        assert_eq!(cropped.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn prepare_rejects_frames_that_no_longer_contain_the_roi() {
        let frame = RgbImage::new(32, 32);
        let transform = RoiScaleTransform::new(Roi::new(0, 0, 64, 64), 1.0, (64, 64)).expect("valid");
        assert!(matches!(
            transform.prepare_frame(&frame),
            Err(FrameError::RoiOutOfBounds { .. })
        ));
    }

    #[test]
    fn tiny_frames_can_vanish_when_scaled() {
        let frame = RgbImage::new(3, 3);
        let transform = RoiScaleTransform::new(Roi::new(0, 0, 3, 3), 0.2, (3, 3)).expect("valid");
        assert_eq!(transform.prepare_frame(&frame), Err(FrameError::EmptyAfterScale(0.2)));
    }
}
