// THEORY:
// A laser dot seen through a color threshold is rarely one clean region: specular
// saturation at its core often fails the hue test and the rim can break into
// fragments. Morphological closing (dilate, then erode) with a disc fills those
// holes and bridges near-touching fragments so the blob extractor sees one blob.
//
// Closing is extensive: it never removes a foreground pixel. With radius 0 the mask
// passes through untouched.

use crate::error::ConfigError;
use image::GrayImage;
use imageproc::distance_transform::Norm;

/// Largest accepted closing radius.
pub const MAX_CLOSING_RADIUS: u32 = 25;

/// Closing settings. A radius of 0 disables closing; otherwise the disc spans
/// `2 * radius + 1` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MorphologyConfig {
    closing_radius: u32,
}

impl MorphologyConfig {
    pub fn new(closing_radius: u32) -> Result<Self, ConfigError> {
        if closing_radius > MAX_CLOSING_RADIUS {
            return Err(ConfigError::ClosingRadiusTooLarge {
                radius: closing_radius,
                max: MAX_CLOSING_RADIUS,
            });
        }
        Ok(Self { closing_radius })
    }

    pub fn closing_radius(&self) -> u32 {
        self.closing_radius
    }

    /// Structuring element diameter, or 0 when closing is disabled.
    pub fn kernel_diameter(&self) -> u32 {
        if self.closing_radius == 0 {
            0
        } else {
            2 * self.closing_radius + 1
        }
    }
}

/// Applies closing with a disc of the configured radius.
pub fn clean(mask: GrayImage, config: &MorphologyConfig) -> GrayImage {
    if config.closing_radius == 0 || mask.width() == 0 || mask.height() == 0 {
        return mask;
    }
    // Bounded by MAX_CLOSING_RADIUS, so the cast is lossless.
    imageproc::morphology::close(&mask, Norm::L2, config.closing_radius as u8)
}
