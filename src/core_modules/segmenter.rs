// THEORY:
// The `segmenter` is the first spatial stage of the detector. It looks at every
// pixel of the processing frame in isolation, projects it into HSV and asks three
// independent questions: is the hue right, is the color saturated enough, is it
// bright enough. The answers are binary masks; their combination is the candidate
// mask handed to the morphological cleaner.
//
// Hue is circular. A range whose minimum is above its maximum wraps through 0, which
// is how a red laser (hue near both 179 and 0) is expressed. Saturation and value
// are plain inclusive intervals.
//
// The per-channel masks are only kept when diagnostics are requested. They never
// influence the candidate mask.

use crate::core_modules::pixel::pixel::{HUE_RANGE, Pixel};
use crate::error::ConfigError;
use image::{GrayImage, Luma, RgbImage};

/// Mask value for a selected pixel.
pub const FOREGROUND: u8 = 255;
/// Mask value for a rejected pixel.
pub const BACKGROUND: u8 = 0;

/// Per-channel HSV acceptance ranges. Hue bounds lie in [0, 180).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    hue_min: u8,
    hue_max: u8,
    saturation_min: u8,
    saturation_max: u8,
    value_min: u8,
    value_max: u8,
}

impl HsvRange {
    pub fn new(
        (hue_min, hue_max): (u8, u8),
        (saturation_min, saturation_max): (u8, u8),
        (value_min, value_max): (u8, u8),
    ) -> Result<Self, ConfigError> {
        for hue in [hue_min, hue_max] {
            if hue as u16 >= HUE_RANGE {
                return Err(ConfigError::HueOutOfRange(hue));
            }
        }
        if saturation_min > saturation_max {
            return Err(ConfigError::InvertedRange {
                channel: "saturation",
                min: saturation_min,
                max: saturation_max,
            });
        }
        if value_min > value_max {
            return Err(ConfigError::InvertedRange {
                channel: "value",
                min: value_min,
                max: value_max,
            });
        }
        Ok(Self {
            hue_min,
            hue_max,
            saturation_min,
            saturation_max,
            value_min,
            value_max,
        })
    }

    /// Builds a range from calibration-style `(mean, span)` pairs.
    ///
    /// `min = mean - (span - 1) / 2` and `max = mean + span / 2`. Hue wraps modulo
    /// 180; saturation and value are clamped to [0, 255].
    ///
    /// Hue means lie in [0, 180) with spans in [1, 180]. Saturation and value means
    /// lie in [0, 256) with spans in [1, 256].
    pub fn from_mean_span(hue: (i32, i32), saturation: (i32, i32), value: (i32, i32)) -> Result<Self, ConfigError> {
        check_mean_span("hue", hue, HUE_RANGE as i32)?;
        check_mean_span("saturation", saturation, CHANNEL_RANGE)?;
        check_mean_span("value", value, CHANNEL_RANGE)?;

        let (hue_min, hue_max) = mean_span_bounds(hue.0, hue.1);
        let wrap = |h: i32| h.rem_euclid(HUE_RANGE as i32) as u8;
        let clamp = |(min, max): (i32, i32)| (min.clamp(0, 255) as u8, max.clamp(0, 255) as u8);

        Self::new(
            (wrap(hue_min), wrap(hue_max)),
            clamp(mean_span_bounds(saturation.0, saturation.1)),
            clamp(mean_span_bounds(value.0, value.1)),
        )
    }

    pub fn hue(&self) -> (u8, u8) {
        (self.hue_min, self.hue_max)
    }

    pub fn saturation(&self) -> (u8, u8) {
        (self.saturation_min, self.saturation_max)
    }

    pub fn value(&self) -> (u8, u8) {
        (self.value_min, self.value_max)
    }

    /// Circular hue test.
    pub fn hue_valid(&self, hue: u8) -> bool {
        if self.hue_min <= self.hue_max {
            self.hue_min <= hue && hue <= self.hue_max
        } else {
            hue >= self.hue_min || hue <= self.hue_max
        }
    }

    pub fn saturation_valid(&self, saturation: u8) -> bool {
        self.saturation_min <= saturation && saturation <= self.saturation_max
    }

    pub fn value_valid(&self, value: u8) -> bool {
        self.value_min <= value && value <= self.value_max
    }
}

impl Default for HsvRange {
    /// Red laser: hue 0 with a span of 42, any saturation and value.
    fn default() -> Self {
        Self {
            hue_min: 160,
            hue_max: 21,
            saturation_min: 0,
            saturation_max: 255,
            value_min: 0,
            value_max: 255,
        }
    }
}

/// Number of distinct saturation and value levels.
const CHANNEL_RANGE: i32 = 256;

fn check_mean_span(channel: &'static str, (mean, span): (i32, i32), limit: i32) -> Result<(), ConfigError> {
    if (0..limit).contains(&mean) && (1..=limit).contains(&span) {
        return Ok(());
    }
    Err(ConfigError::InvalidMeanSpan {
        channel,
        mean,
        span,
        mean_limit: limit,
        span_limit: limit,
    })
}

fn mean_span_bounds(mean: i32, span: i32) -> (i32, i32) {
    (mean - (span - 1) / 2, mean + span / 2)
}

/// Color acceptance settings for the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorFilter {
    pub range: HsvRange,
    /// When false, saturation is not part of the candidate test.
    pub use_saturation: bool,
}

impl Default for ColorFilter {
    fn default() -> Self {
        Self {
            range: HsvRange::default(),
            use_saturation: true,
        }
    }
}

/// The intermediate single-channel masks, kept for calibration displays.
#[derive(Debug, Clone)]
pub struct ChannelMasks {
    pub hue: GrayImage,
    pub saturation: GrayImage,
    pub value: GrayImage,
}

/// Output of one segmentation pass.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub candidate: GrayImage,
    pub channels: Option<ChannelMasks>,
}

fn mask_value(selected: bool) -> Luma<u8> {
    Luma([if selected { FOREGROUND } else { BACKGROUND }])
}

/// Produces the candidate mask for `frame`.
///
/// A pixel is a candidate iff it is hue-valid and value-valid, and saturation-valid
/// unless saturation filtering is disabled.
pub fn segment(frame: &RgbImage, filter: &ColorFilter, keep_channels: bool) -> Segmentation {
    let (width, height) = frame.dimensions();
    let mut candidate = GrayImage::new(width, height);
    let mut channels = keep_channels.then(|| ChannelMasks {
        hue: GrayImage::new(width, height),
        saturation: GrayImage::new(width, height),
        value: GrayImage::new(width, height),
    });

    for (x, y, rgb) in frame.enumerate_pixels() {
        let hsv = Pixel::from(rgb).hsv();
        let hue_ok = filter.range.hue_valid(hsv.hue);
        let saturation_ok = filter.range.saturation_valid(hsv.saturation);
        let value_ok = filter.range.value_valid(hsv.value);

        let selected = hue_ok && value_ok && (saturation_ok || !filter.use_saturation);
        candidate.put_pixel(x, y, mask_value(selected));

        if let Some(masks) = channels.as_mut() {
            masks.hue.put_pixel(x, y, mask_value(hue_ok));
            masks.saturation.put_pixel(x, y, mask_value(saturation_ok));
            masks.value.put_pixel(x, y, mask_value(value_ok));
        }
    }

    Segmentation { candidate, channels }
}
