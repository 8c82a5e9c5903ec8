// THEORY:
// `Settings` is the on-disk form of the configuration, read from a TOML file. It
// is expressed the way a user calibrates a laser, not the way the pipeline
// consumes it: colors as a mean and a span, circularity in percent, filters
// switched off by leaving their maximum at zero, durations in seconds.
//
// Nothing here is trusted. `into_pipeline_config` runs every value through the
// validating constructors of the pipeline types and stops at the first rejected
// one.

use crate::core_modules::blob_detector::{AreaFilter, BlobFilterConfig, CircularityFilter};
use crate::core_modules::detection::DetectorConfig;
use crate::core_modules::morphology::MorphologyConfig;
use crate::core_modules::roi::{Roi, RoiScaleTransform};
use crate::core_modules::segmenter::{ColorFilter, HsvRange};
use crate::core_modules::tracker::{FadeConfig, TrackerConfig};
use crate::error::{ConfigError, Result};
use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete settings file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detector: DetectorSettings,
    pub tracker: TrackerSettings,
    pub capture: CaptureSettings,
}

/// A channel range given as its center and width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanSpan {
    pub mean: i32,
    pub span: i32,
}

/// Inclusive bounds. A `max` of zero disables the filter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterBounds {
    pub min: f64,
    pub max: f64,
}

impl FilterBounds {
    pub fn enabled(&self) -> bool {
        self.max != 0.0
    }
}

/// Detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub hue: MeanSpan,
    pub saturation: MeanSpan,
    pub value: MeanSpan,
    pub use_saturation: bool,
    pub closing_radius: u32,
    /// Blob area in square pixels of the processing frame.
    pub area: FilterBounds,
    /// Circularity in percent.
    pub circularity: FilterBounds,
    pub emit_diagnostics: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            hue: MeanSpan { mean: 0, span: 42 },
            saturation: MeanSpan { mean: 127, span: 256 },
            value: MeanSpan { mean: 127, span: 256 },
            use_saturation: true,
            closing_radius: 0,
            area: FilterBounds::default(),
            circularity: FilterBounds::default(),
            emit_diagnostics: false,
        }
    }
}

/// Track settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub max_size: usize,
    pub max_delay_secs: f64,
    pub fade_duration_secs: f64,
    pub fade_steps: u32,
    /// Drawing surface size. Defaults to the frame size.
    pub canvas: Option<(u32, u32)>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_delay_secs: 1.0,
            fade_duration_secs: 1.0,
            fade_steps: 20,
            canvas: None,
        }
    }
}

/// Capture geometry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub scale: f64,
    /// Crop rectangle. Defaults to the whole frame.
    pub roi: Option<RoiSettings>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 480,
            scale: 1.0,
            roi: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiSettings {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validates every value and builds the pipeline configuration.
    pub fn into_pipeline_config(&self) -> std::result::Result<PipelineConfig, ConfigError> {
        let detector = &self.detector;
        let range = HsvRange::from_mean_span(
            (detector.hue.mean, detector.hue.span),
            (detector.saturation.mean, detector.saturation.span),
            (detector.value.mean, detector.value.span),
        )?;

        let area = if detector.area.enabled() {
            AreaFilter::new(true, detector.area.min, detector.area.max)?
        } else {
            AreaFilter::default()
        };
        let circularity = if detector.circularity.enabled() {
            CircularityFilter::new(true, detector.circularity.min / 100.0, detector.circularity.max / 100.0)?
        } else {
            CircularityFilter::default()
        };

        let detector = DetectorConfig {
            color: ColorFilter {
                range,
                use_saturation: detector.use_saturation,
            },
            morphology: MorphologyConfig::new(detector.closing_radius)?,
            blob_filter: BlobFilterConfig { area, circularity },
            emit_diagnostics: detector.emit_diagnostics,
        };

        let capture = &self.capture;
        let frame_size = (capture.frame_width, capture.frame_height);
        let roi = capture
            .roi
            .map(|roi| Roi::new(roi.x, roi.y, roi.width, roi.height))
            .unwrap_or_else(|| Roi::new(0, 0, frame_size.0, frame_size.1));
        let transform = RoiScaleTransform::new(roi, capture.scale, frame_size)?;

        let tracker = &self.tracker;
        let max_delay = seconds("tracker.max_delay_secs", tracker.max_delay_secs)?;
        let fade_duration = seconds("tracker.fade_duration_secs", tracker.fade_duration_secs)?;

        Ok(PipelineConfig {
            detector,
            transform,
            tracker: TrackerConfig::new(tracker.max_size, max_delay)?,
            fade: FadeConfig::new(fade_duration, tracker.fade_steps)?,
            canvas_size: tracker.canvas.unwrap_or(frame_size),
        })
    }
}

fn seconds(key: &'static str, secs: f64) -> std::result::Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|error| ConfigError::Setting {
        key,
        reason: error.to_string(),
    })
}
