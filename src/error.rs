// THEORY:
// Errors are split by the boundary they belong to. `ConfigError` is raised when a
// configuration value is rejected before it ever reaches the pipeline, so the
// previous configuration stays in effect. `FrameError` describes an input defect
// for a single frame; the pipeline turns it into a `PipelineWarning` and reports
// the frame as not found instead of failing. `Error` is the crate-level union used
// by file loading and the CLI.

use std::fmt;

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A configuration value was rejected at the configuration boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("hue bound {0} is outside [0, 180)")]
    HueOutOfRange(u8),

    #[error("{channel} range is inverted: min {min} > max {max}")]
    InvertedRange {
        channel: &'static str,
        min: u8,
        max: u8,
    },

    #[error("{channel} mean {mean} / span {span} is outside mean [0, {mean_limit}), span [1, {span_limit}]")]
    InvalidMeanSpan {
        channel: &'static str,
        mean: i32,
        span: i32,
        mean_limit: i32,
        span_limit: i32,
    },

    #[error("closing radius {radius} exceeds the maximum of {max}")]
    ClosingRadiusTooLarge { radius: u32, max: u32 },

    #[error("area range is inverted: min {min} > max {max}")]
    InvertedAreaRange { min: f64, max: f64 },

    #[error("circularity bounds must lie in [0, 1] with min <= max, got [{min}, {max}]")]
    InvalidCircularity { min: f64, max: f64 },

    #[error("scale {0} is outside (0, 1]")]
    InvalidScale(f64),

    #[error("region of interest {roi} is empty")]
    EmptyRoi { roi: String },

    #[error("region of interest {roi} is not contained in a {width}x{height} frame")]
    RoiOutOfFrame {
        roi: String,
        width: u32,
        height: u32,
    },

    #[error("track max size {0} is below the minimum of 2")]
    TrackTooShort(usize),

    #[error("max delay must be positive")]
    ZeroDelay,

    #[error("fade must have at least one step and a positive duration")]
    InvalidFade,

    #[error("invalid setting `{key}`: {reason}")]
    Setting { key: &'static str, reason: String },
}

/// An input frame could not be turned into a usable color image.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Camera color space format is not supported: {0:?}")]
    UnsupportedFormat(crate::core_modules::frame::PixelFormat),

    #[error("region of interest {roi} is outside the {width}x{height} frame")]
    RoiOutOfBounds {
        roi: String,
        width: u32,
        height: u32,
    },

    #[error("frame became empty after scaling by {0}")]
    EmptyAfterScale(f64),
}

/// Structured kind of a pipeline warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    InvalidFrame,
    UnsupportedFormat,
    RoiOutOfBounds,
}

/// A non-fatal condition raised while processing a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl From<&FrameError> for PipelineWarning {
    fn from(error: &FrameError) -> Self {
        let kind = match error {
            FrameError::UnsupportedFormat(_) => WarningKind::UnsupportedFormat,
            FrameError::RoiOutOfBounds { .. } => WarningKind::RoiOutOfBounds,
            FrameError::Empty { .. }
            | FrameError::BufferSize { .. }
            | FrameError::EmptyAfterScale(_) => WarningKind::InvalidFrame,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Service error: {0}")]
    Service(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::PixelFormat;

    #[test]
    fn frame_errors_map_to_warning_kinds() {
        let unsupported = PipelineWarning::from(&FrameError::UnsupportedFormat(PixelFormat::Gray8));
        assert_eq!(unsupported.kind, WarningKind::UnsupportedFormat);
        assert!(unsupported.message.contains("not supported"));

        let empty = PipelineWarning::from(&FrameError::Empty { width: 0, height: 4 });
        assert_eq!(empty.kind, WarningKind::InvalidFrame);
    }
}
