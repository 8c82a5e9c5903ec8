// THEORY:
// The `detection` module chains the per-frame stages that locate the laser dot in a
// processing frame: segmentation, closing, blob extraction and selection, centroid.
// It is a pure function of one frame and one configuration snapshot; all state that
// survives a frame lives in the track accumulator.

use crate::core_modules::blob_detector::blob_detector::{blob_mask, find_blobs, select_blob};
use crate::core_modules::blob_detector::{BlobFilterConfig, BlobSelection};
use crate::core_modules::morphology::{self, MorphologyConfig};
use crate::core_modules::segmenter::{self, ColorFilter};
use image::{GrayImage, RgbImage};
use tracing::debug;

/// A detected laser position, or its absence.
///
/// When `found` is false the position carries no meaning and must not be read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub position: (f64, f64),
    pub found: bool,
}

impl Detection {
    pub fn found(position: (f64, f64)) -> Self {
        Self { position, found: true }
    }

    pub fn not_found() -> Self {
        Self {
            position: (0.0, 0.0),
            found: false,
        }
    }

    /// The position if one was found.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.found.then_some(self.position)
    }
}

/// Everything the detector needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectorConfig {
    pub color: ColorFilter,
    pub morphology: MorphologyConfig,
    pub blob_filter: BlobFilterConfig,
    /// Keep intermediate masks for calibration displays.
    pub emit_diagnostics: bool,
}

/// Single-channel masks produced while detecting, for calibration displays.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub hue: GrayImage,
    pub saturation: GrayImage,
    pub value: GrayImage,
    /// Candidate mask after closing.
    pub blobs: GrayImage,
    /// The selected blob alone, if any.
    pub laser_blob: Option<GrayImage>,
}

/// Why a frame did or did not produce a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Located,
    NoBlobs,
    NoSurvivor { blobs: usize },
    Ambiguous { survivors: usize },
    /// The selected blob has zero area.
    Degenerate,
}

/// Result of running the detector on one processing frame.
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    pub detection: Detection,
    pub outcome: Outcome,
    pub diagnostics: Option<Diagnostics>,
}

/// Locates the laser dot in `frame`.
pub fn detect(frame: &RgbImage, config: &DetectorConfig) -> DetectionOutput {
    let segmentation = segmenter::segment(frame, &config.color, config.emit_diagnostics);
    let cleaned = morphology::clean(segmentation.candidate, &config.morphology);

    let blobs = find_blobs(&cleaned);
    let selection = select_blob(blobs, &config.blob_filter);

    let (detection, outcome) = match &selection {
        BlobSelection::NoBlobs => (Detection::not_found(), Outcome::NoBlobs),
        BlobSelection::NoSurvivor { blobs } => (Detection::not_found(), Outcome::NoSurvivor { blobs: *blobs }),
        BlobSelection::Ambiguous { survivors } => (
            Detection::not_found(),
            Outcome::Ambiguous {
                survivors: *survivors,
            },
        ),
        BlobSelection::Selected(blob) => match blob.centroid() {
            Some(centroid) => (Detection::found(centroid), Outcome::Located),
            None => (Detection::not_found(), Outcome::Degenerate),
        },
    };
    debug!(?outcome, position = ?detection.position(), "detection");

    let diagnostics = segmentation.channels.map(|channels| {
        let laser_blob = selection
            .selected()
            .map(|blob| blob_mask(blob, cleaned.width(), cleaned.height()));
        Diagnostics {
            hue: channels.hue,
            saturation: channels.saturation,
            value: channels.value,
            blobs: cleaned,
            laser_blob,
        }
    });

    DetectionOutput {
        detection,
        outcome,
        diagnostics,
    }
}
