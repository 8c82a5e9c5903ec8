// THEORY:
// The `pipeline` module is the top-level, synchronous API of the engine. It owns
// the configuration in effect and the track accumulator, and exposes one entry
// point per frame.
//
// Per frame:
// 1.  Snapshot the configuration. The whole pass uses this copy, so a frame is
//     prepared and corrected with the same region of interest and scale.
// 2.  Convert the raw frame to RGB and crop/downscale it to the processing frame.
//     An input defect turns into a warning and a miss, never a failure.
// 3.  Detect the laser in the processing frame.
// 4.  Map the detection back to original-frame coordinates.
// 5.  Feed the corrected detection to the track accumulator.
//
// Configuration setters validate their input. A rejected value leaves the
// previous one in effect.

use crate::core_modules::blob_detector::{AreaFilter, CircularityFilter};
use crate::core_modules::detection::{self, Detection, DetectorConfig, Diagnostics, Outcome};
use crate::core_modules::frame::Frame;
use crate::core_modules::morphology::MorphologyConfig;
use crate::core_modules::roi::{Roi, RoiScaleTransform};
use crate::core_modules::segmenter::HsvRange;
use crate::core_modules::timer::{ManualScheduler, Scheduler, TimerId};
use crate::core_modules::tracker::{FadeConfig, TrackAccumulator, TrackSnapshot, TrackerConfig};
use crate::error::{ConfigError, FrameError, PipelineWarning};
use image::RgbImage;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the LaserPipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub transform: RoiScaleTransform,
    pub tracker: TrackerConfig,
    pub fade: FadeConfig,
    /// Geometry of the surface the track is drawn on.
    pub canvas_size: (u32, u32),
}

impl PipelineConfig {
    /// Default detector and track settings for frames of the given size, with
    /// no cropping or scaling.
    pub fn for_frame_size(width: u32, height: u32) -> Self {
        Self {
            detector: DetectorConfig::default(),
            transform: RoiScaleTransform::identity(width, height),
            tracker: TrackerConfig::default(),
            fade: FadeConfig::default(),
            canvas_size: (width, height),
        }
    }
}

/// The output of the pipeline for a single frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    /// The transform this frame was prepared and corrected with.
    pub transform: RoiScaleTransform,
    /// Detection in processing-frame coordinates.
    pub detection: Detection,
    /// Detection in original-frame coordinates.
    pub corrected: Detection,
    /// `None` when the frame was skipped.
    pub outcome: Option<Outcome>,
    pub warning: Option<PipelineWarning>,
    pub diagnostics: Option<Diagnostics>,
}

impl FrameReport {
    fn skipped(frame_index: u64, transform: RoiScaleTransform, error: &FrameError) -> Self {
        Self {
            frame_index,
            transform,
            detection: Detection::not_found(),
            corrected: Detection::not_found(),
            outcome: None,
            warning: Some(PipelineWarning::from(error)),
            diagnostics: None,
        }
    }
}

/// The main, top-level struct for the laser tracking engine.
pub struct LaserPipeline<S: Scheduler> {
    detector: DetectorConfig,
    transform: RoiScaleTransform,
    tracker: TrackAccumulator<S>,
    frames_processed: u64,
}

impl<S: Scheduler> LaserPipeline<S> {
    pub fn new(config: PipelineConfig, scheduler: S) -> Self {
        Self {
            detector: config.detector,
            transform: config.transform,
            tracker: TrackAccumulator::new(config.tracker, config.fade, config.canvas_size, scheduler),
            frames_processed: 0,
        }
    }

    /// Runs one raw frame through the whole pipeline.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let frame_index = self.next_frame_index();
        let transform = self.transform;
        match frame.to_rgb() {
            Ok(image) => self.run(frame_index, &image, transform),
            Err(error) => self.skip(frame_index, transform, error),
        }
    }

    /// Runs one already-decoded RGB frame through the whole pipeline.
    pub fn process_image(&mut self, image: &RgbImage) -> FrameReport {
        let frame_index = self.next_frame_index();
        let transform = self.transform;
        self.run(frame_index, image, transform)
    }

    fn next_frame_index(&mut self) -> u64 {
        let index = self.frames_processed;
        self.frames_processed += 1;
        index
    }

    fn run(&mut self, frame_index: u64, image: &RgbImage, transform: RoiScaleTransform) -> FrameReport {
        let detector = self.detector;

        let processing = match transform.prepare_frame(image) {
            Ok(processing) => processing,
            Err(error) => return self.skip(frame_index, transform, error),
        };

        let output = detection::detect(&processing, &detector);
        let corrected = transform.correct(output.detection);
        self.tracker.add_tip(corrected);

        FrameReport {
            frame_index,
            transform,
            detection: output.detection,
            corrected,
            outcome: Some(output.outcome),
            warning: None,
            diagnostics: output.diagnostics,
        }
    }

    fn skip(&mut self, frame_index: u64, transform: RoiScaleTransform, error: FrameError) -> FrameReport {
        warn!(frame = frame_index, %error, "frame skipped");
        self.tracker.add_tip(Detection::not_found());
        FrameReport::skipped(frame_index, transform, &error)
    }

    pub fn set_detector_config(&mut self, detector: DetectorConfig) {
        self.detector = detector;
    }

    pub fn set_hsv_range(
        &mut self,
        hue: (u8, u8),
        saturation: (u8, u8),
        value: (u8, u8),
    ) -> Result<(), ConfigError> {
        self.detector.color.range = HsvRange::new(hue, saturation, value)?;
        Ok(())
    }

    pub fn set_closing_radius(&mut self, radius: u32) -> Result<(), ConfigError> {
        self.detector.morphology = MorphologyConfig::new(radius)?;
        Ok(())
    }

    pub fn set_area_filter(&mut self, enabled: bool, min: f64, max: f64) -> Result<(), ConfigError> {
        self.detector.blob_filter.area = AreaFilter::new(enabled, min, max)?;
        Ok(())
    }

    pub fn set_circularity_filter(&mut self, enabled: bool, min: f64, max: f64) -> Result<(), ConfigError> {
        self.detector.blob_filter.circularity = CircularityFilter::new(enabled, min, max)?;
        Ok(())
    }

    /// Replaces the transform for frames processed from now on.
    pub fn set_transform(&mut self, transform: RoiScaleTransform) {
        debug!(roi = %transform.roi(), scale = transform.scale(), "transform changed");
        self.transform = transform;
    }

    /// Validates and installs a new crop and scale for frames of `frame_size`.
    pub fn set_roi(&mut self, roi: Roi, scale: f64, frame_size: (u32, u32)) -> Result<(), ConfigError> {
        self.set_transform(RoiScaleTransform::new(roi, scale, frame_size)?);
        Ok(())
    }

    pub fn set_canvas_size(&mut self, canvas_size: (u32, u32)) {
        self.tracker.set_canvas_size(canvas_size);
    }

    pub fn set_max_delay(&mut self, max_delay: Duration) -> Result<(), ConfigError> {
        self.tracker.set_max_delay(max_delay)
    }

    pub fn set_max_size(&mut self, max_size: usize) -> Result<(), ConfigError> {
        self.tracker.set_max_size(max_size)
    }

    /// Delivers a timer firing to the track accumulator.
    pub fn on_timer(&mut self, timer: TimerId) {
        self.tracker.on_timer(timer);
    }

    pub fn detector_config(&self) -> &DetectorConfig {
        &self.detector
    }

    pub fn transform(&self) -> RoiScaleTransform {
        self.transform
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn tracker(&self) -> &TrackAccumulator<S> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut TrackAccumulator<S> {
        &mut self.tracker
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        self.tracker.snapshot()
    }
}

impl LaserPipeline<ManualScheduler> {
    /// Advances the simulated clock of the track accumulator.
    pub fn advance(&mut self, elapsed: Duration) {
        self.tracker.advance(elapsed);
    }
}
