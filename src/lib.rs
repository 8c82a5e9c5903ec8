// THEORY:
// This file is the main entry point for the `laser_painter` library crate.
// It locates a color-filtered laser dot in a video stream and accumulates its
// motion into a fading, time-segmented trajectory.
//
// Two entry points are exported:
// - `LaserPipeline`: synchronous, one call per frame, driven by any `Scheduler`.
// - `TrackingService`: the same pipeline on a tokio task, fed through channels.
//
// The per-stage building blocks live in `core_modules` and stay public so that
// calibration tools can run a single stage on its own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod service;

pub use config::Settings;
pub use core_modules::detection::{Detection, DetectorConfig, Outcome};
pub use core_modules::frame::{Frame, PixelFormat};
pub use core_modules::roi::{Roi, RoiScaleTransform};
pub use core_modules::timer::{ManualScheduler, Scheduler, TimerId, TokioScheduler};
pub use core_modules::tracker::{OldTrack, TrackSnapshot};
pub use error::{ConfigError, Error, FrameError, PipelineWarning, Result, WarningKind};
pub use pipeline::{FrameReport, LaserPipeline, PipelineConfig};
pub use service::TrackingService;
