// THEORY:
// The `service` module runs a `LaserPipeline` on its own tokio task, driven by
// real time. It is the asynchronous face of the engine for live sources.
//
// Channels:
// - Commands (`mpsc`): frames and configuration updates share one ordered channel.
//   A configuration change therefore takes effect between two frames, never inside
//   one, and every frame is corrected with the transform that was current when it
//   was submitted.
// - Timer firings (`mpsc`): delivered by the `TokioScheduler` owned by the pipeline.
//   Stale firings are filtered out before they reach the track accumulator.
// - Track (`watch`): the latest `TrackSnapshot`, updated whenever the track or the
//   old track changes. Renderers only ever need the newest state.
// - Reports (`broadcast`): one `FrameReport` per processed frame, warnings included.
//
// There is no internal frame dropping. Frames queue in submission order and each
// one is processed to completion before the next.

use crate::core_modules::detection::DetectorConfig;
use crate::core_modules::frame::Frame;
use crate::core_modules::roi::RoiScaleTransform;
use crate::core_modules::timer::{TimerEvent, TokioScheduler};
use crate::core_modules::tracker::TrackSnapshot;
use crate::error::{ConfigError, Error, Result};
use crate::pipeline::{FrameReport, LaserPipeline, PipelineConfig};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A request to the pipeline task.
pub enum PipelineCommand {
    Frame(Frame),
    SetDetector(DetectorConfig),
    SetTransform(RoiScaleTransform),
    SetCanvasSize((u32, u32)),
    SetMaxDelay {
        max_delay: Duration,
        reply: oneshot::Sender<std::result::Result<(), ConfigError>>,
    },
    SetMaxSize {
        max_size: usize,
        reply: oneshot::Sender<std::result::Result<(), ConfigError>>,
    },
    Shutdown,
}

/// Handle to a running pipeline task.
pub struct TrackingService {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    track: watch::Receiver<TrackSnapshot>,
    reports: broadcast::Sender<FrameReport>,
    task: JoinHandle<TrackSnapshot>,
}

impl TrackingService {
    /// Starts the pipeline task. Must be called from within a tokio runtime.
    ///
    /// `report_capacity` bounds how many unread reports a slow subscriber may fall
    /// behind by before it starts missing them.
    pub fn spawn(config: PipelineConfig, report_capacity: usize) -> Self {
        let (commands, command_receiver) = mpsc::unbounded_channel();
        let (track_sender, track) = watch::channel(TrackSnapshot {
            canvas_size: config.canvas_size,
            ..Default::default()
        });
        let (reports, _) = broadcast::channel(report_capacity.max(1));

        let task = tokio::spawn(Self::run(config, command_receiver, track_sender, reports.clone()));

        Self {
            commands,
            track,
            reports,
            task,
        }
    }

    async fn run(
        config: PipelineConfig,
        mut commands: mpsc::UnboundedReceiver<PipelineCommand>,
        track: watch::Sender<TrackSnapshot>,
        reports: broadcast::Sender<FrameReport>,
    ) -> TrackSnapshot {
        let (scheduler, mut timer_events) = TokioScheduler::new();
        let mut pipeline = LaserPipeline::new(config, scheduler);
        info!("tracking service started");

        loop {
            let report = tokio::select! {
                command = commands.recv() => match command {
                    None | Some(PipelineCommand::Shutdown) => break,
                    Some(command) => Self::handle(&mut pipeline, command),
                },
                Some(event) = timer_events.recv() => {
                    Self::fire(&mut pipeline, event);
                    None
                }
            };

            if pipeline.tracker_mut().take_changed() {
                track.send_replace(pipeline.snapshot());
            }
            if let Some(report) = report {
                let _ = reports.send(report);
            }
        }

        info!(frames = pipeline.frames_processed(), "tracking service stopped");
        pipeline.snapshot()
    }

    fn handle(pipeline: &mut LaserPipeline<TokioScheduler>, command: PipelineCommand) -> Option<FrameReport> {
        match command {
            PipelineCommand::Frame(frame) => return Some(pipeline.process_frame(&frame)),
            PipelineCommand::SetDetector(detector) => pipeline.set_detector_config(detector),
            PipelineCommand::SetTransform(transform) => pipeline.set_transform(transform),
            PipelineCommand::SetCanvasSize(canvas_size) => pipeline.set_canvas_size(canvas_size),
            PipelineCommand::SetMaxDelay { max_delay, reply } => {
                let _ = reply.send(pipeline.set_max_delay(max_delay));
            }
            PipelineCommand::SetMaxSize { max_size, reply } => {
                let _ = reply.send(pipeline.set_max_size(max_size));
            }
            PipelineCommand::Shutdown => {}
        }
        None
    }

    fn fire(pipeline: &mut LaserPipeline<TokioScheduler>, event: TimerEvent) {
        if pipeline.tracker_mut().scheduler_mut().accept(&event) {
            pipeline.on_timer(event.timer);
        } else {
            debug!(timer = ?event.timer, "stale timer firing dropped");
        }
    }

    fn send(&self, command: PipelineCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Service("pipeline task is not running"))
    }

    /// Queues a frame behind everything submitted before it.
    pub fn submit_frame(&self, frame: Frame) -> Result<()> {
        self.send(PipelineCommand::Frame(frame))
    }

    pub fn set_detector(&self, detector: DetectorConfig) -> Result<()> {
        self.send(PipelineCommand::SetDetector(detector))
    }

    /// Applies to frames submitted after this call.
    pub fn set_transform(&self, transform: RoiScaleTransform) -> Result<()> {
        self.send(PipelineCommand::SetTransform(transform))
    }

    pub fn set_canvas_size(&self, canvas_size: (u32, u32)) -> Result<()> {
        self.send(PipelineCommand::SetCanvasSize(canvas_size))
    }

    pub async fn set_max_delay(&self, max_delay: Duration) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(PipelineCommand::SetMaxDelay { max_delay, reply })?;
        Self::await_reply(response).await
    }

    pub async fn set_max_size(&self, max_size: usize) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(PipelineCommand::SetMaxSize { max_size, reply })?;
        Self::await_reply(response).await
    }

    async fn await_reply(response: oneshot::Receiver<std::result::Result<(), ConfigError>>) -> Result<()> {
        response
            .await
            .map_err(|_| Error::Service("pipeline task dropped the reply"))?
            .map_err(Error::from)
    }

    /// Receiver for the latest track state.
    pub fn track(&self) -> watch::Receiver<TrackSnapshot> {
        self.track.clone()
    }

    /// Subscribes to per-frame reports from now on.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<FrameReport> {
        self.reports.subscribe()
    }

    /// Processes everything already queued, stops the task and returns the final
    /// track state.
    pub async fn shutdown(self) -> Result<TrackSnapshot> {
        self.send(PipelineCommand::Shutdown)?;
        self.task
            .await
            .map_err(|_| Error::Service("pipeline task panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::Outcome;
    use crate::core_modules::roi::Roi;
    use crate::core_modules::segmenter::HsvRange;
    use crate::core_modules::tracker::TrackerConfig;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::for_frame_size(120, 90);
        config.detector.color.range = HsvRange::new((170, 10), (100, 255), (150, 255)).expect("valid");
        config.tracker = TrackerConfig::new(50, Duration::from_millis(300)).expect("valid");
        config
    }

    fn frame_with_dot(center: (i32, i32)) -> Frame {
        let mut image = RgbImage::from_pixel(120, 90, Rgb([10, 30, 10]));
        draw_filled_circle_mut(&mut image, center, 4, Rgb([255, 20, 20]));
        Frame::from(image)
    }

    #[tokio::test(start_paused = true)]
    async fn frames_build_a_track_that_closes_and_fades_in_real_time() {
        let service = TrackingService::spawn(config(), 16);
        let mut reports = service.subscribe_reports();
        let mut track = service.track();

        for x in [20, 30, 40] {
            service.submit_frame(frame_with_dot((x, 45))).expect("running");
        }
        for _ in 0..3 {
            let report = reports.recv().await.expect("report");
            assert_eq!(report.outcome, Some(Outcome::Located));
        }
        assert_eq!(track.borrow().track.len(), 3);

        let closed = track
            .wait_for(|snapshot| snapshot.track.is_empty() && snapshot.old_track.showing)
            .await
            .expect("service alive")
            .clone();
        assert_eq!(closed.old_track.points.len(), 3);

        track
            .wait_for(|snapshot| !snapshot.old_track.showing && snapshot.old_track.opacity == 0)
            .await
            .expect("service alive");

        let last = service.shutdown().await.expect("clean shutdown");
        assert!(last.track.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_changes_apply_between_frames_in_order() {
        let service = TrackingService::spawn(config(), 16);
        let mut reports = service.subscribe_reports();

        service.submit_frame(frame_with_dot((60, 45))).expect("running");
        let shifted = RoiScaleTransform::new(Roi::new(30, 15, 60, 60), 1.0, (120, 90)).expect("valid");
        service.set_transform(shifted).expect("running");
        service.submit_frame(frame_with_dot((60, 45))).expect("running");

        let first = reports.recv().await.expect("report");
        let second = reports.recv().await.expect("report");
        assert_eq!(first.transform.roi(), Roi::new(0, 0, 120, 90));
        assert_eq!(second.transform, shifted);

        let a = first.corrected.position().expect("found");
        let b = second.corrected.position().expect("found");
        assert!((a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6);
        service.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn detector_and_canvas_updates_reach_the_pipeline() {
        let service = TrackingService::spawn(config(), 16);
        let mut reports = service.subscribe_reports();
        let mut track = service.track();

        service.submit_frame(frame_with_dot((60, 45))).expect("running");
        let mut blue_only = config().detector;
        blue_only.color.range = HsvRange::new((110, 130), (100, 255), (150, 255)).expect("valid");
        service.set_detector(blue_only).expect("running");
        service.submit_frame(frame_with_dot((60, 45))).expect("running");

        assert!(reports.recv().await.expect("report").corrected.found);
        let second = reports.recv().await.expect("report");
        assert_eq!(second.outcome, Some(Outcome::NoBlobs));

        service.set_canvas_size((320, 240)).expect("running");
        let resized = track
            .wait_for(|snapshot| snapshot.canvas_size == (320, 240))
            .await
            .expect("service alive")
            .clone();
        assert!(resized.track.is_empty());
        service.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_track_settings_are_reported_back() {
        let service = TrackingService::spawn(config(), 4);
        assert!(matches!(
            service.set_max_size(1).await,
            Err(Error::Config(ConfigError::TrackTooShort(1)))
        ));
        assert!(matches!(
            service.set_max_delay(Duration::ZERO).await,
            Err(Error::Config(ConfigError::ZeroDelay))
        ));
        service.set_max_size(5).await.expect("valid");
        service.shutdown().await.expect("clean shutdown");
    }
}
