// THEORY:
// The `tracker` module is the only part of the system with memory. It turns the
// stream of per-frame detections into a trajectory that can be drawn: a bounded
// polyline of recent laser positions, segmented in time.
//
// Key principles:
// 1.  **Bounded track**: Each accepted position is appended to the active track.
//     When the track grows past `max_size`, the oldest points are dropped first.
// 2.  **Timeout segmentation**: Every accepted position re-arms a deadline of
//     `max_delay`. If it expires before the next position, the active track is
//     closed. Misses themselves do nothing; silence is measured in time, not in
//     frames.
// 3.  **Fade-out**: Closing moves the active track into the "old track" slot at full
//     opacity. A periodic fade step lowers the opacity until it reaches zero and the
//     old track stops showing. A new close restarts the fade with the new track.
// 4.  **Canvas changes**: A new canvas geometry discards the active track without
//     fading it, since its coordinates no longer match what will be drawn. An old
//     track that is already fading is left alone.
//
// States: Idle (empty track) and Tracking (non-empty), plus the orthogonal fade
// sub-state of the old track.

use crate::core_modules::detection::Detection;
use crate::core_modules::timer::{ManualScheduler, Scheduler, TimerId};
use crate::error::ConfigError;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Opacity of a freshly closed track.
pub const FULL_OPACITY: u8 = 255;

pub type TrackPoint = (f64, f64);

/// Track length and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    max_size: usize,
    max_delay: Duration,
}

impl TrackerConfig {
    pub fn new(max_size: usize, max_delay: Duration) -> Result<Self, ConfigError> {
        if max_size < 2 {
            return Err(ConfigError::TrackTooShort(max_size));
        }
        if max_delay.is_zero() {
            return Err(ConfigError::ZeroDelay);
        }
        Ok(Self { max_size, max_delay })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_delay: Duration::from_secs(1),
        }
    }
}

/// Fade-out animation of the old track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeConfig {
    duration: Duration,
    steps: u32,
}

impl FadeConfig {
    pub fn new(duration: Duration, steps: u32) -> Result<Self, ConfigError> {
        if steps == 0 || duration.is_zero() {
            return Err(ConfigError::InvalidFade);
        }
        Ok(Self { duration, steps })
    }

    /// Time between two opacity decrements.
    pub fn step_interval(&self) -> Duration {
        self.duration / self.steps
    }

    /// Opacity removed per step.
    pub fn step_decrement(&self) -> u8 {
        (FULL_OPACITY as u32).div_ceil(self.steps).min(FULL_OPACITY as u32) as u8
    }
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(1),
            steps: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Idle,
    Tracking,
}

/// The most recently closed track and its fade state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OldTrack {
    pub points: Vec<TrackPoint>,
    pub opacity: u8,
    pub showing: bool,
}

/// What the rendering side needs to draw the current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSnapshot {
    pub track: Vec<TrackPoint>,
    pub old_track: OldTrack,
    pub canvas_size: (u32, u32),
}

/// Accumulates detections into a time-segmented, fading trajectory.
pub struct TrackAccumulator<S: Scheduler> {
    track: VecDeque<TrackPoint>,
    old_track: OldTrack,
    config: TrackerConfig,
    fade: FadeConfig,
    canvas_size: (u32, u32),
    scheduler: S,
    changed: bool,
}

impl<S: Scheduler> TrackAccumulator<S> {
    pub fn new(config: TrackerConfig, fade: FadeConfig, canvas_size: (u32, u32), scheduler: S) -> Self {
        Self {
            track: VecDeque::new(),
            old_track: OldTrack::default(),
            config,
            fade,
            canvas_size,
            scheduler,
            changed: false,
        }
    }

    /// Feeds one corrected detection.
    pub fn add_tip(&mut self, detection: Detection) {
        if let Some(position) = detection.position() {
            self.append(position);
        }
    }

    fn append(&mut self, position: TrackPoint) {
        self.track.push_back(position);
        while self.track.len() > self.config.max_size {
            self.track.pop_front();
        }
        self.scheduler.arm(TimerId::TrackTimeout, self.config.max_delay);
        self.changed = true;
    }

    /// Delivers a timer firing from the scheduler.
    pub fn on_timer(&mut self, timer: TimerId) {
        match timer {
            TimerId::TrackTimeout => {
                if !self.track.is_empty() {
                    debug!(points = self.track.len(), "track timed out");
                    self.close_track();
                }
            }
            TimerId::FadeStep => self.fade_step(),
        }
    }

    /// Ends the active track. A non-empty track becomes the fading old track.
    pub fn close_track(&mut self) {
        self.scheduler.cancel(TimerId::TrackTimeout);
        if self.track.is_empty() {
            return;
        }

        self.scheduler.cancel(TimerId::FadeStep);
        self.old_track = OldTrack {
            points: self.track.drain(..).collect(),
            opacity: FULL_OPACITY,
            showing: true,
        };
        self.scheduler.arm(TimerId::FadeStep, self.fade.step_interval());
        self.changed = true;
    }

    fn fade_step(&mut self) {
        if !self.old_track.showing {
            return;
        }
        self.old_track.opacity = self.old_track.opacity.saturating_sub(self.fade.step_decrement());
        if self.old_track.opacity == 0 {
            self.old_track.showing = false;
            debug!("old track faded out");
        } else {
            self.scheduler.arm(TimerId::FadeStep, self.fade.step_interval());
        }
        self.changed = true;
    }

    /// Switches to a new canvas geometry. The active track is discarded without
    /// fading; an old track already fading keeps fading.
    pub fn set_canvas_size(&mut self, canvas_size: (u32, u32)) {
        self.canvas_size = canvas_size;
        self.track.clear();
        self.close_track();
        self.changed = true;
    }

    /// Changes the timeout and re-arms the countdown with it.
    pub fn set_max_delay(&mut self, max_delay: Duration) -> Result<(), ConfigError> {
        self.config = TrackerConfig::new(self.config.max_size, max_delay)?;
        self.scheduler.arm(TimerId::TrackTimeout, max_delay);
        Ok(())
    }

    /// Changes the track bound, trimming the active track if needed.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<(), ConfigError> {
        self.config = TrackerConfig::new(max_size, self.config.max_delay)?;
        if self.track.len() > max_size {
            let excess = self.track.len() - max_size;
            self.track.drain(..excess);
            self.changed = true;
        }
        Ok(())
    }

    pub fn state(&self) -> TrackState {
        if self.track.is_empty() {
            TrackState::Idle
        } else {
            TrackState::Tracking
        }
    }

    pub fn track(&self) -> &VecDeque<TrackPoint> {
        &self.track
    }

    pub fn old_track(&self) -> &OldTrack {
        &self.old_track
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track: self.track.iter().copied().collect(),
            old_track: self.old_track.clone(),
            canvas_size: self.canvas_size,
        }
    }

    /// Returns whether the track or old track changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}

impl TrackAccumulator<ManualScheduler> {
    /// Advances the simulated clock by `elapsed`, firing every timer that falls due.
    pub fn advance(&mut self, elapsed: Duration) {
        let target = self.scheduler.now() + elapsed;
        while let Some(timer) = self.scheduler.pop_due(target) {
            self.on_timer(timer);
        }
        self.scheduler.set_now(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator(max_size: usize, max_delay_ms: u64) -> TrackAccumulator<ManualScheduler> {
        TrackAccumulator::new(
            TrackerConfig::new(max_size, Duration::from_millis(max_delay_ms)).expect("valid"),
            FadeConfig::new(Duration::from_millis(100), 4).expect("valid"),
            (640, 480),
            ManualScheduler::new(),
        )
    }

    fn hit(x: f64, y: f64) -> Detection {
        Detection::found((x, y))
    }

    #[test]
    fn track_keeps_only_the_newest_points() {
        let mut tracker = accumulator(3, 1000);
        for i in 0..5 {
            tracker.add_tip(hit(i as f64, i as f64));
        }
        let track: Vec<_> = tracker.track().iter().copied().collect();
        assert_eq!(track, vec![(2.0, 2.0), (3.0, 3.0), (4.0, 4.0)]);
        assert_eq!(tracker.state(), TrackState::Tracking);
    }

    #[test]
    fn misses_alone_do_not_close_the_track() {
        let mut tracker = accumulator(10, 1000);
        tracker.add_tip(hit(1.0, 1.0));
        for _ in 0..100 {
            tracker.add_tip(Detection::not_found());
        }
        tracker.advance(Duration::from_millis(999));
        assert_eq!(tracker.track().len(), 1);
    }

    #[test]
    fn silence_longer_than_max_delay_closes_the_track() {
        let mut tracker = accumulator(10, 200);
        tracker.add_tip(hit(1.0, 1.0));
        tracker.add_tip(hit(2.0, 2.0));
        tracker.add_tip(Detection::not_found());
        tracker.advance(Duration::from_millis(201));

        assert_eq!(tracker.state(), TrackState::Idle);
        let old = tracker.old_track();
        assert_eq!(old.points, vec![(1.0, 1.0), (2.0, 2.0)]);
        assert!(old.showing);
        assert_eq!(old.opacity, FULL_OPACITY);
    }

    #[test]
    fn every_accepted_point_restarts_the_countdown() {
        let mut tracker = accumulator(10, 200);
        tracker.add_tip(hit(1.0, 1.0));
        tracker.advance(Duration::from_millis(150));
        tracker.add_tip(hit(2.0, 2.0));
        tracker.advance(Duration::from_millis(150));
        assert_eq!(tracker.track().len(), 2);
        tracker.advance(Duration::from_millis(60));
        assert!(tracker.track().is_empty());
    }

    #[test]
    fn old_track_fades_out_in_steps() {
        let mut tracker = accumulator(10, 50);
        tracker.add_tip(hit(1.0, 1.0));
        tracker.advance(Duration::from_millis(50));
        assert!(tracker.old_track().showing);

        // 4 steps of 25 ms, 64 opacity each.
        tracker.advance(Duration::from_millis(25));
        assert_eq!(tracker.old_track().opacity, 191);
        tracker.advance(Duration::from_millis(50));
        assert_eq!(tracker.old_track().opacity, 63);
        tracker.advance(Duration::from_millis(25));
        assert_eq!(tracker.old_track().opacity, 0);
        assert!(!tracker.old_track().showing);
        assert!(!tracker.scheduler().is_armed(TimerId::FadeStep));
    }

    #[test]
    fn a_new_close_restarts_the_fade_with_the_new_track() {
        let mut tracker = accumulator(10, 50);
        tracker.add_tip(hit(1.0, 1.0));
        tracker.advance(Duration::from_millis(80));
        assert!(tracker.old_track().opacity < FULL_OPACITY);

        tracker.add_tip(hit(5.0, 5.0));
        tracker.close_track();
        assert_eq!(tracker.old_track().points, vec![(5.0, 5.0)]);
        assert_eq!(tracker.old_track().opacity, FULL_OPACITY);
    }

    #[test]
    fn canvas_change_discards_the_track_without_fading() {
        let mut tracker = accumulator(10, 50);
        tracker.add_tip(hit(1.0, 1.0));
        tracker.set_canvas_size((320, 240));

        assert_eq!(tracker.state(), TrackState::Idle);
        assert!(!tracker.old_track().showing);
        assert!(tracker.old_track().points.is_empty());
        assert_eq!(tracker.canvas_size(), (320, 240));
        assert!(!tracker.scheduler().is_armed(TimerId::TrackTimeout));
    }

    #[test]
    fn canvas_change_lets_a_running_fade_finish() {
        let mut tracker = accumulator(10, 50);
        tracker.add_tip(hit(1.0, 1.0));
        tracker.advance(Duration::from_millis(50));
        tracker.add_tip(hit(2.0, 2.0));

        tracker.set_canvas_size((320, 240));
        let old = tracker.old_track();
        assert_eq!(old.points, vec![(1.0, 1.0)]);
        assert_eq!(old.opacity, FULL_OPACITY);
        assert!(old.showing);
        assert!(tracker.track().is_empty());
        assert!(tracker.scheduler().is_armed(TimerId::FadeStep));

        tracker.advance(Duration::from_millis(25));
        assert_eq!(tracker.old_track().opacity, 191);
        tracker.advance(Duration::from_millis(100));
        assert!(!tracker.old_track().showing);
    }

    #[test]
    fn changing_max_delay_rearms_immediately() {
        let mut tracker = accumulator(10, 1000);
        tracker.add_tip(hit(1.0, 1.0));
        tracker.advance(Duration::from_millis(500));
        tracker.set_max_delay(Duration::from_millis(100)).expect("valid");
        assert_eq!(
            tracker.scheduler().deadline(TimerId::TrackTimeout),
            Some(Duration::from_millis(600))
        );
        tracker.advance(Duration::from_millis(100));
        assert!(tracker.track().is_empty());
    }

    #[test]
    fn shrinking_max_size_trims_from_the_front() {
        let mut tracker = accumulator(10, 1000);
        for i in 0..6 {
            tracker.add_tip(hit(i as f64, 0.0));
        }
        tracker.set_max_size(2).expect("valid");
        let track: Vec<_> = tracker.track().iter().copied().collect();
        assert_eq!(track, vec![(4.0, 0.0), (5.0, 0.0)]);
        assert_eq!(tracker.set_max_size(1), Err(ConfigError::TrackTooShort(1)));
        assert_eq!(tracker.config().max_size(), 2);
    }

    #[test]
    fn change_flag_reports_each_update_once() {
        let mut tracker = accumulator(10, 1000);
        assert!(!tracker.take_changed());
        tracker.add_tip(hit(1.0, 1.0));
        assert!(tracker.take_changed());
        assert!(!tracker.take_changed());
        tracker.add_tip(Detection::not_found());
        assert!(!tracker.take_changed());
    }
}
