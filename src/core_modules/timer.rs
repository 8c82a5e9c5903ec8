// THEORY:
// The track accumulator is driven by two deadlines: the track timeout and the fade
// step. Neither belongs to a particular clock. The accumulator only arms and cancels
// them through the `Scheduler` trait; whoever owns the clock delivers firings back
// by calling `TrackAccumulator::on_timer`.
//
// Two clocks are provided:
// - `ManualScheduler`: a simulated clock advanced explicitly. Deterministic, used by
//   tests and by offline replays.
// - `TokioScheduler`: real time, one `tokio::time::sleep` task per armed timer.
//   Firings travel over a channel and carry a generation stamp so a firing that
//   raced a cancel or a re-arm is recognised and dropped.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The deadlines used by the track accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// No point accepted for `max_delay`: close the active track.
    TrackTimeout,
    /// Next decrement of the old track's opacity.
    FadeStep,
}

/// A cancellable one-shot deadline service.
///
/// Arming a timer that is already armed replaces its deadline.
pub trait Scheduler {
    fn arm(&mut self, timer: TimerId, after: Duration);
    fn cancel(&mut self, timer: TimerId);
    fn is_armed(&self, timer: TimerId) -> bool;
}

/// A simulated clock.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    deadlines: HashMap<TimerId, Duration>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn deadline(&self, timer: TimerId) -> Option<Duration> {
        self.deadlines.get(&timer).copied()
    }

    /// Removes and returns the earliest timer due at or before `until`, moving the
    /// clock to its deadline. Ties fire timeouts before fade steps.
    pub fn pop_due(&mut self, until: Duration) -> Option<TimerId> {
        let (timer, deadline) = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= until)
            .min_by_key(|(timer, deadline)| (**deadline, **timer != TimerId::TrackTimeout))
            .map(|(timer, deadline)| (*timer, *deadline))?;
        self.deadlines.remove(&timer);
        self.now = self.now.max(deadline);
        Some(timer)
    }

    /// Moves the clock forward without firing anything.
    pub fn set_now(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }
}

impl Scheduler for ManualScheduler {
    fn arm(&mut self, timer: TimerId, after: Duration) {
        self.deadlines.insert(timer, self.now + after);
    }

    fn cancel(&mut self, timer: TimerId) {
        self.deadlines.remove(&timer);
    }

    fn is_armed(&self, timer: TimerId) -> bool {
        self.deadlines.contains_key(&timer)
    }
}

/// A timer firing delivered by `TokioScheduler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub timer: TimerId,
    generation: u64,
}

/// Real-time scheduler backed by tokio sleep tasks.
///
/// Must be used from within a tokio runtime.
pub struct TokioScheduler {
    events: mpsc::UnboundedSender<TimerEvent>,
    armed: HashMap<TimerId, (u64, JoinHandle<()>)>,
    next_generation: u64,
}

impl TokioScheduler {
    /// Creates the scheduler and the receiving end for its firings.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                events,
                armed: HashMap::new(),
                next_generation: 0,
            },
            receiver,
        )
    }

    /// Consumes a firing. Returns false for firings superseded by a cancel or re-arm.
    pub fn accept(&mut self, event: &TimerEvent) -> bool {
        match self.armed.get(&event.timer) {
            Some((generation, _)) if *generation == event.generation => {
                self.armed.remove(&event.timer);
                true
            }
            _ => false,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn arm(&mut self, timer: TimerId, after: Duration) {
        self.cancel(timer);
        let generation = self.next_generation;
        self.next_generation += 1;

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(TimerEvent { timer, generation });
        });
        self.armed.insert(timer, (generation, handle));
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some((_, handle)) = self.armed.remove(&timer) {
            handle.abort();
        }
    }

    fn is_armed(&self, timer: TimerId) -> bool {
        self.armed.contains_key(&timer)
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.armed.values() {
            handle.abort();
        }
    }
}
