//! Timing utilities for frame pacing and presentation timestamps

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{Interval, MissedTickBehavior};

/// Monotonic clock for presentation timestamps
///
/// Every frame and fragment of a session derives its timestamp from one clock
/// so ordering is monotonic across the render loop and the recorder.
#[derive(Debug, Clone)]
pub struct PTSClock {
    start: Arc<Instant>,
}

impl PTSClock {
    /// Create a new PTS clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Presentation timestamp in seconds since the clock started
    #[inline]
    pub fn pts(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Get the start instant for sharing with other components
    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for PTSClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Duration of one frame at `fps`, falling back to 30 fps for invalid rates
pub fn frame_interval(fps: f64) -> Duration {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
    Duration::from_secs_f64(1.0 / fps.min(240.0))
}

/// Ticker that skips missed ticks instead of bursting to catch up
pub fn pacing_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(25.0), Duration::from_millis(40));
        assert_eq!(frame_interval(0.0), frame_interval(30.0));
        assert_eq!(frame_interval(f64::NAN), frame_interval(30.0));
    }

    #[test]
    fn test_pts_is_monotonic() {
        let clock = PTSClock::new();
        let a = clock.pts();
        let b = clock.pts();
        assert!(b >= a);
    }
}
