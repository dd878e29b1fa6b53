//! Frame pacing
//!
//! Spaces frame delivery to the configured rate. The first frame anchors the
//! clock. A frame arriving early waits out the rest of its interval; the
//! anchor then advances by one interval so that a frame arriving a little
//! late is sent at once and the cadence recovers. Once a frame is more than
//! half an interval late the anchor is reset instead.

use std::time::{Duration, Instant};

/// Paces submissions to a fixed interval
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    anchor: Option<Instant>,
}

impl FramePacer {
    /// `framerate <= 0` disables pacing
    pub fn new(framerate: f32) -> Self {
        let interval = if framerate > 0.0 && framerate.is_finite() {
            Some(Duration::from_secs_f64(1.0 / framerate as f64))
        } else {
            None
        };
        Self {
            interval,
            anchor: None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Advance the clock for a frame submitted at `now`
    ///
    /// Returns how long the caller must sleep before delivering the frame.
    /// Never longer than one interval.
    pub fn step(&mut self, now: Instant) -> Duration {
        let Some(interval) = self.interval else {
            return Duration::ZERO;
        };
        let Some(anchor) = self.anchor else {
            self.anchor = Some(now);
            return Duration::ZERO;
        };

        let elapsed = now.saturating_duration_since(anchor);
        let wait = interval.saturating_sub(elapsed);
        if elapsed < interval.mul_f32(1.5) {
            self.anchor = Some(anchor + interval);
        } else {
            self.anchor = Some(now);
        }
        wait
    }

    /// [`step`](Self::step) and sleep; returns the time slept
    pub fn pace(&mut self) -> Duration {
        let wait = self.step(Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        wait
    }

    /// Forget the anchor; the next frame is treated as the first
    pub fn reset(&mut self) {
        self.anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_unpaced() {
        let mut pacer = FramePacer::new(0.0);
        let now = Instant::now();
        assert_eq!(pacer.step(now), Duration::ZERO);
        assert_eq!(pacer.step(now), Duration::ZERO);
        assert!(pacer.interval().is_none());
    }

    #[test]
    fn test_first_frame_is_immediate() {
        let mut pacer = FramePacer::new(10.0);
        assert_eq!(pacer.step(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_early_frame_waits_remaining_interval() {
        let mut pacer = FramePacer::new(10.0);
        let t0 = Instant::now();
        pacer.step(t0);
        assert_eq!(pacer.step(t0 + 30 * MS), 70 * MS);
        // Anchor advanced to t0 + 100ms
        assert_eq!(pacer.step(t0 + 150 * MS), 50 * MS);
    }

    #[test]
    fn test_slightly_late_frame_keeps_cadence() {
        let mut pacer = FramePacer::new(10.0);
        let t0 = Instant::now();
        pacer.step(t0);
        assert_eq!(pacer.step(t0 + 120 * MS), Duration::ZERO);
        // Anchor rewound to t0 + 100ms, so the next slot is t0 + 200ms
        assert_eq!(pacer.step(t0 + 160 * MS), 40 * MS);
    }

    #[test]
    fn test_very_late_frame_resets_anchor() {
        let mut pacer = FramePacer::new(10.0);
        let t0 = Instant::now();
        pacer.step(t0);
        assert_eq!(pacer.step(t0 + 400 * MS), Duration::ZERO);
        assert_eq!(pacer.step(t0 + 420 * MS), 80 * MS);
    }

    #[test]
    fn test_reset() {
        let mut pacer = FramePacer::new(10.0);
        let t0 = Instant::now();
        pacer.step(t0);
        pacer.reset();
        assert_eq!(pacer.step(t0 + 10 * MS), Duration::ZERO);
    }
}
