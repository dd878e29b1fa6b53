//! Delivery statistics
//!
//! Provides:
//! - Producer-side counters for sent, rejected and paced frames
//! - Consumer-side counters for fresh, repeated and skipped frames
//! - Rolling frame rate over the last [`MAX_SAMPLES`] intervals

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Maximum number of samples to keep for rolling averages
pub const MAX_SAMPLES: usize = 120;

/// Rolling average calculator for timing data
#[derive(Debug)]
struct RollingAverage {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl RollingAverage {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    fn add(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Frame rate from the spacing of recent events
#[derive(Debug)]
struct RateMeter {
    intervals: RollingAverage,
    last: Option<Instant>,
}

impl RateMeter {
    fn new() -> Self {
        Self {
            intervals: RollingAverage::new(MAX_SAMPLES),
            last: None,
        }
    }

    fn tick(&mut self, at: Instant) {
        if let Some(last) = self.last {
            self.intervals.add(at.saturating_duration_since(last));
        }
        self.last = Some(at);
    }

    fn fps(&self) -> f64 {
        let avg = self.intervals.average().as_secs_f64();
        if avg > 0.0 { 1.0 / avg } else { 0.0 }
    }

    fn clear(&mut self) {
        self.intervals.clear();
        self.last = None;
    }
}

/// Producer statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SendStats {
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Frames refused for a shape mismatch
    pub frames_rejected: u64,
    /// Sequence number of the last published frame
    pub last_sequence: u64,
    /// Submission rate over the recent window
    pub average_fps: f64,
    /// Total time spent sleeping for pacing
    pub paced_ms_total: u64,
}

impl SendStats {
    /// Single line for periodic logging
    pub fn format_line(&self) -> String {
        format!(
            "sent={} rejected={} seq={} fps={:.1} paced={}ms",
            self.frames_sent,
            self.frames_rejected,
            self.last_sequence,
            self.average_fps,
            self.paced_ms_total
        )
    }
}

/// Thread-safe producer metrics
#[derive(Debug)]
pub struct SendMetrics {
    frames_sent: AtomicU64,
    frames_rejected: AtomicU64,
    last_sequence: AtomicU64,
    paced_us_total: AtomicU64,
    rate: RwLock<RateMeter>,
}

impl Default for SendMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SendMetrics {
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
            paced_us_total: AtomicU64::new(0),
            rate: RwLock::new(RateMeter::new()),
        }
    }

    /// Record a published frame
    pub fn record_sent(&self, sequence: u64, at: Instant) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.last_sequence.fetch_max(sequence, Ordering::Relaxed);
        self.rate.write().tick(at);
    }

    /// Record a frame refused by validation
    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time slept by the pacer
    pub fn record_paced(&self, slept: Duration) {
        self.paced_us_total
            .fetch_add(slept.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SendStats {
        SendStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            last_sequence: self.last_sequence.load(Ordering::Relaxed),
            average_fps: self.rate.read().fps(),
            paced_ms_total: self.paced_us_total.load(Ordering::Relaxed) / 1000,
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.frames_sent.store(0, Ordering::Relaxed);
        self.frames_rejected.store(0, Ordering::Relaxed);
        self.last_sequence.store(0, Ordering::Relaxed);
        self.paced_us_total.store(0, Ordering::Relaxed);
        self.rate.write().clear();
    }
}

/// Consumer statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiveStats {
    /// Frames with a sequence not seen before
    pub frames_fresh: u64,
    /// Re-deliveries of an already seen frame
    pub frames_repeated: u64,
    /// Sequence numbers the consumer never saw
    pub frames_skipped: u64,
    /// Pulls that found the producer gone
    pub inactive_pulls: u64,
    /// Fresh frame rate over the recent window
    pub average_fps: f64,
}

impl ReceiveStats {
    /// Single line for periodic logging
    pub fn format_line(&self) -> String {
        format!(
            "fresh={} repeated={} skipped={} inactive={} fps={:.1}",
            self.frames_fresh,
            self.frames_repeated,
            self.frames_skipped,
            self.inactive_pulls,
            self.average_fps
        )
    }
}

/// Consumer metrics; owned by a single receiver, so no atomics
#[derive(Debug)]
pub struct ReceiveMetrics {
    stats: ReceiveStats,
    last_sequence: u64,
    rate: RateMeter,
}

impl Default for ReceiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveMetrics {
    pub fn new() -> Self {
        Self {
            stats: ReceiveStats::default(),
            last_sequence: 0,
            rate: RateMeter::new(),
        }
    }

    /// Record a delivered frame
    pub fn record_frame(&mut self, sequence: u64, fresh: bool, at: Instant) {
        if !fresh {
            self.stats.frames_repeated += 1;
            return;
        }
        self.stats.frames_fresh += 1;
        if self.last_sequence > 0 && sequence > self.last_sequence + 1 {
            self.stats.frames_skipped += sequence - self.last_sequence - 1;
        }
        self.last_sequence = sequence;
        self.rate.tick(at);
    }

    pub fn record_inactive(&mut self) {
        self.stats.inactive_pulls += 1;
    }

    pub fn stats(&self) -> ReceiveStats {
        ReceiveStats {
            average_fps: self.rate.fps(),
            ..self.stats.clone()
        }
    }
}
