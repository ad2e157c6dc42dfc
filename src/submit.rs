//! Frame sampling and cooperative backpressure
//!
//! The submitter ticks at a target rate, grabs the freshest frame from the
//! source, and attempts exactly one send per tick. Nothing is queued or
//! retried: delivery is at-most-once and a lost frame is a counted,
//! accepted outcome. Backpressure is cooperative: each slow-down notice
//! widens the sampling interval, and a quiet period relaxes it back.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::constants::{
    BACKOFF_FACTOR, BACKOFF_RECOVERY_MS, DEFAULT_TARGET_FPS, MAX_BACKOFF_MULTIPLIER,
    MAX_TARGET_FPS, MIN_TARGET_FPS,
};
use crate::session::ConnectionManager;
use crate::source::{FrameSource, VideoFrame};

/// A raster sample with its submission sequence id, assigned at capture
/// time. Ephemeral: it exists only until accepted or dropped.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub sequence: u64,
    pub payload: Bytes,
    pub captured_at: DateTime<Utc>,
}

impl OutboundFrame {
    pub fn new(sequence: u64, frame: VideoFrame) -> Self {
        Self {
            sequence,
            payload: frame.payload,
            captured_at: frame.captured_at,
        }
    }
}

/// Sampling rate in frames per second, clamped to the accepted range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRate {
    fps: u32,
}

impl TargetRate {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Base interval between sampling ticks
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps as f64)
    }
}

impl Default for TargetRate {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_FPS)
    }
}

/// Widens the sampling interval on backpressure notices and relaxes it
/// again after a quiet period.
///
/// Policy: each notice multiplies the interval by `BACKOFF_FACTOR`, capped
/// at `MAX_BACKOFF_MULTIPLIER` times the base interval. Once no notice has
/// arrived for `BACKOFF_RECOVERY_MS`, the interval halves toward base on
/// each tick until it is back at the target rate.
#[derive(Debug)]
pub struct RateController {
    base: Duration,
    current: Duration,
    last_notice_at: Option<Instant>,
}

impl RateController {
    pub fn new(rate: TargetRate) -> Self {
        let base = rate.interval();
        Self {
            base,
            current: base,
            last_notice_at: None,
        }
    }

    /// Replace the target rate; any accumulated backoff is discarded
    pub fn set_rate(&mut self, rate: TargetRate) {
        self.base = rate.interval();
        self.current = self.base;
        self.last_notice_at = None;
    }

    /// Interval to wait before the next sampling tick
    pub fn interval(&self) -> Duration {
        self.current
    }

    /// Register one backpressure notice
    pub fn on_slow_down(&mut self, now: Instant) {
        let cap = self.base.mul_f64(MAX_BACKOFF_MULTIPLIER);
        self.current = self.current.mul_f64(BACKOFF_FACTOR).min(cap);
        self.last_notice_at = Some(now);
    }

    /// Advance recovery on a tick without a notice
    pub fn on_tick(&mut self, now: Instant) {
        let Some(last) = self.last_notice_at else { return };
        if now.duration_since(last) < Duration::from_millis(BACKOFF_RECOVERY_MS) {
            return;
        }
        self.current = (self.current / 2).max(self.base);
        if self.current == self.base {
            self.last_notice_at = None;
        }
    }
}

/// Shared handle to a frame source, so the source outlives the per-session
/// sampling tasks
pub type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

/// Wrap a source for use across sessions
pub fn shared_source(source: impl FrameSource + 'static) -> SharedSource {
    Arc::new(Mutex::new(Box::new(source)))
}

/// Samples the video source and forwards frames to the connection manager
pub struct FrameSubmitter {
    manager: Arc<ConnectionManager>,
    source: SharedSource,
    rate: RateController,
    /// Live target rate, shared with the UI
    target: Arc<Mutex<TargetRate>>,
    /// Slow-down notices already folded into the backoff
    seen_notices: u64,
    sequence: u64,
}

impl FrameSubmitter {
    pub fn new(
        manager: Arc<ConnectionManager>,
        source: SharedSource,
        target: Arc<Mutex<TargetRate>>,
    ) -> Self {
        let rate = RateController::new(*target.lock());
        Self {
            manager,
            source,
            rate,
            target,
            seen_notices: 0,
            sequence: 0,
        }
    }

    /// Run sampling ticks until the session's streaming gate clears
    pub async fn run(mut self) {
        let gate = self.manager.streaming_gate();
        while gate.load(Ordering::SeqCst) {
            tokio::time::sleep(self.rate.interval()).await;
            if !gate.load(Ordering::SeqCst) {
                break;
            }
            self.tick(Instant::now());
        }
        tracing::debug!("sampling loop finished after {} frames", self.sequence);
    }

    /// One sampling tick; separated from `run` for tests
    pub fn tick(&mut self, now: Instant) {
        let target = *self.target.lock();
        if target.interval() != self.base_interval() {
            self.rate.set_rate(target);
        }

        // Fold in backpressure notices observed since the last tick
        let notices = self.manager.store().metrics().slow_down_warnings;
        for _ in self.seen_notices..notices {
            self.rate.on_slow_down(now);
        }
        self.seen_notices = notices;
        self.rate.on_tick(now);

        // Only the freshest frame matters for a live overlay
        let frame = match self.source.lock().latest_frame() {
            Some(frame) => frame,
            None => return,
        };

        let sequence = self.sequence;
        self.sequence += 1;

        if let Err(e) = self.manager.send(&OutboundFrame::new(sequence, frame)) {
            self.manager.store().record_dropped_frame();
            tracing::trace!("frame {} dropped: {}", sequence, e);
        }
    }

    fn base_interval(&self) -> Duration {
        self.rate.base
    }
}
