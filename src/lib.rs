//! # Vision Stream Client
//!
//! Low-latency streaming client for live vision pipelines: pushes camera
//! frames to a backend pipeline and renders returned detections as an
//! overlay in near real time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               CLIENT                                  │
//! │  ┌──────────────┐      ┌────────────────┐      ┌──────────────────┐  │
//! │  │ FrameSource  │ ───► │ FrameSubmitter │ ───► │ ConnectionManager│  │
//! │  │ (camera /    │      │ (sampling +    │      │ (session state   │  │
//! │  │  test source)│      │  backpressure) │      │  machine)        │  │
//! │  └──────────────┘      └────────────────┘      └────────┬─────────┘  │
//! │                                                         │ frames     │
//! └─────────────────────────────────────────────────────────┼────────────┘
//!                                                           │ WebSocket
//!                                                           ▼
//!                                                  ┌─────────────────┐
//!                                                  │ backend pipeline│
//!                                                  └────────┬────────┘
//! ┌─────────────────────────────────────────────────────────┼────────────┐
//! │                                                         │ results /  │
//! │  ┌─────────────────┐     ┌───────────────┐              │ errors /   │
//! │  │ OverlayRenderer │ ◄── │ SessionStore  │ ◄────────────┘ slow-down  │
//! │  │ (draw commands) │     │ (subscribe)   │   normalize + classify    │
//! │  └─────────────────┘     └───────────────┘                           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Results are normalized into one canonical detection schema regardless of
//! which backend plugin produced them; errors are classified into
//! per-frame-recoverable and session-fatal; backpressure notices widen the
//! sampling interval cooperatively.

pub mod catalog;
pub mod client;
pub mod decode;
pub mod error;
pub mod overlay;
pub mod prefs;
pub mod protocol;
pub mod session;
pub mod source;
pub mod submit;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default frame sampling rate in frames per second
    pub const DEFAULT_TARGET_FPS: u32 = 30;

    /// Minimum accepted sampling rate
    pub const MIN_TARGET_FPS: u32 = 1;

    /// Maximum accepted sampling rate
    pub const MAX_TARGET_FPS: u32 = 120;

    /// Interval multiplier applied on each backpressure notice
    pub const BACKOFF_FACTOR: f64 = 1.5;

    /// Upper bound on the widened interval, as a multiple of the base interval
    pub const MAX_BACKOFF_MULTIPLIER: f64 = 4.0;

    /// Quiet period without a backpressure notice before the interval relaxes
    pub const BACKOFF_RECOVERY_MS: u64 = 2000;

    /// Default overlay surface width in pixels
    pub const DEFAULT_CANVAS_WIDTH: u32 = 1280;

    /// Default overlay surface height in pixels
    pub const DEFAULT_CANVAS_HEIGHT: u32 = 720;

    /// Vertical gap between a box top edge and its label baseline
    pub const LABEL_OFFSET_PX: f32 = 12.0;

    /// Labels are clamped so they never render above this y coordinate
    pub const LABEL_MIN_Y: f32 = 12.0;

    /// Side length of the radar minimap, as a fraction of the canvas width
    pub const RADAR_SCALE: f32 = 0.2;

    /// Capacity of the capture-thread frame bridge
    pub const SOURCE_CHANNEL_CAPACITY: usize = 4;
}
