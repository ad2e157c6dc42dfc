//! Frame sources
//!
//! How frames are physically captured is outside this crate; a source is an
//! opaque producer of timestamped raster frames. Only the freshest frame
//! matters for a live overlay, so sources never buffer history: sampling
//! asks for the latest frame and anything older is already worthless.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::constants::SOURCE_CHANNEL_CAPACITY;

/// One encoded raster sample
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Encoded image payload (JPEG unless the producer says otherwise)
    pub payload: Bytes,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// An opaque video source
pub trait FrameSource: Send {
    /// The freshest available frame, or `None` when nothing has been
    /// produced yet
    fn latest_frame(&mut self) -> Option<VideoFrame>;
}

/// Bridges an external capture thread into the sampling loop.
///
/// The producer pushes frames into a small bounded channel from its own
/// thread; `latest_frame` drains whatever has accumulated and keeps only
/// the newest. A full channel just means the producer outpaced sampling,
/// so producers should use `try_send` and shrug off rejected pushes.
pub struct ChannelSource {
    rx: Receiver<VideoFrame>,
    latest: Option<VideoFrame>,
}

impl ChannelSource {
    /// Create the bridge; hand the sender to the capture thread
    pub fn new() -> (Sender<VideoFrame>, Self) {
        let (tx, rx) = bounded(SOURCE_CHANNEL_CAPACITY);
        (tx, Self { rx, latest: None })
    }
}

impl FrameSource for ChannelSource {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        while let Ok(frame) = self.rx.try_recv() {
            self.latest = Some(frame);
        }
        self.latest.clone()
    }
}

/// Synthetic source for demos and tests: a gradient with a moving bar,
/// JPEG-encoded fresh on every call
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(16),
            height: height.max(16),
            tick: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let bar_x = ((self.tick * 8) % self.width as u64) as u32;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            if x.abs_diff(bar_x) < 4 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([
                    (x * 255 / self.width) as u8,
                    (y * 255 / self.height) as u8,
                    64,
                ])
            }
        })
    }
}

impl FrameSource for TestPatternSource {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        self.tick += 1;
        let image = self.render();

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, 80);
        if let Err(e) = image.write_with_encoder(encoder) {
            tracing::warn!("test pattern encode failed: {}", e);
            return None;
        }

        Some(VideoFrame {
            payload: Bytes::from(jpeg),
            width: self.width,
            height: self.height,
            captured_at: Utc::now(),
        })
    }
}
