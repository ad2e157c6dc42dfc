//! Overlay rendering contract
//!
//! `render` is a pure function from one canonical frame plus visibility
//! flags to an ordered list of drawing commands; executing them is the
//! caller's concern. Detections draw in array order, so later detections
//! land on top of earlier ones at overlapping coordinates.

use crate::constants::{
    DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, LABEL_MIN_Y, LABEL_OFFSET_PX, RADAR_SCALE,
};
use crate::decode::NormalizedFrame;

/// Independent layer toggles, mutated only by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleLayers {
    pub boxes: bool,
    pub labels: bool,
    pub pitch: bool,
    pub radar: bool,
}

impl Default for VisibleLayers {
    fn default() -> Self {
        Self {
            boxes: true,
            labels: true,
            pitch: false,
            radar: false,
        }
    }
}

/// Overlay surface dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
        }
    }
}

/// One drawing command; the list order is the draw order
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Reset the surface to an empty canvas of the given size.
    /// Always the first command, so "no frame yet" and "zero detections"
    /// both produce a valid empty surface rather than no output.
    Clear { width: u32, height: u32 },
    StrokeRect { x: f32, y: f32, width: f32, height: f32 },
    Label { text: String, x: f32, y: f32 },
    /// Track identity marker, drawn whenever a track id is present
    TrackTag { id: i64, x: f32, y: f32 },
    /// Static field outline for the pitch layer
    PitchOutline { width: u32, height: u32 },
    /// Frame of the corner minimap
    RadarOutline { x: f32, y: f32, width: f32, height: f32 },
    /// One detection center projected into the minimap
    RadarDot { x: f32, y: f32, track_id: Option<i64> },
}

/// Stateless renderer bound to a configured surface size
#[derive(Debug, Clone, Copy)]
pub struct OverlayRenderer {
    canvas: CanvasSize,
}

impl OverlayRenderer {
    pub fn new(canvas: CanvasSize) -> Self {
        Self { canvas }
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Render one frame into drawing commands.
    ///
    /// `frame` is `None` when no result has arrived yet; the output is then
    /// the same explicit empty surface a zero-detection frame produces.
    pub fn render(&self, frame: Option<&NormalizedFrame>, layers: &VisibleLayers) -> Vec<DrawCommand> {
        let mut commands = vec![DrawCommand::Clear {
            width: self.canvas.width,
            height: self.canvas.height,
        }];

        if layers.pitch {
            commands.push(DrawCommand::PitchOutline {
                width: self.canvas.width,
                height: self.canvas.height,
            });
        }

        let radar = layers.radar.then(|| self.radar_rect());
        if let Some(rect) = radar {
            commands.push(DrawCommand::RadarOutline {
                x: rect.0,
                y: rect.1,
                width: rect.2,
                height: rect.3,
            });
        }

        let frame = match frame {
            Some(frame) => frame,
            None => return commands,
        };

        for detection in &frame.detections {
            if layers.boxes {
                commands.push(DrawCommand::StrokeRect {
                    x: detection.x,
                    y: detection.y,
                    width: detection.width,
                    height: detection.height,
                });
            }

            if layers.labels && !detection.label.is_empty() {
                commands.push(DrawCommand::Label {
                    text: format!("{} {:.0}%", detection.label, detection.confidence * 100.0),
                    x: detection.x,
                    // Anchored just above the box, never above the top edge
                    y: (detection.y - LABEL_OFFSET_PX).max(LABEL_MIN_Y),
                });
            }

            // Track identity outranks the classification label and ignores
            // the labels toggle
            if let Some(id) = detection.track_id {
                commands.push(DrawCommand::TrackTag {
                    id,
                    x: detection.x,
                    y: detection.y,
                });
            }

            if let Some(rect) = radar {
                let cx = detection.x + detection.width / 2.0;
                let cy = detection.y + detection.height / 2.0;
                commands.push(DrawCommand::RadarDot {
                    x: rect.0 + (cx / self.canvas.width as f32).clamp(0.0, 1.0) * rect.2,
                    y: rect.1 + (cy / self.canvas.height as f32).clamp(0.0, 1.0) * rect.3,
                    track_id: detection.track_id,
                });
            }
        }

        commands
    }

    /// Minimap rectangle, anchored to the bottom-right corner
    fn radar_rect(&self) -> (f32, f32, f32, f32) {
        let side = self.canvas.width as f32 * RADAR_SCALE;
        (
            self.canvas.width as f32 - side,
            self.canvas.height as f32 - side,
            side,
            side,
        )
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(CanvasSize::default())
    }
}
