//! Result normalization
//!
//! Backend plugins disagree on payload shape: boxes arrive as
//! `{x1,y1,x2,y2}`, `{x,y,w,h}`, or `[x1,y1,x2,y2]`; confidence hides under
//! `score` or `confidence`; labels and track ids may be inline or in
//! parallel arrays. `normalize` reconciles all of them into one canonical
//! schema without ever failing: a malformed detection is dropped, a
//! malformed payload yields an empty frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::StreamResult;

/// Canonical detection, in absolute overlay pixels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "trackId", skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
}

/// The only shape the overlay renderer ever consumes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NormalizedFrame {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}

/// Normalize one raw backend result into the canonical schema.
///
/// Never mutates the input and always returns a valid (possibly empty)
/// frame. One canonical detection is produced per parseable box; extra
/// boxes beyond the labels/scores arrays render without a label rather
/// than rejecting the whole frame.
pub fn normalize(raw: &StreamResult) -> NormalizedFrame {
    let entries = match detection_entries(&raw.result) {
        Some(entries) => entries,
        None => {
            return NormalizedFrame {
                frame_index: raw.frame_index,
                detections: Vec::new(),
            }
        }
    };

    let labels = string_array(&raw.result, "labels");
    let scores = number_array(&raw.result, "scores");
    let track_ids = int_array(&raw.result, "track_ids");

    let mut detections = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let (x, y, width, height) = match parse_box(entry) {
            Some(b) => b,
            // Missing box: drop the entry, keep the frame
            None => continue,
        };

        let confidence = inline_number(entry, &["score", "confidence"])
            .or_else(|| scores.as_ref().and_then(|s| s.get(i).copied()))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0) as f32;

        let label = inline_string(entry, &["label", "class"])
            .or_else(|| labels.as_ref().and_then(|l| l.get(i).cloned()))
            .unwrap_or_default();

        let track_id = inline_int(entry, &["track_id", "trackId"])
            .or_else(|| track_ids.as_ref().and_then(|t| t.get(i).copied().flatten()));

        detections.push(Detection {
            x,
            y,
            width,
            height,
            label,
            confidence,
            track_id,
        });
    }

    NormalizedFrame {
        frame_index: raw.frame_index,
        detections,
    }
}

/// Locate the per-detection entries inside a plugin payload
fn detection_entries(result: &Value) -> Option<&Vec<Value>> {
    if let Some(list) = result.as_array() {
        return Some(list);
    }
    for key in ["detections", "boxes", "objects"] {
        if let Some(list) = result.get(key).and_then(Value::as_array) {
            return Some(list);
        }
    }
    None
}

/// Interpret one entry as a box, trying each known encoding in turn.
/// Returns `(x, y, width, height)` or `None` when no encoding matches.
fn parse_box(entry: &Value) -> Option<(f32, f32, f32, f32)> {
    if let Some(corners) = entry.as_array() {
        return corner_array(corners);
    }

    let obj = entry.as_object()?;

    if let (Some(x1), Some(y1), Some(x2), Some(y2)) = (
        field_number(entry, "x1"),
        field_number(entry, "y1"),
        field_number(entry, "x2"),
        field_number(entry, "y2"),
    ) {
        return Some((x1, y1, x2 - x1, y2 - y1));
    }

    if let (Some(x), Some(y)) = (field_number(entry, "x"), field_number(entry, "y")) {
        let width = field_number(entry, "w").or_else(|| field_number(entry, "width"));
        let height = field_number(entry, "h").or_else(|| field_number(entry, "height"));
        if let (Some(width), Some(height)) = (width, height) {
            return Some((x, y, width, height));
        }
    }

    // Some plugins nest the geometry under a bbox key
    for key in ["bbox", "box"] {
        if let Some(nested) = obj.get(key) {
            if let Some(parsed) = parse_box(nested) {
                return Some(parsed);
            }
        }
    }

    None
}

fn corner_array(corners: &[Value]) -> Option<(f32, f32, f32, f32)> {
    if corners.len() < 4 {
        return None;
    }
    let x1 = corners[0].as_f64()? as f32;
    let y1 = corners[1].as_f64()? as f32;
    let x2 = corners[2].as_f64()? as f32;
    let y2 = corners[3].as_f64()? as f32;
    Some((x1, y1, x2 - x1, y2 - y1))
}

fn field_number(entry: &Value, key: &str) -> Option<f32> {
    entry.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

fn inline_number(entry: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| entry.get(*k).and_then(Value::as_f64))
}

fn inline_string(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str).map(str::to_string))
}

fn inline_int(entry: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| entry.get(*k).and_then(Value::as_i64))
}

fn string_array(result: &Value, key: &str) -> Option<Vec<String>> {
    let list = result.get(key)?.as_array()?;
    Some(
        list.iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
    )
}

fn number_array(result: &Value, key: &str) -> Option<Vec<f64>> {
    let list = result.get(key)?.as_array()?;
    Some(list.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect())
}

// A non-integer slot means that detection has no track, not a sentinel id
fn int_array(result: &Value, key: &str) -> Option<Vec<Option<i64>>> {
    let list = result.get(key)?.as_array()?;
    Some(list.iter().map(Value::as_i64).collect())
}
