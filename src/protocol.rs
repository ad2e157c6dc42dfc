//! Streaming wire contract
//!
//! Message-oriented, order-preserving, one active pipeline per session.
//! Outbound messages are JSON text frames; inbound messages are classified
//! at a single dispatch point into exactly one of result, error,
//! backpressure notice, or malformed.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Client-to-server messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One captured frame bound for the active pipeline
    Frame {
        pipeline_id: String,
        frame_index: u64,
        /// Base64-encoded raster payload, as produced by the frame source
        payload: String,
    },
}

impl ClientMessage {
    /// Build a frame message from raw payload bytes
    pub fn frame(pipeline_id: &str, frame_index: u64, payload: &Bytes) -> Self {
        Self::Frame {
            pipeline_id: pipeline_id.to_string(),
            frame_index,
            payload: base64::engine::general_purpose::STANDARD.encode(payload),
        }
    }

    /// Serialize to the JSON text sent over the transport
    pub fn to_text(&self) -> String {
        // Serialization of these variants cannot fail
        serde_json::to_string(self).expect("client message serialization")
    }
}

/// Raw result payload from the backend, tagged with a server-assigned
/// frame index. The `result` shape depends on which plugin produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamResult {
    pub frame_index: u64,
    pub result: serde_json::Value,
}

/// Closed set of backend error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidPipeline,
    InvalidFrame,
    FrameTooLarge,
    InvalidMessage,
    PipelineFailure,
    InternalError,
    /// Parse bucket for codes this client does not know
    #[serde(other)]
    Unknown,
}

/// Error message from the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEvent {
    #[serde(rename = "error")]
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Advisory notices carry no frame index and no result
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Notice {
    SlowDown,
}

/// One inbound message, classified
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A detection result for one frame
    Result(StreamResult),
    /// A backend-reported error
    Error(ErrorEvent),
    /// Cooperative backpressure notice: reduce the submission rate
    SlowDown,
    /// Anything that does not conform to the wire contract; ignored
    Malformed,
}

/// Classify one inbound text frame.
///
/// Interpretations are tried in order: error, result, notice. A message
/// matching none of them is malformed and must not advance any state.
pub fn classify(text: &str) -> InboundMessage {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return InboundMessage::Malformed,
    };
    if !value.is_object() {
        return InboundMessage::Malformed;
    }

    if value.get("error").is_some() {
        return match serde_json::from_value::<ErrorEvent>(value) {
            Ok(event) => InboundMessage::Error(event),
            Err(_) => InboundMessage::Malformed,
        };
    }

    if value.get("frame_index").is_some() {
        return match serde_json::from_value::<StreamResult>(value) {
            Ok(result) => InboundMessage::Result(result),
            Err(_) => InboundMessage::Malformed,
        };
    }

    match serde_json::from_value::<Notice>(value) {
        Ok(Notice::SlowDown) => InboundMessage::SlowDown,
        Err(_) => InboundMessage::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_message_shape() {
        let msg = ClientMessage::frame("yolo-v8", 7, &Bytes::from_static(b"\xff\xd8"));
        let text = msg.to_text();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "frame");
        assert_eq!(value["pipeline_id"], "yolo-v8");
        assert_eq!(value["frame_index"], 7);
        assert_eq!(value["payload"], "/9g=");
    }

    #[test]
    fn test_classify_result() {
        let msg = classify(r#"{"frame_index":3,"result":{"detections":[]}}"#);
        match msg {
            InboundMessage::Result(r) => assert_eq!(r.frame_index, 3),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_with_detail() {
        let msg = classify(r#"{"error":"invalid_pipeline","detail":"no such id"}"#);
        match msg {
            InboundMessage::Error(e) => {
                assert_eq!(e.code, ErrorCode::InvalidPipeline);
                assert_eq!(e.detail.as_deref(), Some("no such id"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_unknown_error_code() {
        let msg = classify(r#"{"error":"quota_exceeded","detail":"monthly cap"}"#);
        match msg {
            InboundMessage::Error(e) => assert_eq!(e.code, ErrorCode::Unknown),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_slow_down() {
        assert_eq!(classify(r#"{"type":"slow_down"}"#), InboundMessage::SlowDown);
    }

    #[test]
    fn test_classify_malformed() {
        assert_eq!(classify("not json"), InboundMessage::Malformed);
        assert_eq!(classify("[1,2,3]"), InboundMessage::Malformed);
        assert_eq!(classify(r#"{"type":"speed_up"}"#), InboundMessage::Malformed);
        // A result without a result body does not count as a result
        assert_eq!(classify(r#"{"frame_index":1}"#), InboundMessage::Malformed);
        // A negative frame index does not conform
        assert_eq!(
            classify(r#"{"frame_index":-1,"result":{}}"#),
            InboundMessage::Malformed
        );
    }
}
