//! Backend error classification
//!
//! Maps the closed set of backend error codes to a user-facing message and
//! a recoverability verdict. Recoverable codes refer to a single bad frame
//! and leave the session connected; fatal codes end the session, and the
//! UI's retry action is disconnect-then-connect, never a silent resend.

use crate::protocol::{ErrorCode, ErrorEvent};

/// Fallback when an unknown code arrives without detail text
const GENERIC_MESSAGE: &str = "An unknown streaming error occurred.";

/// Recoverability verdict for one error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// One bad frame; the session may stay connected
    Recoverable,
    /// The session moves to the error state
    Fatal,
}

/// An error ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    /// Backend code, absent for client-side (transport) failures
    pub code: Option<ErrorCode>,
    pub message: String,
    pub severity: Severity,
}

impl ClassifiedError {
    /// Error reported by the backend
    pub fn backend(code: ErrorCode, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
            severity,
        }
    }

    /// Client-side failure (connect failure, unexpected disconnect);
    /// always session-fatal
    pub fn session(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            severity: Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Classify one backend error event
pub fn classify(event: &ErrorEvent) -> ClassifiedError {
    let (message, severity) = match event.code {
        ErrorCode::InvalidPipeline => (
            "The selected pipeline is not available.".to_string(),
            Severity::Fatal,
        ),
        ErrorCode::PipelineFailure => (
            "The pipeline failed while processing the stream.".to_string(),
            Severity::Fatal,
        ),
        ErrorCode::InternalError => (
            "The streaming service hit an internal error.".to_string(),
            Severity::Fatal,
        ),
        ErrorCode::InvalidFrame => (
            "The pipeline could not decode the last frame.".to_string(),
            Severity::Recoverable,
        ),
        ErrorCode::FrameTooLarge => (
            "The submitted frame exceeds the pipeline's size limit.".to_string(),
            Severity::Recoverable,
        ),
        ErrorCode::InvalidMessage => (
            "The pipeline rejected a malformed message.".to_string(),
            Severity::Recoverable,
        ),
        ErrorCode::Unknown => (
            event
                .detail
                .clone()
                .unwrap_or_else(|| GENERIC_MESSAGE.to_string()),
            Severity::Fatal,
        ),
    };

    ClassifiedError::backend(event.code, message, severity)
}
