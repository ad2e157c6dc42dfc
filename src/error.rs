//! Error types for the streaming client

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Preferences error: {0}")]
    Prefs(#[from] PrefsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Pipeline id is empty")]
    EmptyPipelineId,

    #[error("Already connected to pipeline {0}; disconnect first")]
    AlreadyConnected(String),

    #[error("Not connected")]
    NotConnected,
}

/// Transport-level errors; all of these are session-fatal
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed unexpectedly")]
    Closed,
}

/// Preference store errors
#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("No writable config directory on this platform")]
    NoConfigDir,

    #[error("Failed to read preferences: {0}")]
    ReadFailed(String),

    #[error("Failed to write preferences: {0}")]
    WriteFailed(String),

    #[error("Malformed preferences file: {0}")]
    Malformed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
