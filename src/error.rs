//! Error types for Heddy

use thiserror::Error;

use crate::event::EventKind;

/// Result type alias for Heddy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A turn is already in progress on the conversation thread
    #[error("session busy: previous interaction still in progress")]
    SessionBusy,

    /// The backend refused to create a conversation thread
    #[error("failed to create conversation thread: {0}")]
    ThreadCreateFailed(String),

    /// The idle timer cleared the thread while a turn was using it
    #[error("session expired during turn")]
    SessionExpiredDuringTurn,

    /// A snapshot capture is already in flight
    #[error("a snapshot capture is already pending")]
    CaptureAlreadyPending,

    /// The snapshot did not complete in time
    #[error("snapshot capture timed out after {0:?}")]
    CaptureTimeout(std::time::Duration),

    /// An external action (webhook) answered with a non-2xx status
    #[error("external action failed with status {status_code}")]
    ExternalActionFailed {
        /// HTTP status code returned by the action backend
        status_code: u16,
    },

    /// The backend asked for a function this client does not provide
    #[error("unsupported tool function: {0}")]
    UnsupportedToolFunction(String),

    /// Tool arguments did not match the action's schema
    #[error("invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Conversational backend error (request or stream)
    #[error("backend stream error: {0}")]
    BackendStream(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Camera subprocess error
    #[error("camera error: {0}")]
    Camera(String),

    /// Image upload error
    #[error("upload error: {0}")]
    Upload(String),

    /// An event reached the controller with status ERROR
    #[error("{kind} failed: {message}")]
    Aborted {
        /// Kind of the failed event
        kind: EventKind,
        /// Error message carried by the event
        message: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
