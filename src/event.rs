//! Application events exchanged between the controller and its handlers
//!
//! Events are values: a handler consumes the event it was given and returns a
//! new one carrying its result. Nothing mutates an event after it is emitted.

use std::fmt;
use std::path::PathBuf;

use crate::engine::{AssistantOutcome, PendingAction, UserContent};
use crate::voice::AudioClip;

/// Closed set of steps the controller knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Session start: greet the user
    Start,
    /// Turn text into speech
    Synthesize,
    /// Send a user turn to the assistant
    AiInteract,
    /// Resume an assistant run with tool outputs
    AiToolReturn,
    /// Play synthesized speech
    Play,
    /// Wait for a spoken keyword
    Listen,
    /// Begin recording the user's request
    StartRecording,
    /// Finish recording the user's request
    StopRecording,
    /// Trigger a camera snapshot
    UseSnapshot,
    /// Transcribe the recorded request
    Transcribe,
    /// Wait for the snapshot and upload it
    GetSnapshot,
    /// Zapier webhook action
    Zapier,
    /// Leave the run loop
    Exit,
    /// Explicit failure
    Error,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 14] = [
        Self::Start,
        Self::Synthesize,
        Self::AiInteract,
        Self::AiToolReturn,
        Self::Play,
        Self::Listen,
        Self::StartRecording,
        Self::StopRecording,
        Self::UseSnapshot,
        Self::Transcribe,
        Self::GetSnapshot,
        Self::Zapier,
        Self::Exit,
        Self::Error,
    ];

    /// Stable upper-case name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Synthesize => "SYNTHESIZE",
            Self::AiInteract => "AI_INTERACT",
            Self::AiToolReturn => "AI_TOOL_RETURN",
            Self::Play => "PLAY",
            Self::Listen => "LISTEN",
            Self::StartRecording => "START_RECORDING",
            Self::StopRecording => "STOP_RECORDING",
            Self::UseSnapshot => "USE_SNAPSHOT",
            Self::Transcribe => "TRANSCRIBE",
            Self::GetSnapshot => "GET_SNAPSHOT",
            Self::Zapier => "ZAPIER",
            Self::Exit => "EXIT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Not processed yet
    Init,
    /// Handler finished successfully
    Success,
    /// Handler failed; see [`Event::error`]
    Error,
}

/// Data carried in an event's request or result slot
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// Nothing
    #[default]
    Empty,
    /// Plain text (greeting, transcription, detected phrase, tool output)
    Text(String),
    /// Synthesized speech
    Audio(AudioClip),
    /// Path to a recorded audio file
    Recording(PathBuf),
    /// User turn for the assistant
    Content(UserContent),
    /// Result of an assistant turn
    Outcome(AssistantOutcome),
    /// Tool batch (resolved or not) for the assistant
    Action(PendingAction),
    /// Arguments for a single tool invocation
    Arguments(serde_json::Value),
    /// Uploaded snapshot reference, if the snapshot succeeded
    Image(Option<String>),
}

impl Payload {
    /// Borrow the text, if this payload is text
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether the slot is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A unit of work for the controller
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    status: EventStatus,
    request: Payload,
    result: Payload,
    error: Option<String>,
}

impl Event {
    /// Create an unprocessed event with no request
    #[must_use]
    pub const fn new(kind: EventKind) -> Self {
        Self::with_request(kind, Payload::Empty)
    }

    /// Create an unprocessed event with a request payload
    #[must_use]
    pub const fn with_request(kind: EventKind, request: Payload) -> Self {
        Self {
            kind,
            status: EventStatus::Init,
            request,
            result: Payload::Empty,
            error: None,
        }
    }

    /// Consume this event and emit its successful successor
    #[must_use]
    pub fn succeed(self, result: Payload) -> Self {
        Self {
            status: EventStatus::Success,
            result,
            error: None,
            ..self
        }
    }

    /// Consume this event and emit its failed successor
    #[must_use]
    pub fn fail(self, error: impl fmt::Display) -> Self {
        Self {
            status: EventStatus::Error,
            result: Payload::Empty,
            error: Some(error.to_string()),
            ..self
        }
    }

    /// Event kind
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Processing status
    #[must_use]
    pub const fn status(&self) -> EventStatus {
        self.status
    }

    /// Request payload
    #[must_use]
    pub const fn request(&self) -> &Payload {
        &self.request
    }

    /// Result payload
    #[must_use]
    pub const fn result(&self) -> &Payload {
        &self.result
    }

    /// Take ownership of the result payload
    #[must_use]
    pub fn into_result(self) -> Payload {
        self.result
    }

    /// Error message, when the status is [`EventStatus::Error`]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the handler failed
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == EventStatus::Error
    }
}
