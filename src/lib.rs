//! Heddy - event-driven voice assistant
//!
//! This library provides the core of the assistant:
//! - Event loop controller (listen, record, transcribe, respond)
//! - Conversation session with idle expiry
//! - Assistant turns with tool calls and snapshot attachments
//! - Voice, camera, and backend collaborators
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Controller                        │
//! │   START → SYNTHESIZE → PLAY → LISTEN → ...          │
//! └───────┬───────────────┬──────────────────┬──────────┘
//!         │               │                  │
//! ┌───────▼──────┐ ┌──────▼───────┐ ┌────────▼────────┐
//! │ Interaction  │ │   Capture    │ │      Tool       │
//! │   Engine     │ │ Coordinator  │ │   Dispatcher    │
//! └───────┬──────┘ └──────┬───────┘ └────────┬────────┘
//!         │               │                  │
//! ┌───────▼──────┐ ┌──────▼───────┐ ┌────────▼────────┐
//! │   Session    │ │ Camera/Vision│ │     Webhook     │
//! └──────────────┘ └──────────────┘ └─────────────────┘
//! ```

pub mod backend;
pub mod capture;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod event;
pub mod session;
pub mod tools;
pub mod voice;

pub use capture::CaptureCoordinator;
pub use config::Config;
pub use controller::{Controller, Step, VoiceIo};
pub use engine::{
    AssistantOutcome, InteractionEngine, OutcomeStatus, PendingAction, ToolCall, TurnPhase,
    UserContent,
};
pub use error::{Error, Result};
pub use event::{Event, EventKind, EventStatus, Payload};
pub use session::{Session, TurnTicket};
pub use tools::ToolDispatcher;
