//! Conversational, vision, and webhook backends
//!
//! Each backend is a trait so the engine and controller can be driven by the
//! real HTTP clients or by scripted fakes.

mod openai;
mod sse;
mod webhook;

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

pub use openai::{OPENAI_API_URL, OpenAiAssistant};
pub use sse::{SseEvent, SseParser};
pub use webhook::ZapierWebhook;

use crate::Result;

/// Incremental events of one assistant run, in delivery order
pub type RunStream = BoxStream<'static, Result<RunEvent>>;

/// One event from a streaming run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A fragment of assistant text
    TextDelta(String),
    /// The run finished
    Completed,
    /// The run failed, was cancelled, or expired
    Failed(String),
    /// The run is paused until tool outputs are submitted
    RequiresAction(RequiredAction),
    /// Any event this client does not act on
    Other(String),
}

/// Tool calls requested by a paused run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredAction {
    /// Run waiting for outputs
    pub run_id: String,
    /// Thread the run belongs to
    pub thread_id: String,
    /// Requested function calls
    pub calls: Vec<RequestedCall>,
}

/// A single function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedCall {
    /// Backend identifier of the call
    pub id: String,
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Output reported back for one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    /// Call being answered
    pub tool_call_id: String,
    /// Output text
    pub output: String,
}

/// One part of a user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text part
    Text {
        /// The text
        text: String,
    },
    /// Previously uploaded image
    ImageFile {
        /// Uploaded file reference
        image_file: ImageFileRef,
    },
}

/// Reference to an uploaded image file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFileRef {
    /// Backend file identifier
    pub file_id: String,
    /// Requested detail level
    pub detail: String,
}

/// Client for the conversational assistant service
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Create a new conversation thread and return its identifier
    async fn create_thread(&self) -> Result<String>;

    /// Append one user message (possibly multi-part) to a thread
    async fn append_message(&self, thread_id: &str, content: &[ContentPart]) -> Result<()>;

    /// Start a streaming run of the assistant on a thread
    async fn start_stream(&self, thread_id: &str, assistant_id: &str) -> Result<RunStream>;

    /// Submit tool outputs to a paused run and stream the continuation
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunStream>;
}

/// Uploads snapshots for vision input
#[async_trait]
pub trait VisionUploader: Send + Sync {
    /// Upload an image file and return its remote reference
    async fn upload(&self, path: &Path) -> Result<String>;
}

/// Posts JSON payloads to external action webhooks
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// POST `payload` to `url` and return the response status code
    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<u16>;
}
