//! Interaction engine
//!
//! Drives one conversational turn against the assistant backend: claim the
//! session thread, append the user's message, stream the run, and fold the
//! stream into a single [`AssistantOutcome`]. A run that pauses for tool calls
//! leaves the session busy until [`InteractionEngine::resume`] or
//! [`InteractionEngine::abandon`] finishes the turn.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde_json::Value;

use crate::backend::{
    AssistantBackend, ContentPart, ImageFileRef, RequiredAction, RunEvent, RunStream, ToolOutput,
};
use crate::event::EventKind;
use crate::session::{Session, TurnTicket};
use crate::{Error, Result};

/// Detail level requested for attached snapshots
const IMAGE_DETAIL: &str = "high";

/// Map an assistant function name to the event that performs it
#[must_use]
pub fn tool_kind_for(function_name: &str) -> Option<EventKind> {
    match function_name {
        "send_text_message" => Some(EventKind::Zapier),
        _ => None,
    }
}

/// What the user said, optionally with a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserContent {
    /// Transcribed request
    pub text: String,
    /// Uploaded snapshot reference
    pub image: Option<String>,
}

impl UserContent {
    /// Text-only content
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    /// Attach a snapshot reference
    #[must_use]
    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    /// Message parts: the text, then the image if one is attached
    #[must_use]
    pub fn to_parts(&self) -> Vec<ContentPart> {
        let mut parts = vec![ContentPart::Text {
            text: self.text.clone(),
        }];

        if let Some(file_id) = &self.image {
            parts.push(ContentPart::ImageFile {
                image_file: ImageFileRef {
                    file_id: file_id.clone(),
                    detail: IMAGE_DETAIL.to_string(),
                },
            });
        }

        parts
    }
}

/// A function call requested by the assistant
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Event that performs the call
    pub kind: EventKind,
    /// Call arguments (an object, or a string holding JSON)
    pub arguments: Value,
    /// Backend identifier of the call
    pub call_id: String,
    /// Output, once resolved
    pub output: Option<String>,
}

/// Tool calls a paused run is waiting on
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Paused run
    pub run_id: String,
    /// Thread the run belongs to
    pub thread_id: String,
    /// Requested calls, in the order the assistant listed them
    pub calls: Vec<ToolCall>,
}

impl PendingAction {
    /// Whether every call has an output
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.calls.iter().all(|call| call.output.is_some())
    }

    /// Outputs to submit back to the run
    ///
    /// # Errors
    ///
    /// Returns error if any call is still unresolved
    pub fn tool_outputs(&self) -> Result<Vec<ToolOutput>> {
        self.calls
            .iter()
            .map(|call| {
                call.output
                    .clone()
                    .map(|output| ToolOutput {
                        tool_call_id: call.call_id.clone(),
                        output,
                    })
                    .ok_or_else(|| {
                        Error::BackendStream(format!("tool call {} has no output", call.call_id))
                    })
            })
            .collect()
    }

    fn from_required(action: RequiredAction, fallback_thread: &str) -> Result<Self> {
        let calls = action
            .calls
            .into_iter()
            .map(|call| {
                let kind = tool_kind_for(&call.name)
                    .ok_or_else(|| Error::UnsupportedToolFunction(call.name.clone()))?;
                let arguments = serde_json::from_str(&call.arguments)
                    .unwrap_or(Value::String(call.arguments));
                Ok(ToolCall {
                    kind,
                    arguments,
                    call_id: call.id,
                    output: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let thread_id = if action.thread_id.is_empty() {
            fallback_thread.to_string()
        } else {
            action.thread_id
        };

        Ok(Self {
            run_id: action.run_id,
            thread_id,
            calls,
        })
    }
}

/// Status of a finished (or paused) turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The run completed
    Success,
    /// The run failed
    Error,
    /// The run is waiting on tool calls
    ActionRequired,
}

/// Result of one assistant turn
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantOutcome {
    /// How the turn ended
    pub status: OutcomeStatus,
    /// Assistant text, in delivery order
    pub response: String,
    /// Calls to resolve when the status is [`OutcomeStatus::ActionRequired`]
    pub pending_action: Option<PendingAction>,
    /// Failure reason when the status is [`OutcomeStatus::Error`]
    pub error: Option<String>,
}

impl AssistantOutcome {
    fn success(response: String) -> Self {
        Self {
            status: OutcomeStatus::Success,
            response,
            pending_action: None,
            error: None,
        }
    }

    fn failure(response: String, error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            response,
            pending_action: None,
            error: Some(error.into()),
        }
    }

    fn action_required(response: String, action: PendingAction) -> Self {
        Self {
            status: OutcomeStatus::ActionRequired,
            response,
            pending_action: Some(action),
            error: None,
        }
    }
}

/// Where the current turn is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn running
    Idle,
    /// Claiming the thread and appending the message
    Sending,
    /// Reading the run stream
    Streaming,
    /// Run completed
    Completed,
    /// Run failed
    Failed,
    /// Run paused for tool calls
    ActionRequired,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::ActionRequired => "action_required",
        };
        f.write_str(name)
    }
}

/// How a run stream ended
enum StreamEnd {
    Completed,
    Failed(String),
    ActionRequired(RequiredAction),
}

/// Text gathered while folding a run stream
#[derive(Default)]
struct TurnAccumulator {
    response: String,
    ignored: usize,
}

struct TurnState {
    phase: TurnPhase,
    /// Ticket of a turn paused for tool calls
    paused: Option<TurnTicket>,
}

/// Runs assistant turns on the session thread
pub struct InteractionEngine {
    backend: Arc<dyn AssistantBackend>,
    session: Session,
    assistant_id: String,
    turn: Mutex<TurnState>,
}

impl InteractionEngine {
    /// Create an engine for `assistant_id`
    #[must_use]
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        session: Session,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            session,
            assistant_id: assistant_id.into(),
            turn: Mutex::new(TurnState {
                phase: TurnPhase::Idle,
                paused: None,
            }),
        }
    }

    fn turn(&self) -> MutexGuard<'_, TurnState> {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: TurnPhase) {
        self.turn().phase = phase;
        tracing::debug!(phase = %phase, "turn phase");
    }

    /// Current phase of the turn
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.turn().phase
    }

    /// Send user content and run the assistant
    ///
    /// Stream failures are reported in the outcome; only failures before the
    /// run starts are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionBusy`] or [`Error::ThreadCreateFailed`] from the
    /// session, [`Error::SessionExpiredDuringTurn`] if the thread expires
    /// mid-turn, [`Error::UnsupportedToolFunction`] for unknown calls, or the
    /// backend error when the message cannot be appended.
    pub async fn interact(&self, content: &UserContent) -> Result<AssistantOutcome> {
        let ticket = self.session.begin_turn(self.backend.as_ref()).await?;
        self.session.mark_in_progress();
        self.set_phase(TurnPhase::Sending);

        tracing::info!(
            thread_id = %ticket.thread_id(),
            with_image = content.image.is_some(),
            "sending user message"
        );

        let result = self.send(&ticket, content).await;
        self.settle(ticket, result)
    }

    /// Submit resolved tool outputs and continue the paused run
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpiredDuringTurn`] if no turn is paused on the
    /// action's thread or the thread expired, or an error if the action has
    /// unresolved calls.
    pub async fn resume(&self, action: &PendingAction) -> Result<AssistantOutcome> {
        let ticket = self
            .turn()
            .paused
            .take()
            .filter(|ticket| ticket.thread_id() == action.thread_id);

        let Some(ticket) = ticket else {
            self.session.mark_done();
            self.set_phase(TurnPhase::Failed);
            return Err(Error::SessionExpiredDuringTurn);
        };

        self.set_phase(TurnPhase::Sending);
        tracing::info!(
            thread_id = %action.thread_id,
            run_id = %action.run_id,
            calls = action.calls.len(),
            "submitting tool outputs"
        );

        let result = self.submit(&ticket, action).await;
        self.settle(ticket, result)
    }

    /// Give up on a turn paused for tool calls
    pub fn abandon(&self) {
        if self.turn().paused.take().is_some() {
            tracing::info!("abandoning paused turn");
        }
        self.session.mark_done();
        self.set_phase(TurnPhase::Failed);
    }

    async fn send(&self, ticket: &TurnTicket, content: &UserContent) -> Result<StreamOutcome> {
        self.session.check(ticket)?;
        self.backend
            .append_message(ticket.thread_id(), &content.to_parts())
            .await?;

        self.session.check(ticket)?;
        let stream = self
            .backend
            .start_stream(ticket.thread_id(), &self.assistant_id)
            .await;

        Ok(self.consume(stream).await)
    }

    async fn submit(&self, ticket: &TurnTicket, action: &PendingAction) -> Result<StreamOutcome> {
        let outputs = action.tool_outputs()?;

        self.session.check(ticket)?;
        let stream = self
            .backend
            .submit_tool_outputs(&action.thread_id, &action.run_id, &outputs)
            .await;

        Ok(self.consume(stream).await)
    }

    async fn consume(&self, stream: Result<RunStream>) -> StreamOutcome {
        match stream {
            Ok(stream) => {
                self.set_phase(TurnPhase::Streaming);
                fold_run(stream).await
            }
            Err(e) => StreamOutcome {
                response: String::new(),
                end: StreamEnd::Failed(e.to_string()),
            },
        }
    }

    /// Turn a folded stream into an outcome and update the session
    fn settle(&self, ticket: TurnTicket, result: Result<StreamOutcome>) -> Result<AssistantOutcome> {
        let folded = match result {
            Ok(folded) => folded,
            Err(e) => {
                tracing::warn!(error = %e, "turn failed before streaming");
                self.session.mark_done();
                self.set_phase(TurnPhase::Failed);
                return Err(e);
            }
        };

        match folded.end {
            StreamEnd::Completed => {
                self.session.mark_done();
                self.set_phase(TurnPhase::Completed);
                tracing::info!(chars = folded.response.len(), "assistant run completed");
                Ok(AssistantOutcome::success(folded.response))
            }
            StreamEnd::Failed(reason) => {
                self.session.mark_done();
                self.set_phase(TurnPhase::Failed);
                tracing::warn!(error = %reason, "assistant run failed");
                Ok(AssistantOutcome::failure(folded.response, reason))
            }
            StreamEnd::ActionRequired(required) => {
                let action = match PendingAction::from_required(required, ticket.thread_id()) {
                    Ok(action) => action,
                    Err(e) => {
                        self.session.mark_done();
                        self.set_phase(TurnPhase::Failed);
                        return Err(e);
                    }
                };

                tracing::info!(
                    run_id = %action.run_id,
                    calls = action.calls.len(),
                    "assistant run requires action"
                );

                let mut turn = self.turn();
                turn.paused = Some(ticket);
                turn.phase = TurnPhase::ActionRequired;
                drop(turn);

                Ok(AssistantOutcome::action_required(folded.response, action))
            }
        }
    }
}

struct StreamOutcome {
    response: String,
    end: StreamEnd,
}

/// Fold a run stream until its first terminal event
async fn fold_run(mut stream: RunStream) -> StreamOutcome {
    let mut acc = TurnAccumulator::default();

    let end = loop {
        match stream.next().await {
            Some(Ok(RunEvent::TextDelta(text))) => acc.response.push_str(&text),
            Some(Ok(RunEvent::Completed)) => break StreamEnd::Completed,
            Some(Ok(RunEvent::Failed(reason))) => break StreamEnd::Failed(reason),
            Some(Ok(RunEvent::RequiresAction(action))) => break StreamEnd::ActionRequired(action),
            Some(Ok(RunEvent::Other(name))) => {
                acc.ignored += 1;
                tracing::trace!(event = %name, "ignoring run event");
            }
            Some(Err(e)) => break StreamEnd::Failed(e.to_string()),
            None => break StreamEnd::Failed("run stream ended unexpectedly".to_string()),
        }
    };

    if acc.ignored > 0 {
        tracing::debug!(ignored = acc.ignored, "run events ignored");
    }

    StreamOutcome {
        response: acc.response,
        end,
    }
}
