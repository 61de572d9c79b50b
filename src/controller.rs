//! Event loop controller
//!
//! A trampoline over [`Event`]s: each event goes to exactly one handler, the
//! handler's result event comes back here, and [`Controller::next_event`]
//! decides what runs next. The loop ends on `EXIT` and aborts on the first
//! event that comes back with status `ERROR`.

use std::sync::Arc;

use crate::capture::CaptureCoordinator;
use crate::engine::{AssistantOutcome, InteractionEngine, OutcomeStatus, UserContent};
use crate::event::{Event, EventKind, Payload};
use crate::tools::ToolDispatcher;
use crate::voice::{AudioPlayer, Recorder, SoundEffect, Synthesizer, Transcriber, WordDetector};
use crate::{Error, Result};

/// Greeting spoken on `START`
pub const DEFAULT_GREETING: &str = "Hello! How can I assist you today?";

/// Keyword that starts recording a request
const KEYWORD_RECORD: &str = "computer";
/// Keyword that takes a snapshot for the next request
const KEYWORD_SNAPSHOT: &str = "snapshot";
/// Keyword that ends the recording
const KEYWORD_REPLY: &str = "reply";

/// Audio collaborators driven by the controller
#[derive(Clone)]
pub struct VoiceIo {
    /// Speech-to-text
    pub transcriber: Arc<dyn Transcriber>,
    /// Text-to-speech
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Speaker output
    pub player: Arc<dyn AudioPlayer>,
    /// Request recorder
    pub recorder: Arc<dyn Recorder>,
    /// Keyword listener
    pub detector: Arc<dyn WordDetector>,
}

/// Choose the next event for a heard phrase
///
/// `recording` is whether a request is currently being recorded.
#[must_use]
pub fn route_phrase(phrase: &str, recording: bool) -> EventKind {
    let phrase = phrase.to_lowercase();

    if phrase.contains(KEYWORD_RECORD) && !recording {
        EventKind::StartRecording
    } else if phrase.contains(KEYWORD_SNAPSHOT) {
        EventKind::UseSnapshot
    } else if phrase.contains(KEYWORD_REPLY) && recording {
        EventKind::StopRecording
    } else {
        EventKind::Listen
    }
}

/// Sequences the assistant's steps
pub struct Controller {
    voice: VoiceIo,
    engine: InteractionEngine,
    capture: CaptureCoordinator,
    tools: ToolDispatcher,
    greeting: String,
    recording: bool,
    pending_image: Option<String>,
}

impl Controller {
    /// Create a controller
    #[must_use]
    pub fn new(
        voice: VoiceIo,
        engine: InteractionEngine,
        capture: CaptureCoordinator,
        tools: ToolDispatcher,
    ) -> Self {
        Self {
            voice,
            engine,
            capture,
            tools,
            greeting: DEFAULT_GREETING.to_string(),
            recording: false,
            pending_image: None,
        }
    }

    /// Replace the greeting spoken on `START`
    #[must_use]
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Whether a request is being recorded
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Snapshot waiting to be attached to the next request
    #[must_use]
    pub fn pending_image(&self) -> Option<&str> {
        self.pending_image.as_deref()
    }

    /// Run events until `EXIT`, returning the processed `EXIT` event
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] for the first event that fails
    pub async fn run(&mut self, start: Event) -> Result<Event> {
        let mut event = start;
        loop {
            match self.step(event).await? {
                Step::Next(next) => event = next,
                Step::Exit(done) => return Ok(done),
            }
        }
    }

    /// Process one event and decide the next
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] if the event failed
    pub async fn step(&mut self, event: Event) -> Result<Step> {
        tracing::debug!(kind = %event.kind(), "processing event");

        let processed = self.process_event(event).await;
        if processed.is_error() {
            return Err(aborted(&processed));
        }
        if processed.kind() == EventKind::Exit {
            tracing::info!("event loop exiting");
            return Ok(Step::Exit(processed));
        }

        self.next_event(processed).await.map(Step::Next)
    }

    /// Hand an event to its handler and return the result event
    pub async fn process_event(&mut self, event: Event) -> Event {
        let result = match event.kind() {
            EventKind::Start => Ok(self.handle_start()),
            EventKind::Synthesize => self.handle_synthesize(&event).await,
            EventKind::Play => self.handle_play(&event).await,
            EventKind::Listen => self.handle_listen().await,
            EventKind::StartRecording => self.handle_start_recording(),
            EventKind::StopRecording => self.handle_stop_recording(),
            EventKind::Transcribe => self.handle_transcribe(&event).await,
            EventKind::UseSnapshot => self.handle_use_snapshot(),
            EventKind::GetSnapshot => Ok(self.handle_get_snapshot().await),
            EventKind::AiInteract | EventKind::AiToolReturn => self.handle_interact(&event).await,
            EventKind::Zapier => self.handle_tool(&event).await,
            EventKind::Exit => Ok(Payload::Empty),
            EventKind::Error => Err(Error::Aborted {
                kind: EventKind::Error,
                message: event.error().unwrap_or("explicit error event").to_string(),
            }),
        };

        match result {
            Ok(payload) => event.succeed(payload),
            Err(e) => {
                tracing::warn!(kind = %event.kind(), error = %e, "handler failed");
                event.fail(e)
            }
        }
    }

    /// Build the event that follows a processed one
    ///
    /// # Errors
    ///
    /// Returns error if a tool batch fails, or if the event carries a result
    /// its kind never produces.
    pub async fn next_event(&mut self, processed: Event) -> Result<Event> {
        let kind = processed.kind();
        let next = match (kind, processed.into_result()) {
            (EventKind::Start, _) => {
                Event::with_request(EventKind::Synthesize, Payload::Text(self.greeting.clone()))
            }
            (EventKind::Synthesize, Payload::Audio(clip)) => {
                Event::with_request(EventKind::Play, Payload::Audio(clip))
            }
            (
                EventKind::Play
                | EventKind::StartRecording
                | EventKind::GetSnapshot,
                _,
            ) => Event::new(EventKind::Listen),
            (EventKind::Listen, Payload::Text(phrase)) => {
                let next = route_phrase(&phrase, self.recording);
                tracing::info!(phrase = %phrase, next = %next, "routing phrase");
                Event::new(next)
            }
            (EventKind::StopRecording, Payload::Recording(path)) => {
                Event::with_request(EventKind::Transcribe, Payload::Recording(path))
            }
            (EventKind::Transcribe, Payload::Text(text)) => {
                if text.trim().is_empty() {
                    tracing::info!("empty transcription, listening again");
                    Event::new(EventKind::Listen)
                } else {
                    let content = UserContent::text(text).with_image(self.pending_image.take());
                    Event::with_request(EventKind::AiInteract, Payload::Content(content))
                }
            }
            (EventKind::UseSnapshot, _) => Event::new(EventKind::GetSnapshot),
            (EventKind::AiInteract | EventKind::AiToolReturn, Payload::Outcome(outcome)) => {
                self.after_outcome(outcome).await?
            }
            (EventKind::Zapier | EventKind::Exit, _) => Event::new(EventKind::Exit),
            (kind, result) => {
                return Err(Error::Aborted {
                    kind,
                    message: format!("unexpected result {result:?}"),
                });
            }
        };

        Ok(next)
    }

    /// Continue after an assistant turn
    ///
    /// A paused run resolves its whole tool batch here, before the
    /// `AI_TOOL_RETURN` event exists.
    async fn after_outcome(&self, outcome: AssistantOutcome) -> Result<Event> {
        match (outcome.status, outcome.pending_action) {
            (OutcomeStatus::ActionRequired, Some(action)) => {
                match self.tools.dispatch_batch(&action).await {
                    Ok(resolved) => Ok(Event::with_request(
                        EventKind::AiToolReturn,
                        Payload::Action(resolved),
                    )),
                    Err(e) => {
                        self.engine.abandon();
                        Err(Error::Aborted {
                            kind: EventKind::AiToolReturn,
                            message: e.to_string(),
                        })
                    }
                }
            }
            (OutcomeStatus::Success, _) if outcome.response.trim().is_empty() => {
                tracing::info!("assistant returned no text");
                Ok(Event::new(EventKind::Listen))
            }
            (OutcomeStatus::Success, _) => Ok(Event::with_request(
                EventKind::Synthesize,
                Payload::Text(outcome.response),
            )),
            (status, _) => Err(Error::Aborted {
                kind: EventKind::AiInteract,
                message: outcome
                    .error
                    .unwrap_or_else(|| format!("unexpected outcome {status:?}")),
            }),
        }
    }

    fn handle_start(&self) -> Payload {
        tracing::info!("assistant starting");
        self.voice.player.play_sound(SoundEffect::Listening);
        Payload::Empty
    }

    async fn handle_synthesize(&self, event: &Event) -> Result<Payload> {
        let text = expect_text(event)?;
        tracing::debug!(text, "synthesizing");
        let clip = self.voice.synthesizer.synthesize(text).await?;
        Ok(Payload::Audio(clip))
    }

    async fn handle_play(&self, event: &Event) -> Result<Payload> {
        let Payload::Audio(clip) = event.request() else {
            return Err(unexpected_request(event));
        };
        self.voice.player.play(clip).await?;
        Ok(Payload::Empty)
    }

    async fn handle_listen(&self) -> Result<Payload> {
        let phrase = self.voice.detector.listen().await?;
        Ok(Payload::Text(phrase))
    }

    fn handle_start_recording(&mut self) -> Result<Payload> {
        self.voice.player.play_sound(SoundEffect::StartRecording);
        self.voice.recorder.start()?;
        self.recording = true;
        Ok(Payload::Empty)
    }

    fn handle_stop_recording(&mut self) -> Result<Payload> {
        self.voice.player.play_sound(SoundEffect::Respond);
        self.recording = false;
        let path = self.voice.recorder.stop()?;
        self.voice.detector.clear();
        Ok(Payload::Recording(path))
    }

    async fn handle_transcribe(&self, event: &Event) -> Result<Payload> {
        let Payload::Recording(path) = event.request() else {
            return Err(unexpected_request(event));
        };
        let text = self.voice.transcriber.transcribe(path).await?;
        tracing::info!(text = %text, "request transcribed");
        Ok(Payload::Text(text))
    }

    fn handle_use_snapshot(&self) -> Result<Payload> {
        self.voice.player.play_sound(SoundEffect::Snapshot);
        self.capture.start_capture()?;
        Ok(Payload::Empty)
    }

    async fn handle_get_snapshot(&mut self) -> Payload {
        let image = self.capture.wait_and_fetch().await;
        if image.is_some() {
            self.pending_image.clone_from(&image);
        }
        Payload::Image(image)
    }

    async fn handle_interact(&self, event: &Event) -> Result<Payload> {
        let outcome = match (event.kind(), event.request()) {
            (EventKind::AiInteract, Payload::Content(content)) => {
                self.engine.interact(content).await?
            }
            (EventKind::AiToolReturn, Payload::Action(action)) => {
                self.engine.resume(action).await?
            }
            _ => return Err(unexpected_request(event)),
        };

        if outcome.status == OutcomeStatus::Error {
            return Err(Error::BackendStream(
                outcome
                    .error
                    .unwrap_or_else(|| "assistant run failed".to_string()),
            ));
        }

        Ok(Payload::Outcome(outcome))
    }

    async fn handle_tool(&self, event: &Event) -> Result<Payload> {
        let Payload::Arguments(arguments) = event.request() else {
            return Err(unexpected_request(event));
        };
        let output = self.tools.resolve(event.kind(), arguments).await?;
        Ok(Payload::Text(output))
    }
}

/// Result of one controller step
#[derive(Debug)]
pub enum Step {
    /// Event to process next
    Next(Event),
    /// The processed `EXIT` event; the loop is over
    Exit(Event),
}

fn expect_text(event: &Event) -> Result<&str> {
    event
        .request()
        .as_text()
        .ok_or_else(|| unexpected_request(event))
}

fn unexpected_request(event: &Event) -> Error {
    Error::Aborted {
        kind: event.kind(),
        message: format!("unexpected request {:?}", event.request()),
    }
}

fn aborted(event: &Event) -> Error {
    Error::Aborted {
        kind: event.kind(),
        message: event.error().unwrap_or("unknown error").to_string(),
    }
}
