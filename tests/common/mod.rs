//! Shared test utilities
//!
//! Scripted fakes for every collaborator, plus a harness that wires them
//! into a controller.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use heddy::backend::{
    AssistantBackend, ContentPart, RequestedCall, RequiredAction, RunEvent, RunStream, ToolOutput,
    VisionUploader, WebhookClient,
};
use heddy::voice::{
    AudioClip, AudioPlayer, Camera, Recorder, SoundEffect, Synthesizer, Transcriber, WordDetector,
};
use heddy::{
    CaptureCoordinator, Controller, Error, InteractionEngine, Result, Session, ToolDispatcher,
    VoiceIo,
};

pub const ASSISTANT_ID: &str = "asst_test";
pub const THREAD_ID: &str = "thread_1";
pub const ZAPIER_URL: &str = "https://hooks.zapier.test/catch/1";

/// A backend request observed by [`ScriptedBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateThread,
    AppendMessage {
        thread_id: String,
        parts: Vec<ContentPart>,
    },
    StartStream {
        thread_id: String,
        assistant_id: String,
    },
    SubmitToolOutputs {
        thread_id: String,
        run_id: String,
        outputs: Vec<ToolOutput>,
    },
}

/// Assistant backend that replays scripted runs and records every call
#[derive(Default)]
pub struct ScriptedBackend {
    calls: Mutex<Vec<BackendCall>>,
    runs: Mutex<VecDeque<Vec<RunEvent>>>,
    fail_create: Mutex<bool>,
    append_delay: Mutex<Duration>,
    threads_created: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the events of the next run (started or resumed)
    pub fn push_run(&self, events: Vec<RunEvent>) {
        self.runs.lock().unwrap().push_back(events);
    }

    pub fn fail_thread_creation(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    pub fn delay_appends(&self, delay: Duration) {
        *self.append_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn appended(&self) -> Vec<Vec<ContentPart>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::AppendMessage { parts, .. } => Some(parts),
                _ => None,
            })
            .collect()
    }

    pub fn submitted(&self) -> Vec<Vec<ToolOutput>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::SubmitToolOutputs { outputs, .. } => Some(outputs),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_run(&self) -> RunStream {
        let events = self.runs.lock().unwrap().pop_front().unwrap_or_default();
        stream::iter(events.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    async fn create_thread(&self) -> Result<String> {
        self.record(BackendCall::CreateThread);
        if *self.fail_create.lock().unwrap() {
            return Err(Error::BackendStream("503 service unavailable".into()));
        }
        let mut created = self.threads_created.lock().unwrap();
        *created += 1;
        Ok(if *created == 1 {
            THREAD_ID.to_string()
        } else {
            format!("thread_{created}")
        })
    }

    async fn append_message(&self, thread_id: &str, content: &[ContentPart]) -> Result<()> {
        self.record(BackendCall::AppendMessage {
            thread_id: thread_id.to_string(),
            parts: content.to_vec(),
        });
        let delay = *self.append_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn start_stream(&self, thread_id: &str, assistant_id: &str) -> Result<RunStream> {
        self.record(BackendCall::StartStream {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
        });
        Ok(self.next_run())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunStream> {
        self.record(BackendCall::SubmitToolOutputs {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            outputs: outputs.to_vec(),
        });
        Ok(self.next_run())
    }
}

/// Run events for a completed reply delivered in fragments
pub fn reply(fragments: &[&str]) -> Vec<RunEvent> {
    fragments
        .iter()
        .map(|f| RunEvent::TextDelta((*f).to_string()))
        .chain([RunEvent::Completed])
        .collect()
}

/// Run events for a run that pauses on `send_text_message` calls
pub fn text_message_calls(run_id: &str, messages: &[&str]) -> Vec<RunEvent> {
    let calls = messages
        .iter()
        .enumerate()
        .map(|(i, message)| RequestedCall {
            id: format!("call_{}", i + 1),
            name: "send_text_message".to_string(),
            arguments: serde_json::json!({ "message": message }).to_string(),
        })
        .collect();

    vec![
        RunEvent::Other("thread.run.created".to_string()),
        RunEvent::RequiresAction(RequiredAction {
            run_id: run_id.to_string(),
            thread_id: THREAD_ID.to_string(),
            calls,
        }),
    ]
}

/// Player that records what it was asked to play
#[derive(Default)]
pub struct CountingPlayer {
    clips: Mutex<Vec<AudioClip>>,
    sounds: Mutex<Vec<SoundEffect>>,
}

impl CountingPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn clips(&self) -> Vec<AudioClip> {
        self.clips.lock().unwrap().clone()
    }

    pub fn sounds(&self) -> Vec<SoundEffect> {
        self.sounds.lock().unwrap().clone()
    }

    pub fn count(&self, sound: SoundEffect) -> usize {
        self.sounds().iter().filter(|s| **s == sound).count()
    }
}

#[async_trait]
impl AudioPlayer for CountingPlayer {
    async fn play(&self, clip: &AudioClip) -> Result<()> {
        self.clips.lock().unwrap().push(clip.clone());
        Ok(())
    }

    fn play_sound(&self, sound: SoundEffect) {
        self.sounds.lock().unwrap().push(sound);
    }
}

/// Detector that hears a fixed list of phrases, then fails
#[derive(Default)]
pub struct ScriptedDetector {
    phrases: Mutex<VecDeque<String>>,
    clears: Mutex<usize>,
}

impl ScriptedDetector {
    pub fn new(phrases: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            phrases: Mutex::new(phrases.iter().map(|p| (*p).to_string()).collect()),
            clears: Mutex::new(0),
        })
    }

    pub fn clears(&self) -> usize {
        *self.clears.lock().unwrap()
    }
}

#[async_trait]
impl WordDetector for ScriptedDetector {
    async fn listen(&self) -> Result<String> {
        self.phrases
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Audio("microphone closed".into()))
    }

    fn clear(&self) {
        *self.clears.lock().unwrap() += 1;
    }
}

/// Transcriber returning scripted texts
#[derive(Default)]
pub struct ScriptedTranscriber {
    texts: Mutex<VecDeque<String>>,
    paths: Mutex<Vec<PathBuf>>,
}

impl ScriptedTranscriber {
    pub fn new(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            texts: Mutex::new(texts.iter().map(|t| (*t).to_string()).collect()),
            paths: Mutex::new(Vec::new()),
        })
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        self.paths.lock().unwrap().push(audio_path.to_path_buf());
        self.texts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Transcription("nothing scripted".into()))
    }
}

/// Synthesizer that encodes the text itself as the "audio"
#[derive(Default)]
pub struct EchoSynthesizer {
    texts: Mutex<Vec<String>>,
}

impl EchoSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(AudioClip::mp3(text.as_bytes().to_vec()))
    }
}

/// Recorder that tracks start/stop without audio
#[derive(Default)]
pub struct FakeRecorder {
    recording: Mutex<bool>,
    starts: Mutex<usize>,
}

impl FakeRecorder {
    pub const PATH: &'static str = "/tmp/heddy-test/recorded_audio.wav";

    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_recording(&self) -> bool {
        *self.recording.lock().unwrap()
    }

    pub fn starts(&self) -> usize {
        *self.starts.lock().unwrap()
    }
}

impl Recorder for FakeRecorder {
    fn start(&self) -> Result<()> {
        *self.recording.lock().unwrap() = true;
        *self.starts.lock().unwrap() += 1;
        Ok(())
    }

    fn stop(&self) -> Result<PathBuf> {
        let mut recording = self.recording.lock().unwrap();
        if !*recording {
            return Err(Error::Audio("not recording".into()));
        }
        *recording = false;
        Ok(PathBuf::from(Self::PATH))
    }
}

/// Camera that always produces the same file
pub struct FakeCamera;

#[async_trait]
impl Camera for FakeCamera {
    async fn capture(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/tmp/heddy-test/snapshot.png"))
    }
}

/// Uploader that hands out a fixed file reference
pub struct FakeUploader;

pub const SNAPSHOT_FILE_ID: &str = "file-snapshot";

#[async_trait]
impl VisionUploader for FakeUploader {
    async fn upload(&self, _path: &Path) -> Result<String> {
        Ok(SNAPSHOT_FILE_ID.to_string())
    }
}

/// Webhook that records posts and answers with scripted status codes
#[derive(Default)]
pub struct RecordingWebhook {
    posts: Mutex<Vec<(String, serde_json::Value)>>,
    statuses: Mutex<VecDeque<u16>>,
}

impl RecordingWebhook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer the next posts with these codes; 200 once they run out
    pub fn respond_with(&self, statuses: &[u16]) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    pub fn posts(&self) -> Vec<(String, serde_json::Value)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookClient for RecordingWebhook {
    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<u16> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(self.statuses.lock().unwrap().pop_front().unwrap_or(200))
    }
}

/// All fakes wired together
pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub player: Arc<CountingPlayer>,
    pub detector: Arc<ScriptedDetector>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub synthesizer: Arc<EchoSynthesizer>,
    pub recorder: Arc<FakeRecorder>,
    pub webhook: Arc<RecordingWebhook>,
    pub session: Session,
}

impl Harness {
    /// Harness whose detector hears `phrases` and whose transcriber returns `texts`
    pub fn new(phrases: &[&str], texts: &[&str]) -> Self {
        let player = CountingPlayer::new();
        Self {
            backend: ScriptedBackend::new(),
            session: Session::new(Duration::from_secs(180), player.clone()),
            player,
            detector: ScriptedDetector::new(phrases),
            transcriber: ScriptedTranscriber::new(texts),
            synthesizer: EchoSynthesizer::new(),
            recorder: FakeRecorder::new(),
            webhook: RecordingWebhook::new(),
        }
    }

    pub fn engine(&self) -> InteractionEngine {
        InteractionEngine::new(self.backend.clone(), self.session.clone(), ASSISTANT_ID)
    }

    pub fn tools(&self) -> ToolDispatcher {
        ToolDispatcher::new(self.webhook.clone(), Some(ZAPIER_URL.to_string()))
    }

    pub fn controller(&self) -> Controller {
        let voice = VoiceIo {
            transcriber: self.transcriber.clone(),
            synthesizer: self.synthesizer.clone(),
            player: self.player.clone(),
            recorder: self.recorder.clone(),
            detector: self.detector.clone(),
        };
        let capture = CaptureCoordinator::new(
            Arc::new(FakeCamera),
            Arc::new(FakeUploader),
            Duration::from_secs(10),
        );
        Controller::new(voice, self.engine(), capture, self.tools())
    }
}
