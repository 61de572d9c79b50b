use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use heddy::backend::{OpenAiAssistant, ZapierWebhook};
use heddy::voice::{
    AudioPlayer, Camera, KeywordListener, LibcameraStill, MicRecorder, Microphone, SpeakerPlayer,
    SpeechToText, Synthesizer, TextToSpeech, Transcriber,
};
use heddy::{
    CaptureCoordinator, Config, Controller, Event, EventKind, InteractionEngine, Session,
    ToolDispatcher, VoiceIo,
};

/// Heddy - voice assistant with tool calls and camera snapshots
#[derive(Parser)]
#[command(name = "heddy", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Take a snapshot, upload it, and print the file reference
    TestSnapshot,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,heddy=info",
        1 => "info,heddy=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::TestSnapshot => test_snapshot(&config).await,
        };
    }

    tracing::info!(
        assistant_id = %config.assistant_id,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        zapier = config.zapier_webhook_url.is_some(),
        "starting heddy"
    );

    let microphone = Microphone::open()?;
    let player: Arc<dyn AudioPlayer> =
        Arc::new(SpeakerPlayer::new(config.voice.sounds_dir.clone())?);
    let transcriber = build_transcriber(&config)?;
    let synthesizer = build_synthesizer(&config)?;

    let keyword_scratch = std::env::temp_dir().join("heddy_keyword.wav");
    let voice = VoiceIo {
        transcriber: Arc::clone(&transcriber),
        synthesizer,
        player: Arc::clone(&player),
        recorder: Arc::new(MicRecorder::new(
            microphone.tap(),
            config.voice.recording_path.clone(),
        )),
        detector: Arc::new(KeywordListener::new(
            microphone.tap(),
            transcriber,
            keyword_scratch,
        )),
    };

    let assistant = Arc::new(OpenAiAssistant::new(config.openai_api_key.clone())?);
    let session = Session::new(config.idle_timeout, player);
    let engine = InteractionEngine::new(
        assistant.clone(),
        session.clone(),
        config.assistant_id.clone(),
    );
    let capture =
        CaptureCoordinator::new(build_camera(&config), assistant, config.capture_timeout);
    let tools = ToolDispatcher::new(
        Arc::new(ZapierWebhook::new()),
        config.zapier_webhook_url.clone(),
    );

    let mut controller =
        Controller::new(voice, engine, capture, tools).with_greeting(config.greeting.clone());

    let result = tokio::select! {
        result = controller.run(Event::new(EventKind::Start)) => result.map(|_| ()),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    };

    session.reset();
    drop(microphone);
    result.map_err(Into::into)
}

fn build_transcriber(config: &Config) -> anyhow::Result<Arc<dyn Transcriber>> {
    let stt = SpeechToText::from_config(&config.voice, &config.openai_api_key)?;
    Ok(Arc::new(stt))
}

fn build_synthesizer(config: &Config) -> anyhow::Result<Arc<dyn Synthesizer>> {
    let tts = TextToSpeech::from_config(&config.voice, &config.openai_api_key)?;
    Ok(Arc::new(tts))
}

fn build_camera(config: &Config) -> Arc<dyn Camera> {
    Arc::new(LibcameraStill::new(
        config.camera.program.clone(),
        config.camera.width,
        config.camera.height,
        config.camera.output_dir.clone(),
    ))
}

async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = build_synthesizer(config)?;
    let player = SpeakerPlayer::new(config.voice.sounds_dir.clone())?;

    println!("Synthesizing speech...");
    let clip = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio data", clip.data.len());

    println!("Playing audio...");
    player.play(&clip).await?;
    println!("\nDone!");

    Ok(())
}

async fn test_snapshot(config: &Config) -> anyhow::Result<()> {
    println!("Testing snapshot with {}\n", config.camera.program);

    let assistant = Arc::new(OpenAiAssistant::new(config.openai_api_key.clone())?);
    let capture =
        CaptureCoordinator::new(build_camera(config), assistant, config.capture_timeout);

    capture.start_capture()?;
    println!("Capturing...");

    match capture.wait_and_fetch().await {
        Some(file_id) => {
            println!("Uploaded snapshot: {file_id}");
            Ok(())
        }
        None => anyhow::bail!("snapshot failed; run with -v for details"),
    }
}
