use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use anyhow::anyhow;
use clap::{Parser, Subcommand};

use waav_tutor::TutorConfig;
use waav_tutor::core::audio::wav::read_wav_mono;
use waav_tutor::core::audio::{WavFileInput, WavRecorderOutput};
use waav_tutor::core::live::websocket::LiveWebSocketTransport;
use waav_tutor::core::live::{
    AudioInput, AudioOutput, CAPTURE_SAMPLE_RATE, LiveSessionManager, SessionStatus,
};
use waav_tutor::tutor::{
    Glossary, GlossaryToolHandler, SessionTranscript, TranscriptLog, teacher_profiles,
};

/// WaaV Tutor - Live spoken-language practice with an AI teacher
#[derive(Parser, Debug)]
#[command(name = "waav-tutor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hold one live conversation
    Run {
        /// WAV file streamed as the microphone (default microphone if omitted
        /// and built with `device-audio`)
        #[arg(short = 'i', long = "input", value_name = "WAV")]
        input: Option<PathBuf>,

        /// WAV file receiving the teacher's speech (default speaker if
        /// omitted and built with `device-audio`)
        #[arg(short = 'o', long = "output", value_name = "WAV")]
        output: Option<PathBuf>,

        /// Write transcript and glossary as JSON
        #[arg(short = 't', long = "transcript", value_name = "JSON")]
        transcript: Option<PathBuf>,

        /// Seconds to keep listening after the input file ends
        #[arg(long = "linger-secs", default_value_t = 5)]
        linger_secs: u64,
    },

    /// List the available teachers
    Profiles,
}

enum OutputSink {
    Recorder {
        recorder: Arc<WavRecorderOutput>,
        path: PathBuf,
    },
    #[cfg(feature = "device-audio")]
    Device,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Profiles => {
            for profile in teacher_profiles() {
                println!(
                    "{:<8} {:<22} voice: {}",
                    profile.name, profile.description, profile.voice
                );
            }
            Ok(())
        }
        Commands::Run {
            input,
            output,
            transcript,
            linger_secs,
        } => {
            let config = if let Some(config_path) = cli.config {
                println!("Loading configuration from {}", config_path.display());
                TutorConfig::from_file(&config_path)?
            } else {
                TutorConfig::from_env()?
            };
            run(config, input, output, transcript, Duration::from_secs(linger_secs)).await
        }
    }
}

fn open_input(path: Option<PathBuf>) -> anyhow::Result<(Arc<dyn AudioInput>, Option<Duration>)> {
    match path {
        Some(path) => {
            let samples = read_wav_mono(&path, CAPTURE_SAMPLE_RATE)
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
            let duration = Duration::from_secs_f64(samples.len() as f64 / CAPTURE_SAMPLE_RATE as f64);
            info!(
                "Streaming {} ({:.1}s) as microphone input",
                path.display(),
                duration.as_secs_f64()
            );
            let input: Arc<dyn AudioInput> = Arc::new(WavFileInput::new(path));
            Ok((input, Some(duration)))
        }
        #[cfg(feature = "device-audio")]
        None => {
            let microphone: Arc<dyn AudioInput> = Arc::new(waav_tutor::core::audio::CpalInput::new());
            Ok((microphone, None))
        }
        #[cfg(not(feature = "device-audio"))]
        None => anyhow::bail!("--input is required (build with the device-audio feature to use a microphone)"),
    }
}

fn open_output(path: Option<PathBuf>) -> anyhow::Result<(Arc<dyn AudioOutput>, OutputSink)> {
    match path {
        Some(path) => {
            let recorder = Arc::new(WavRecorderOutput::default());
            let output: Arc<dyn AudioOutput> = recorder.clone();
            Ok((output, OutputSink::Recorder { recorder, path }))
        }
        #[cfg(feature = "device-audio")]
        None => {
            let speaker: Arc<dyn AudioOutput> = Arc::new(waav_tutor::core::audio::CpalOutput::open()?);
            Ok((speaker, OutputSink::Device))
        }
        #[cfg(not(feature = "device-audio"))]
        None => anyhow::bail!("--output is required (build with the device-audio feature to use a speaker)"),
    }
}

/// Resolves when the session falls back to Idle on its own.
async fn wait_for_idle(manager: &LiveSessionManager) {
    let mut updates = manager.subscribe();
    loop {
        if updates.borrow_and_update().status == SessionStatus::Idle {
            return;
        }
        if updates.changed().await.is_err() {
            return;
        }
    }
}

async fn run(
    config: TutorConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    transcript_path: Option<PathBuf>,
    linger: Duration,
) -> anyhow::Result<()> {
    let blueprint = config.blueprint();
    if blueprint.missing_specifics() {
        warn!(
            "No specifics given for {}, using the default",
            blueprint.practice_mode
        );
    }

    let (audio_input, input_duration) = open_input(input)?;
    let (audio_output, sink) = open_output(output)?;

    let glossary = Arc::new(Glossary::new());
    let transcript = TranscriptLog::new();
    let transport = LiveWebSocketTransport::new(config.transport_config())?;

    let manager = LiveSessionManager::builder()
        .transport(Arc::new(transport))
        .audio_input(audio_input)
        .audio_output(audio_output)
        .tool_handler(Arc::new(GlossaryToolHandler::new(glossary.clone())))
        .on_transcript(transcript.callback())
        .capture_block_size(config.capture_block_size)
        .build()?;

    info!(
        "Starting {} with {} ({}, {})",
        blueprint.practice_mode, blueprint.teacher, blueprint.language, blueprint.level
    );
    if let Err(e) = manager.start(blueprint.live_config()).await {
        let message = manager.snapshot().error.unwrap_or_else(|| e.to_string());
        anyhow::bail!(message);
    }

    let session_limit = async {
        match input_duration {
            Some(duration) => tokio::time::sleep(duration + linger).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = session_limit => info!("Input finished, ending conversation"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, ending conversation"),
        _ = wait_for_idle(&manager) => warn!("Conversation ended by the connection"),
    }

    manager.stop().await;

    if let Some(error) = manager.snapshot().error {
        eprintln!("{}", error);
    }

    println!("{}", transcript.render());
    for word in glossary.words() {
        println!("  {}: {} ({})", word.word, word.definition, word.example);
    }

    if let Some(path) = transcript_path {
        write_transcript(&path, SessionTranscript::new(blueprint, transcript.messages(), glossary.words()))?;
    }

    match sink {
        OutputSink::Recorder { recorder, path } => {
            recorder
                .write_wav(&path)
                .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
            info!("Teacher audio written to {}", path.display());
        }
        #[cfg(feature = "device-audio")]
        OutputSink::Device => {}
    }

    manager.set_status(SessionStatus::Idle);
    Ok(())
}

fn write_transcript(path: &Path, record: SessionTranscript) -> anyhow::Result<()> {
    let json = record.to_json()?;
    std::fs::write(path, json).map_err(|e| anyhow!("Failed to write to {}: {}", path.display(), e))?;
    info!("Transcript written to {}", path.display());
    Ok(())
}
