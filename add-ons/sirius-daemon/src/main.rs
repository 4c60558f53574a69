//! Sirius Daemon
//!
//! Host process wiring the expression pipeline and the voice coordinator together.
//! `express` turns a marked-up response into a timeline (and optionally plays it on a
//! logging display); `listen` runs wake-word monitoring and transcription on a WAV file
//! or the microphone.

mod cli;
mod config;

use crate::cli::{AudioSource, Command};
use crate::config::SiriusConfig;
use sirius_expression::{AudioQuery, ExpressionKind, LoggingDisplay, ResponseProcessor, TimelinePlayer};
use sirius_voice::{
    create_best_stt, wav_chunks, AudioChunk, CaptureState, CoordinatorEvent, PlaceholderTts,
    SpeechSynthesizer, SttBackend, VoiceCoordinator, VoiceHandle,
};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chunk size used when replaying WAV files.
const WAV_CHUNK_MS: u64 = 100;

type DaemonResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[sirius-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = match cli::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };

    let config = match SiriusConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[sirius-daemon] failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match command {
        Command::Express {
            audio_query,
            play,
            text,
        } => express(&config, audio_query.as_deref(), play, &text).await,
        Command::Listen { source } => listen(&config, source).await,
    };

    if let Err(e) = result {
        tracing::error!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn express(
    config: &SiriusConfig,
    audio_query: Option<&Path>,
    play: bool,
    text: &str,
) -> DaemonResult<()> {
    let processor = ResponseProcessor::new(config.expression.clone());
    let prepared = processor.prepare(text);

    let phonemes = match audio_query {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Some(AudioQuery::from_json(&json)?.phoneme_units())
        }
        None => PlaceholderTts::new().synthesize(&prepared.clean_text)?.phonemes,
    };
    let processed = prepared.schedule(phonemes.as_deref());
    println!("{}", serde_json::to_string_pretty(&processed)?);

    if play {
        let player = TimelinePlayer::new(Arc::new(LoggingDisplay));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let playback = player.play(&processed.timeline, ExpressionKind::Neutral, cancel_rx);
        tokio::pin!(playback);

        let report = tokio::select! {
            report = &mut playback => report,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; cancelling playback");
                let _ = cancel_tx.send(true);
                playback.await
            }
        };
        tracing::info!(
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            "🎭 Expression playback done"
        );
    }
    Ok(())
}

async fn listen(config: &SiriusConfig, source: AudioSource) -> DaemonResult<()> {
    let stt: Arc<dyn SttBackend> = Arc::from(create_best_stt());
    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let (handle, task) = VoiceCoordinator::spawn(config.voice.clone(), stt, audio_rx);
    let mut events = handle.subscribe_events();

    handle.start_listening().await?;
    tracing::info!(
        phrases = config.voice.wake.phrases.len(),
        "👂 Listening for wake phrases"
    );

    let outcome = match source {
        AudioSource::Wav(path) => {
            let chunks = wav_chunks(&path, WAV_CHUNK_MS)?;
            if let Some(rate) = chunks.first().map(|c| c.sample_rate) {
                if rate != config.voice.sample_rate() {
                    return Err(format!(
                        "{} is {} Hz but the pipeline runs at {} Hz",
                        path.display(),
                        rate,
                        config.voice.sample_rate()
                    )
                    .into());
                }
            }
            run_until_done(&handle, &mut events, replay(chunks, audio_tx), config).await
        }
        AudioSource::Mic => listen_mic(&mut events, audio_tx).await,
    };

    handle.shutdown()?;
    task.await?;
    outcome
}

/// Feed WAV chunks at their real-time pace, then close the source.
async fn replay(chunks: Vec<AudioChunk>, audio_tx: mpsc::UnboundedSender<AudioChunk>) {
    let total = chunks.len();
    for chunk in chunks {
        let pace = chunk.duration();
        if audio_tx.send(chunk).is_err() {
            return;
        }
        tokio::time::sleep(pace).await;
    }
    tracing::info!(chunks = total, "📼 Replay finished");
}

/// Log events until the replay ends and any pending transcription resolves, or CTRL-C.
async fn run_until_done(
    handle: &VoiceHandle,
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    replay: impl std::future::Future<Output = ()>,
    config: &SiriusConfig,
) -> DaemonResult<()> {
    tokio::pin!(replay);
    let mut replay_done = false;
    let mut state = handle.watch_state();
    let settle = config.voice.stt_timeout() + Duration::from_secs(1);

    loop {
        tokio::select! {
            _ = &mut replay, if !replay_done => {
                replay_done = true;
                // Source closed: wait for the last utterance to be transcribed.
                let idle = tokio::time::timeout(settle, state.wait_for(|s| *s == CaptureState::Idle));
                tokio::pin!(idle);
                loop {
                    tokio::select! {
                        _ = &mut idle => return Ok(()),
                        event = events.recv() => log_event(event)?,
                    }
                }
            }
            event = events.recv() => log_event(event)?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(feature = "capture")]
async fn listen_mic(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    audio_tx: mpsc::UnboundedSender<AudioChunk>,
) -> DaemonResult<()> {
    use sirius_voice::{AudioCapture, AudioConfig};

    let capture = AudioCapture::new(AudioConfig::default())?;
    // The stream stops when dropped.
    let _stream = capture.start_capture(audio_tx)?;

    loop {
        tokio::select! {
            event = events.recv() => log_event(event)?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(not(feature = "capture"))]
async fn listen_mic(
    _events: &mut broadcast::Receiver<CoordinatorEvent>,
    _audio_tx: mpsc::UnboundedSender<AudioChunk>,
) -> DaemonResult<()> {
    Err("microphone capture needs a build with --features capture".into())
}

fn log_event(
    event: Result<CoordinatorEvent, broadcast::error::RecvError>,
) -> DaemonResult<()> {
    match event {
        Ok(CoordinatorEvent::WakeDetected { detection }) => {
            tracing::info!(phrase = %detection.phrase, "✨ Wake phrase heard; {}", detection.acknowledgment);
        }
        Ok(CoordinatorEvent::Transcribed { session_id, reading }) => {
            tracing::info!(
                session_id = session_id.0,
                confidence = reading.result.confidence,
                decision = ?reading.decision,
                "💬 {}",
                reading.result.text
            );
        }
        Ok(event) => {
            tracing::debug!(event = %serde_json::to_string(&event)?, "coordinator event");
        }
        Err(broadcast::error::RecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "event log fell behind");
        }
        Err(broadcast::error::RecvError::Closed) => {
            return Err("coordinator event stream closed".into());
        }
    }
    Ok(())
}
