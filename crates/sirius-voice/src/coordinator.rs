//! **VoiceCoordinator**: the one task that owns the microphone consumers.
//!
//! The wake-word monitor, the recording session and the quality tracker live inside a
//! single tokio task. Everything reaches them as a message: audio chunks, commands from
//! [`VoiceHandle`]s, and completions of speech-to-text work running on the blocking
//! pool. The task is the only writer of [`CaptureState`]; readers use a `watch`
//! receiver and never block it.
//!
//! Arming is exclusive: while a recording is active (and until its utterance is
//! resolved) the monitor receives no audio.

use crate::audio::AudioChunk;
use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::quality::{QualityReading, TranscriptionQualityTracker, TranscriptionResult};
use crate::session::{
    RecordingSession, RecordingTrigger, SessionId, SessionOutcome, StopReason, Utterance,
};
use crate::state::CaptureState;
use crate::stt::{SttBackend, Transcript};
use crate::wake::{WakeDetection, WakeState, WakeWordMonitor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Metadata of an utterance handed to transcription. The audio itself moves to the
/// transcription task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtteranceInfo {
    pub session_id: SessionId,
    pub trigger: RecordingTrigger,
    pub duration: Duration,
    pub sample_count: usize,
    pub reason: StopReason,
}

impl UtteranceInfo {
    fn of(utterance: &Utterance, reason: StopReason) -> Self {
        Self {
            session_id: utterance.session_id,
            trigger: utterance.trigger,
            duration: utterance.duration,
            sample_count: utterance.samples.len(),
            reason,
        }
    }
}

/// Result of a manual stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordingOutcome {
    /// Transcription follows as a `Transcribed` or `TranscriptionFailed` event.
    Captured(UtteranceInfo),
    /// Too short; treated as noise.
    Discarded {
        session_id: SessionId,
        duration: Duration,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    StateChanged {
        from: CaptureState,
        to: CaptureState,
    },
    WakeDetected {
        detection: WakeDetection,
    },
    RecordingStarted {
        session_id: SessionId,
        trigger: RecordingTrigger,
    },
    RecordingDiscarded {
        session_id: SessionId,
        duration: Duration,
        reason: StopReason,
    },
    UtteranceCaptured {
        utterance: UtteranceInfo,
    },
    Transcribed {
        session_id: SessionId,
        reading: QualityReading,
    },
    TranscriptionFailed {
        session_id: SessionId,
        error: String,
    },
    WakeProbeFailed {
        probe_id: u64,
        error: String,
    },
}

enum Command {
    StartListening(oneshot::Sender<VoiceResult<()>>),
    StopListening(oneshot::Sender<()>),
    StartRecording(oneshot::Sender<VoiceResult<SessionId>>),
    StopRecording(oneshot::Sender<VoiceResult<RecordingOutcome>>),
    CancelRecording(oneshot::Sender<Option<SessionId>>),
    PlaybackStarted,
    PlaybackFinished,
    Shutdown,
}

/// Speech-to-text work finishing on the blocking pool.
enum Completion {
    Probe {
        probe_id: u64,
        result: VoiceResult<Transcript>,
    },
    Utterance {
        session_id: SessionId,
        result: VoiceResult<Transcript>,
    },
}

/// Cloneable handle to a running coordinator.
#[derive(Clone)]
pub struct VoiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<CaptureState>,
    events: broadcast::Sender<CoordinatorEvent>,
    quality: broadcast::Sender<QualityReading>,
}

impl VoiceHandle {
    /// Arm the wake-word monitor. Fails with `AudioDevice` once the audio source is gone.
    pub async fn start_listening(&self) -> VoiceResult<()> {
        self.request(Command::StartListening).await?
    }

    pub async fn stop_listening(&self) -> VoiceResult<()> {
        self.request(Command::StopListening).await
    }

    /// Start a manual recording. `Busy` if one is already active.
    pub async fn start_recording(&self) -> VoiceResult<SessionId> {
        self.request(Command::StartRecording).await?
    }

    pub async fn stop_recording(&self) -> VoiceResult<RecordingOutcome> {
        self.request(Command::StopRecording).await?
    }

    /// Drop the active recording without transcribing it.
    pub async fn cancel_recording(&self) -> VoiceResult<Option<SessionId>> {
        self.request(Command::CancelRecording).await
    }

    /// The assistant started speaking.
    pub fn playback_started(&self) -> VoiceResult<()> {
        self.send(Command::PlaybackStarted)
    }

    pub fn playback_finished(&self) -> VoiceResult<()> {
        self.send(Command::PlaybackFinished)
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_quality(&self) -> broadcast::Receiver<QualityReading> {
        self.quality.subscribe()
    }

    pub fn shutdown(&self) -> VoiceResult<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> VoiceResult<()> {
        self.commands
            .send(command)
            .map_err(|e| VoiceError::ChannelClosed(e.to_string()))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> VoiceResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|e| VoiceError::ChannelClosed(e.to_string()))
    }
}

pub struct VoiceCoordinator {
    config: VoiceConfig,
    stt: Arc<dyn SttBackend>,
    monitor: WakeWordMonitor,
    session: RecordingSession,
    quality: TranscriptionQualityTracker,
    state_tx: watch::Sender<CaptureState>,
    events: broadcast::Sender<CoordinatorEvent>,
    completions: mpsc::UnboundedSender<Completion>,
    /// The host asked for wake-word monitoring.
    listening: bool,
    playback_active: bool,
    audio_open: bool,
    /// Session whose transcription result is still wanted.
    pending_transcription: Option<SessionId>,
}

impl VoiceCoordinator {
    /// Start the coordinator task consuming `audio_rx`.
    pub fn spawn(
        config: VoiceConfig,
        stt: Arc<dyn SttBackend>,
        audio_rx: mpsc::UnboundedReceiver<AudioChunk>,
    ) -> (VoiceHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(CaptureState::Idle);
        let (events, _) = broadcast::channel(128);
        let quality = TranscriptionQualityTracker::new(config.quality.clone());

        let handle = VoiceHandle {
            commands: commands_tx,
            state: state_rx,
            events: events.clone(),
            quality: quality.readings(),
        };
        let coordinator = Self {
            monitor: WakeWordMonitor::new(config.wake.clone(), config.sample_rate()),
            session: RecordingSession::new(config.recording.clone(), config.vad.clone()),
            quality,
            stt,
            state_tx,
            events,
            completions: completions_tx,
            listening: false,
            playback_active: false,
            audio_open: true,
            pending_transcription: None,
            config,
        };
        let task = tokio::spawn(coordinator.run(commands_rx, completions_rx, audio_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut audio: mpsc::UnboundedReceiver<AudioChunk>,
    ) {
        info!("🎛️ Voice coordinator running ({} Hz)", self.config.sample_rate());
        loop {
            // Audio captured before a command is consumed before that command.
            tokio::select! {
                biased;
                chunk = audio.recv(), if self.audio_open => match chunk {
                    Some(chunk) => self.on_audio(chunk),
                    None => self.on_audio_closed(),
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
            self.refresh_state();
        }

        self.monitor.stop();
        self.session.cancel();
        self.pending_transcription = None;
        self.set_state(CaptureState::Idle);
        info!("🛑 Voice coordinator stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::StartListening(reply) => {
                let _ = reply.send(self.start_listening());
            }
            Command::StopListening(reply) => {
                self.listening = false;
                self.monitor.stop();
                let _ = reply.send(());
            }
            Command::StartRecording(reply) => {
                let _ = reply.send(self.start_recording(RecordingTrigger::Manual));
            }
            Command::StopRecording(reply) => {
                let _ = reply.send(self.finish_recording(StopReason::Manual));
            }
            Command::CancelRecording(reply) => {
                let cancelled = self.session.cancel();
                if cancelled.is_some() {
                    self.rearm_monitor();
                }
                let _ = reply.send(cancelled);
            }
            Command::PlaybackStarted => {
                self.playback_active = true;
                if self.config.mute_wake_during_playback {
                    debug!("playback started, wake buffering suspended");
                    self.monitor.interrupt();
                }
            }
            Command::PlaybackFinished => {
                self.playback_active = false;
            }
            Command::Shutdown => {}
        }
    }

    fn start_listening(&mut self) -> VoiceResult<()> {
        if !self.audio_open {
            return Err(VoiceError::AudioDevice("audio source is closed".to_string()));
        }
        self.listening = true;
        self.monitor.start();
        Ok(())
    }

    fn start_recording(&mut self, trigger: RecordingTrigger) -> VoiceResult<SessionId> {
        let session_id = self.session.start(trigger)?;
        // The monitor is disarmed until this recording is resolved.
        self.monitor.interrupt();
        if let Some(previous) = self.pending_transcription.take() {
            info!(session_id = previous.0, "Pending transcription superseded by a new recording");
        }
        self.emit(CoordinatorEvent::RecordingStarted {
            session_id,
            trigger,
        });
        Ok(session_id)
    }

    fn finish_recording(&mut self, reason: StopReason) -> VoiceResult<RecordingOutcome> {
        match self.session.finish(reason)? {
            SessionOutcome::Discarded {
                session_id,
                duration,
                reason,
            } => {
                self.emit(CoordinatorEvent::RecordingDiscarded {
                    session_id,
                    duration,
                    reason,
                });
                self.rearm_monitor();
                Ok(RecordingOutcome::Discarded {
                    session_id,
                    duration,
                })
            }
            SessionOutcome::Done { utterance, reason } => {
                let info = UtteranceInfo::of(&utterance, reason);
                self.emit(CoordinatorEvent::UtteranceCaptured {
                    utterance: info.clone(),
                });
                self.pending_transcription = Some(utterance.session_id);
                self.transcribe_utterance(utterance);
                Ok(RecordingOutcome::Captured(info))
            }
        }
    }

    fn transcribe_utterance(&self, utterance: Utterance) {
        let session_id = utterance.session_id;
        info!(session_id = session_id.0, "📝 Transcribing utterance");
        self.spawn_stt(
            utterance.samples,
            utterance.sample_rate,
            self.config.stt_timeout(),
            move |result| Completion::Utterance { session_id, result },
        );
    }

    fn on_audio(&mut self, chunk: AudioChunk) {
        if chunk.sample_rate != self.config.sample_rate() {
            warn!(
                "Dropping audio chunk at {} Hz (pipeline runs at {} Hz)",
                chunk.sample_rate,
                self.config.sample_rate()
            );
            return;
        }

        if self.session.is_recording() {
            if let Some(reason) = self.session.push(&chunk.samples) {
                if let Err(e) = self.finish_recording(reason) {
                    warn!("Failed to finish recording: {}", e);
                }
            }
            return;
        }

        let wake_muted = self.playback_active && self.config.mute_wake_during_playback;
        if !self.listening || wake_muted || self.pending_transcription.is_some() {
            return;
        }
        if let Some(probe) = self.monitor.push(&chunk.samples) {
            let probe_id = probe.probe_id;
            self.spawn_stt(
                probe.samples,
                probe.sample_rate,
                self.config.probe_timeout(),
                move |result| Completion::Probe { probe_id, result },
            );
        }
    }

    fn on_audio_closed(&mut self) {
        warn!("🎤 Audio source closed");
        self.audio_open = false;
        if self.session.active_id().is_some() {
            if let Err(e) = self.finish_recording(StopReason::SourceClosed) {
                warn!("Failed to finish recording: {}", e);
            }
        }
        self.listening = false;
        self.monitor.stop();
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Probe { probe_id, result } => match result {
                Ok(transcript) => {
                    if let Some(detection) = self.monitor.on_transcription(probe_id, &transcript.text) {
                        self.on_wake(detection);
                    }
                }
                Err(e) => {
                    if self.monitor.on_probe_failed(probe_id) {
                        warn!(probe_id, "Wake probe failed: {}", e);
                        self.emit(CoordinatorEvent::WakeProbeFailed {
                            probe_id,
                            error: e.to_string(),
                        });
                    }
                }
            },
            Completion::Utterance { session_id, result } => {
                if self.pending_transcription != Some(session_id) {
                    debug!(session_id = session_id.0, "discarding stale transcription");
                    return;
                }
                self.pending_transcription = None;
                match result {
                    Ok(transcript) => {
                        let reading = self.quality.record(TranscriptionResult::new(
                            transcript.text,
                            transcript.confidence,
                        ));
                        self.emit(CoordinatorEvent::Transcribed {
                            session_id,
                            reading,
                        });
                    }
                    Err(e) => {
                        warn!(session_id = session_id.0, "❌ Transcription failed: {}", e);
                        self.emit(CoordinatorEvent::TranscriptionFailed {
                            session_id,
                            error: e.to_string(),
                        });
                    }
                }
                self.rearm_monitor();
            }
        }
    }

    fn on_wake(&mut self, detection: WakeDetection) {
        self.emit(CoordinatorEvent::WakeDetected { detection });
        self.set_state(CaptureState::WakeDetected);
        if let Err(e) = self.start_recording(RecordingTrigger::WakeWord) {
            warn!("Wake phrase heard but recording did not start: {}", e);
            self.monitor.resume();
        }
    }

    fn rearm_monitor(&mut self) {
        if self.listening {
            self.monitor.resume();
        }
    }

    /// Run `stt` on the blocking pool, bounded by `timeout`, and report back as a completion.
    fn spawn_stt<F>(&self, samples: Vec<f32>, sample_rate: u32, timeout: Duration, wrap: F)
    where
        F: FnOnce(VoiceResult<Transcript>) -> Completion + Send + 'static,
    {
        let stt = Arc::clone(&self.stt);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let work = tokio::task::spawn_blocking(move || stt.transcribe(&samples, sample_rate));
            let result = match tokio::time::timeout(timeout, work).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(VoiceError::Stt(format!("transcription task failed: {}", join))),
                Err(_) => Err(VoiceError::SttTimeout(timeout)),
            };
            // The coordinator may already be gone.
            let _ = completions.send(wrap(result));
        });
    }

    fn refresh_state(&mut self) {
        let next = if self.session.active_id().is_some() {
            CaptureState::Recording
        } else if self.pending_transcription.is_some() {
            CaptureState::Transcribing
        } else if self.monitor.state() == WakeState::Fired {
            CaptureState::WakeDetected
        } else if self.listening && self.monitor.is_active() {
            CaptureState::Monitoring
        } else {
            CaptureState::Idle
        };
        self.set_state(next);
    }

    fn set_state(&mut self, next: CaptureState) {
        let previous = *self.state_tx.borrow();
        if previous == next {
            return;
        }
        self.state_tx.send_replace(next);
        info!("🔄 Capture state: {} → {}", previous, next);
        self.emit(CoordinatorEvent::StateChanged {
            from: previous,
            to: next,
        });
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
