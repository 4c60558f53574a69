//! **RecordingSession**: one bounded recording at a time.
//!
//! ```text
//! Idle ──start──▶ Recording ──silence / max / stop──▶ Stopping ──▶ Done | Discarded ──▶ Idle
//! ```
//!
//! A start request while recording is rejected with [`VoiceError::Busy`], never queued.

use crate::audio::{encode_wav, ms_to_samples, samples_to_duration};
use crate::error::{VoiceError, VoiceResult};
use crate::vad::{VadConfig, VoiceActivityGate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Recording limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Hard stop for a stuck-open microphone (default: 30000ms)
    pub max_duration_ms: u64,
    /// Recordings shorter than this are discarded as noise (default: 1000ms)
    pub min_duration_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 30_000,
            min_duration_ms: 1_000,
        }
    }
}

/// Monotonically increasing session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingTrigger {
    Manual,
    WakeWord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The voice activity gate heard enough silence.
    Silence,
    MaxDuration,
    Manual,
    /// The audio source ended mid-recording.
    SourceClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
    Done,
    Discarded,
}

/// A finished recording. Moved, not copied, into transcription.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub session_id: SessionId,
    pub trigger: RecordingTrigger,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration: Duration,
    pub captured_at: DateTime<Utc>,
}

impl Utterance {
    /// 16-bit PCM WAV encoding of the samples.
    pub fn to_wav_bytes(&self) -> VoiceResult<Vec<u8>> {
        encode_wav(&self.samples, self.sample_rate)
    }
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Done {
        utterance: Utterance,
        reason: StopReason,
    },
    /// Too short to be speech. Not an error.
    Discarded {
        session_id: SessionId,
        duration: Duration,
        reason: StopReason,
    },
}

impl SessionOutcome {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionOutcome::Done { utterance, .. } => utterance.session_id,
            SessionOutcome::Discarded { session_id, .. } => *session_id,
        }
    }
}

struct ActiveSession {
    id: SessionId,
    trigger: RecordingTrigger,
    samples: Vec<f32>,
}

pub struct RecordingSession {
    config: RecordingConfig,
    gate: VoiceActivityGate,
    sample_rate: u32,
    state: SessionState,
    active: Option<ActiveSession>,
    next_id: u64,
    max_samples: u64,
    min_samples: u64,
}

impl RecordingSession {
    pub fn new(config: RecordingConfig, vad: VadConfig) -> Self {
        let sample_rate = vad.sample_rate;
        Self {
            max_samples: ms_to_samples(config.max_duration_ms, sample_rate),
            min_samples: ms_to_samples(config.min_duration_ms, sample_rate),
            config,
            gate: VoiceActivityGate::new(vad),
            sample_rate,
            state: SessionState::Idle,
            active: None,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Recorded so far in the active session.
    pub fn duration(&self) -> Duration {
        let len = self.active.as_ref().map_or(0, |a| a.samples.len());
        samples_to_duration(len as u64, self.sample_rate)
    }

    pub fn start(&mut self, trigger: RecordingTrigger) -> VoiceResult<SessionId> {
        if let Some(active) = &self.active {
            warn!("⛔ Recording start rejected: session {} is active", active.id);
            return Err(VoiceError::Busy {
                active: active.id.0,
            });
        }
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.gate.reset();
        self.active = Some(ActiveSession {
            id,
            trigger,
            samples: Vec::new(),
        });
        self.state = SessionState::Recording;
        info!(session_id = id.0, ?trigger, "🔴 Recording started");
        Ok(id)
    }

    /// Append audio. Returns why the session should stop, once it should.
    pub fn push(&mut self, samples: &[f32]) -> Option<StopReason> {
        if self.state != SessionState::Recording {
            return None;
        }
        let active = self.active.as_mut()?;
        active.samples.extend_from_slice(samples);
        let recorded = active.samples.len() as u64;
        self.gate.process(samples);

        let reason = if recorded >= self.max_samples {
            warn!(session_id = active.id.0, "⏱️ Max recording duration reached");
            StopReason::MaxDuration
        } else if self.gate.should_stop() {
            debug!(session_id = active.id.0, silence = ?self.gate.silence(), "silence detected");
            StopReason::Silence
        } else {
            return None;
        };
        self.state = SessionState::Stopping;
        Some(reason)
    }

    /// Close the active session. Returns to `Idle` in every case.
    pub fn finish(&mut self, reason: StopReason) -> VoiceResult<SessionOutcome> {
        let active = self.active.take().ok_or(VoiceError::NotRecording)?;
        self.state = SessionState::Stopping;
        let recorded = active.samples.len() as u64;
        let duration = samples_to_duration(recorded, self.sample_rate);

        let outcome = if recorded < self.min_samples {
            self.state = SessionState::Discarded;
            info!(
                session_id = active.id.0,
                ?reason,
                "🗑️ Recording discarded ({:.2}s is below the minimum)",
                duration.as_secs_f32()
            );
            SessionOutcome::Discarded {
                session_id: active.id,
                duration,
                reason,
            }
        } else {
            self.state = SessionState::Done;
            info!(
                session_id = active.id.0,
                ?reason,
                "✅ Recording complete ({:.2}s)",
                duration.as_secs_f32()
            );
            SessionOutcome::Done {
                utterance: Utterance {
                    session_id: active.id,
                    trigger: active.trigger,
                    samples: active.samples,
                    sample_rate: self.sample_rate,
                    duration,
                    captured_at: Utc::now(),
                },
                reason,
            }
        };
        self.gate.reset();
        self.state = SessionState::Idle;
        Ok(outcome)
    }

    /// Drop the active session and its audio.
    pub fn cancel(&mut self) -> Option<SessionId> {
        let active = self.active.take()?;
        self.gate.reset();
        self.state = SessionState::Idle;
        info!(session_id = active.id.0, "✖️ Recording cancelled");
        Some(active.id)
    }
}
