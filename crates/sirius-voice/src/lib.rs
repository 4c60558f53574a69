//! # Sirius Voice - Hands-Free Voice Capture
//!
//! Always-on wake-word monitoring, energy-based endpointing and confidence-gated
//! submission, coordinated by a single task that owns the microphone consumers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Voice Coordinator                          │
//! │  ┌──────────────┐      ┌──────────────────┐                      │
//! │  │  Audio In    │──┬──▶│ WakeWordMonitor  │── probe ──┐          │
//! │  │ (cpal / wav) │  │   │ (3s ring, 1.5s)  │           ▼          │
//! │  └──────────────┘  │   └──────────────────┘    ┌────────────┐    │
//! │                    │   ┌──────────────────┐    │    STT     │    │
//! │                    └──▶│ RecordingSession │───▶│ (blocking) │    │
//! │     (one armed)        │  + VAD gate      │    └─────┬──────┘    │
//! │                        └──────────────────┘          ▼           │
//! │                                            ┌──────────────────┐  │
//! │      CaptureState (watch) ◀────────────────│ Quality Tracker  │  │
//! │                                            └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod quality;
pub mod ring;
pub mod session;
pub mod state;
pub mod stt;
pub mod tts;
pub mod vad;
pub mod wake;

#[cfg(feature = "capture")]
pub use audio::{AudioCapture, AudioConfig};
pub use audio::{encode_wav, wav_chunks, AudioChunk};
pub use config::VoiceConfig;
pub use coordinator::{
    CoordinatorEvent, RecordingOutcome, UtteranceInfo, VoiceCoordinator, VoiceHandle,
};
pub use error::{VoiceError, VoiceResult};
pub use quality::{
    confidence_from_log_prob, QualityConfig, QualityReading, QualityStats, SubmitDecision,
    TranscriptionQualityTracker, TranscriptionResult,
};
pub use ring::RingBuffer;
pub use session::{
    RecordingConfig, RecordingSession, RecordingTrigger, SessionId, SessionOutcome,
    SessionState, StopReason, Utterance,
};
pub use state::CaptureState;
pub use stt::{
    create_best_stt, OpenAiCompatStt, PlaceholderStt, ScriptedReply, SttBackend, Transcript,
};
pub use tts::{PlaceholderTts, SpeechSynthesizer, SynthesizedSpeech};
pub use vad::{rms, VadClass, VadConfig, VadFrame, VoiceActivityGate};
pub use wake::{WakeConfig, WakeDetection, WakeProbe, WakeState, WakeWordMonitor};
