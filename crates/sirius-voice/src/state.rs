//! The process-wide capture mode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which consumer currently owns the microphone. Written only by the coordinator task;
/// everyone else reads it through a `watch` receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Idle,
    /// Wake-word monitor armed.
    Monitoring,
    WakeDetected,
    /// Recording session armed.
    Recording,
    /// Utterance handed to speech-to-text; neither consumer is armed.
    Transcribing,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Monitoring => "monitoring",
            CaptureState::WakeDetected => "wake_detected",
            CaptureState::Recording => "recording",
            CaptureState::Transcribing => "transcribing",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
