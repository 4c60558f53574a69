//! Speech-synthesis collaborator boundary. Only the interface lives here; the HTTP
//! client to the synthesis engine belongs to the host.

use crate::error::VoiceResult;
use sirius_expression::AudioPhonemeUnit;

/// Synthesized audio plus phoneme timing when the engine provides it.
#[derive(Debug, Clone, Default)]
pub struct SynthesizedSpeech {
    /// Encoded audio (WAV from most engines).
    pub audio: Vec<u8>,
    /// Absent timing is not an error; the scheduler estimates instead.
    pub phonemes: Option<Vec<AudioPhonemeUnit>>,
}

pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> VoiceResult<SynthesizedSpeech>;
}

/// Produces no audio and no timing.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl PlaceholderTts {
    pub fn new() -> Self {
        Self
    }
}

impl SpeechSynthesizer for PlaceholderTts {
    fn synthesize(&self, text: &str) -> VoiceResult<SynthesizedSpeech> {
        tracing::debug!(chars = text.chars().count(), "placeholder synthesis");
        Ok(SynthesizedSpeech::default())
    }
}
