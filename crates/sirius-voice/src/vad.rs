//! Energy-based voice activity gate
//!
//! Classifies each buffer as speech or silence by RMS energy and keeps the running
//! counters that decide when a recording has gone quiet for long enough to stop.
//! All durations are measured in audio time (samples / sample rate), not wall time.

use crate::audio::{ms_to_samples, samples_to_duration};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the voice activity gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Sample rate of incoming audio (default: 16000 Hz)
    pub sample_rate: u32,

    /// RMS of normalized samples above which a buffer counts as speech (default: 0.03,
    /// about 1000 on the i16 scale)
    pub energy_threshold: f32,

    /// Silence needed before a recording may stop (default: 2000ms)
    pub silence_stop_ms: u64,

    /// Minimum recording time, up to the last speech, before a recording may stop
    /// (default: 1000ms)
    pub min_recording_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            energy_threshold: 0.03,
            silence_stop_ms: 2000,
            min_recording_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VadClass {
    Speech,
    Silence,
}

/// Classification of a single buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadFrame {
    pub class: VadClass,
    pub rms: f32,
    pub duration: Duration,
}

impl VadFrame {
    pub fn is_speech(&self) -> bool {
        self.class == VadClass::Speech
    }
}

/// Root-mean-square amplitude of `samples` (0.0 for an empty slice).
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Speech/silence gate with rolling silence and recording counters.
#[derive(Debug, Clone)]
pub struct VoiceActivityGate {
    config: VadConfig,
    silence_samples: u64,
    elapsed_samples: u64,
    /// Elapsed samples at the end of the most recent speech buffer.
    voiced_samples: u64,
    silence_stop_samples: u64,
    min_recording_samples: u64,
}

impl VoiceActivityGate {
    pub fn new(config: VadConfig) -> Self {
        let silence_stop_samples = ms_to_samples(config.silence_stop_ms, config.sample_rate);
        let min_recording_samples = ms_to_samples(config.min_recording_ms, config.sample_rate);
        Self {
            config,
            silence_samples: 0,
            elapsed_samples: 0,
            voiced_samples: 0,
            silence_stop_samples,
            min_recording_samples,
        }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Classify one buffer and update the counters.
    pub fn process(&mut self, samples: &[f32]) -> VadFrame {
        let len = samples.len() as u64;
        let level = rms(samples);
        self.elapsed_samples += len;
        let class = if level > self.config.energy_threshold {
            self.silence_samples = 0;
            self.voiced_samples = self.elapsed_samples;
            VadClass::Speech
        } else {
            self.silence_samples += len;
            VadClass::Silence
        };
        VadFrame {
            class,
            rms: level,
            duration: samples_to_duration(len, self.config.sample_rate),
        }
    }

    /// Silence has lasted longer than the stop threshold and the recording ran at
    /// least the minimum time before going quiet.
    pub fn should_stop(&self) -> bool {
        self.silence_samples > self.silence_stop_samples
            && self.voiced_samples >= self.min_recording_samples
    }

    pub fn silence(&self) -> Duration {
        samples_to_duration(self.silence_samples, self.config.sample_rate)
    }

    pub fn elapsed(&self) -> Duration {
        samples_to_duration(self.elapsed_samples, self.config.sample_rate)
    }

    pub fn voiced_span(&self) -> Duration {
        samples_to_duration(self.voiced_samples, self.config.sample_rate)
    }

    pub fn reset(&mut self) {
        self.silence_samples = 0;
        self.elapsed_samples = 0;
        self.voiced_samples = 0;
    }
}
