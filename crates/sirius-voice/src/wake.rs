//! **WakeWordMonitor**: always-on listening for a trigger phrase.
//!
//! Keeps the last few seconds of audio in a ring buffer and, on a fixed audio-time
//! cadence, hands a copy to speech-to-text as a [`WakeProbe`]. The caller runs the
//! transcription wherever it likes and reports back by probe id; results for probes
//! that are no longer in flight (after `stop`, `interrupt` or `resume`) are ignored.
//!
//! ```text
//! Idle ──start──▶ Listening ──probe──▶ Candidate ──match──▶ Fired ──resume──▶ Listening
//!                     ▲                    │
//!                     └──── no match ──────┘
//! ```

use crate::audio::ms_to_samples;
use crate::ring::RingBuffer;
use crate::vad::rms;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Wake-word monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Trigger phrases, matched in this order.
    pub phrases: Vec<String>,
    /// Rolling buffer length (default: 3000ms)
    pub buffer_ms: u64,
    /// Audio time between probes (default: 1500ms)
    pub check_interval_ms: u64,
    /// Fraction of the buffer that must be filled before probing (default: 0.5)
    pub min_fill_ratio: f32,
    /// Windows quieter than this RMS are not transcribed (default: 0.0006)
    pub probe_energy_threshold: f32,
    /// Audio time after `resume` during which no probes are issued (default: 2000ms)
    pub cooldown_ms: u64,
    /// What the assistant says when it wakes up.
    pub acknowledgment: String,
    /// Upper bound on one probe transcription (default: 5000ms)
    pub probe_timeout_ms: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: [
                "シリウスくん",
                "シリウス君",
                "しりうすくん",
                "シリウス",
                "しりうす",
                "シリウスさん",
                "こんにちは",
                "おはよう",
                "起きて",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            buffer_ms: 3000,
            check_interval_ms: 1500,
            min_fill_ratio: 0.5,
            probe_energy_threshold: 0.0006,
            cooldown_ms: 2000,
            acknowledgment: "はい、なんですか".to_string(),
            probe_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeState {
    Idle,
    Listening,
    /// A probe is being transcribed.
    Candidate,
    /// A phrase matched; waiting for `resume`.
    Fired,
}

/// A buffer snapshot to transcribe.
#[derive(Debug, Clone)]
pub struct WakeProbe {
    pub probe_id: u64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WakeDetection {
    /// The configured phrase that matched.
    pub phrase: String,
    pub transcript: String,
    pub acknowledgment: String,
}

pub struct WakeWordMonitor {
    config: WakeConfig,
    sample_rate: u32,
    state: WakeState,
    buffer: RingBuffer<f32>,
    /// (configured phrase, normalized phrase)
    phrases: Vec<(String, String)>,
    since_probe: u64,
    cooldown_left: u64,
    next_probe_id: u64,
    in_flight: Option<u64>,
    interval_samples: u64,
    min_fill_samples: usize,
}

impl WakeWordMonitor {
    pub fn new(config: WakeConfig, sample_rate: u32) -> Self {
        let capacity = ms_to_samples(config.buffer_ms, sample_rate) as usize;
        let phrases = config
            .phrases
            .iter()
            .map(|p| (p.clone(), normalize(p)))
            .filter(|(_, n)| !n.is_empty())
            .collect();
        let min_fill_samples =
            (capacity as f64 * config.min_fill_ratio.clamp(0.0, 1.0) as f64).ceil() as usize;
        Self {
            interval_samples: ms_to_samples(config.check_interval_ms, sample_rate),
            min_fill_samples,
            buffer: RingBuffer::new(capacity),
            config,
            sample_rate,
            state: WakeState::Idle,
            phrases,
            since_probe: 0,
            cooldown_left: 0,
            next_probe_id: 1,
            in_flight: None,
        }
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    pub fn config(&self) -> &WakeConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.state != WakeState::Idle
    }

    pub fn start(&mut self) {
        if self.state == WakeState::Idle {
            info!("👂 Wake-word monitor listening ({} phrases)", self.phrases.len());
            self.clear();
            self.state = WakeState::Listening;
        }
    }

    /// Back to idle. A probe still being transcribed will be ignored when it returns.
    pub fn stop(&mut self) {
        if self.state != WakeState::Idle {
            info!("🔇 Wake-word monitor stopped");
        }
        self.clear();
        self.state = WakeState::Idle;
    }

    /// Forget buffered audio and any in-flight probe without leaving the active states.
    pub fn interrupt(&mut self) {
        self.clear();
        if self.state == WakeState::Candidate {
            self.state = WakeState::Listening;
        }
    }

    /// Re-arm after a firing (or after the microphone was lent to a recording). Starts
    /// the cooldown so the tail of the user's own speech does not trigger again.
    pub fn resume(&mut self) {
        if self.state == WakeState::Idle {
            return;
        }
        self.clear();
        self.cooldown_left = ms_to_samples(self.config.cooldown_ms, self.sample_rate);
        self.state = WakeState::Listening;
        debug!("wake-word monitor re-armed");
    }

    /// Buffer audio. Returns a probe when one is due.
    pub fn push(&mut self, samples: &[f32]) -> Option<WakeProbe> {
        if !matches!(self.state, WakeState::Listening | WakeState::Candidate) {
            return None;
        }
        self.buffer.extend_from_slice(samples);
        let len = samples.len() as u64;
        if self.cooldown_left > 0 {
            self.cooldown_left = self.cooldown_left.saturating_sub(len);
            return None;
        }
        self.since_probe += len;

        if self.state != WakeState::Listening
            || self.since_probe < self.interval_samples
            || self.buffer.len() < self.min_fill_samples
        {
            return None;
        }
        self.since_probe = 0;

        let window = self.buffer.to_vec();
        let level = rms(&window);
        if level < self.config.probe_energy_threshold {
            debug!(rms = level, "wake window too quiet, skipping probe");
            return None;
        }

        let probe_id = self.next_probe_id;
        self.next_probe_id += 1;
        self.in_flight = Some(probe_id);
        self.state = WakeState::Candidate;
        debug!(probe_id, samples = window.len(), "wake probe issued");
        Some(WakeProbe {
            probe_id,
            samples: window,
            sample_rate: self.sample_rate,
        })
    }

    /// Feed back a probe transcription. Fires when a configured phrase is contained in it.
    pub fn on_transcription(&mut self, probe_id: u64, text: &str) -> Option<WakeDetection> {
        if self.in_flight != Some(probe_id) {
            debug!(probe_id, "discarding stale wake probe result");
            return None;
        }
        self.in_flight = None;

        match self.match_phrase(text) {
            Some(phrase) => {
                let detection = WakeDetection {
                    phrase: phrase.to_string(),
                    transcript: text.to_string(),
                    acknowledgment: self.config.acknowledgment.clone(),
                };
                info!(probe_id, "🔔 Wake phrase detected: {} (heard: {})", phrase, text);
                self.buffer.clear();
                self.state = WakeState::Fired;
                Some(detection)
            }
            None => {
                debug!(probe_id, transcript = text, "no wake phrase");
                self.state = WakeState::Listening;
                None
            }
        }
    }

    /// A probe transcription failed or timed out. Returns whether it was still current.
    pub fn on_probe_failed(&mut self, probe_id: u64) -> bool {
        if self.in_flight != Some(probe_id) {
            return false;
        }
        warn!(probe_id, "wake probe transcription failed");
        self.in_flight = None;
        self.state = WakeState::Listening;
        true
    }

    /// First configured phrase contained in the normalized `text`.
    pub fn match_phrase(&self, text: &str) -> Option<&str> {
        let heard = normalize(text);
        if heard.is_empty() {
            return None;
        }
        self.phrases
            .iter()
            .find(|(_, normalized)| heard.contains(normalized.as_str()))
            .map(|(phrase, _)| phrase.as_str())
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.since_probe = 0;
        self.in_flight = None;
    }
}

/// Lowercase and drop whitespace and punctuation, ASCII and Japanese.
pub fn normalize(text: &str) -> String {
    const JA_PUNCT: &str = "、。，．！？「」『』（）・…〜～：；";
    text.chars()
        .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation() && !JA_PUNCT.contains(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn loud(ms: u64) -> Vec<f32> {
        (0..ms_to_samples(ms, RATE))
            .map(|i| 0.2 * (i as f32 * 0.05).sin())
            .collect()
    }

    fn listening() -> WakeWordMonitor {
        let mut monitor = WakeWordMonitor::new(WakeConfig::default(), RATE);
        monitor.start();
        monitor
    }

    #[test]
    fn probes_on_cadence_once_half_full() {
        let mut monitor = listening();
        assert!(monitor.push(&loud(1400)).is_none());
        let probe = monitor.push(&loud(100)).expect("probe after 1.5s");
        assert_eq!(probe.samples.len(), 24000);
        assert_eq!(monitor.state(), WakeState::Candidate);
        // One probe in flight at a time.
        assert!(monitor.push(&loud(1500)).is_none());
    }

    #[test]
    fn quiet_window_is_not_probed() {
        let mut monitor = listening();
        assert!(monitor.push(&vec![0.0; 24000]).is_none());
        assert_eq!(monitor.state(), WakeState::Listening);
    }

    #[test]
    fn fires_on_phrase_inside_noisy_transcript() {
        let mut monitor = listening();
        let probe = monitor.push(&loud(1500)).unwrap();
        let detection = monitor
            .on_transcription(probe.probe_id, "えーと、こんにちは！ザザッ")
            .unwrap();
        assert_eq!(detection.phrase, "こんにちは");
        assert_eq!(detection.acknowledgment, "はい、なんですか");
        assert_eq!(monitor.state(), WakeState::Fired);
        assert!(monitor.push(&loud(3000)).is_none());
    }

    #[test]
    fn empty_or_unrelated_transcript_does_not_fire() {
        let mut monitor = listening();
        let probe = monitor.push(&loud(1500)).unwrap();
        assert!(monitor.on_transcription(probe.probe_id, "").is_none());
        assert_eq!(monitor.state(), WakeState::Listening);
        let probe = monitor.push(&loud(1500)).unwrap();
        assert!(monitor.on_transcription(probe.probe_id, "今日はいい天気").is_none());
    }

    #[test]
    fn first_configured_phrase_wins() {
        let monitor = listening();
        assert_eq!(monitor.match_phrase("シリウスくん、おはよう"), Some("シリウスくん"));
        assert_eq!(monitor.match_phrase("ねえ シリウス さん"), Some("シリウス"));
        assert_eq!(monitor.match_phrase("HELLO"), None);
    }

    #[test]
    fn stale_results_are_ignored_after_stop() {
        let mut monitor = listening();
        let probe = monitor.push(&loud(1500)).unwrap();
        monitor.stop();
        assert!(monitor.on_transcription(probe.probe_id, "こんにちは").is_none());
        assert_eq!(monitor.state(), WakeState::Idle);
        assert!(!monitor.on_probe_failed(probe.probe_id));
    }

    #[test]
    fn resume_applies_cooldown() {
        let mut monitor = listening();
        let probe = monitor.push(&loud(1500)).unwrap();
        monitor.on_transcription(probe.probe_id, "起きて").unwrap();
        monitor.resume();
        assert_eq!(monitor.state(), WakeState::Listening);
        // 2s cooldown, then the 1.5s cadence starts counting.
        assert!(monitor.push(&loud(2000)).is_none());
        assert!(monitor.push(&loud(1400)).is_none());
        assert!(monitor.push(&loud(100)).is_some());
    }

    #[test]
    fn failed_probe_returns_to_listening() {
        let mut monitor = listening();
        let probe = monitor.push(&loud(1500)).unwrap();
        assert!(monitor.on_probe_failed(probe.probe_id));
        assert_eq!(monitor.state(), WakeState::Listening);
    }

    #[test]
    fn normalize_strips_spacing_and_punctuation() {
        assert_eq!(normalize(" Sirius-Kun！ 「こんにちは」"), "siriuskunこんにちは");
        assert_eq!(normalize("　"), "");
    }
}
