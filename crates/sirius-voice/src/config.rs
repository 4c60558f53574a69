//! Voice pipeline configuration.

use crate::quality::QualityConfig;
use crate::session::RecordingConfig;
use crate::vad::VadConfig;
use crate::wake::WakeConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything the coordinator needs. `vad.sample_rate` is the rate of the whole pipeline.
///
/// | Key | Default | Description |
/// |-----|---------|-------------|
/// | vad | see [`VadConfig`] | Energy gate and stop thresholds. |
/// | wake | see [`WakeConfig`] | Phrases, buffer and probe cadence. |
/// | recording | see [`RecordingConfig`] | Min/max recording length. |
/// | quality | see [`QualityConfig`] | Auto-submit threshold and history. |
/// | stt_timeout_ms | 30000 | Upper bound on one utterance transcription. |
/// | mute_wake_during_playback | true | Suspend wake buffering while the assistant speaks. |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub vad: VadConfig,
    pub wake: WakeConfig,
    pub recording: RecordingConfig,
    pub quality: QualityConfig,
    pub stt_timeout_ms: u64,
    pub mute_wake_during_playback: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            wake: WakeConfig::default(),
            recording: RecordingConfig::default(),
            quality: QualityConfig::default(),
            stt_timeout_ms: 30_000,
            mute_wake_during_playback: true,
        }
    }
}

impl VoiceConfig {
    pub fn sample_rate(&self) -> u32 {
        self.vad.sample_rate
    }

    pub fn stt_timeout(&self) -> Duration {
        Duration::from_millis(self.stt_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.wake.probe_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = VoiceConfig::default();
        assert_eq!(c.sample_rate(), 16000);
        assert_eq!(c.vad.silence_stop_ms, 2000);
        assert_eq!(c.vad.min_recording_ms, 1000);
        assert_eq!(c.wake.buffer_ms, 3000);
        assert_eq!(c.wake.check_interval_ms, 1500);
        assert_eq!(c.recording.max_duration_ms, 30_000);
        assert!((c.quality.auto_submit_threshold - 0.8).abs() < 1e-6);
        assert_eq!(c.quality.history_len, 20);
        assert!(c.mute_wake_during_playback);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: VoiceConfig = serde_json::from_str(
            r#"{"wake": {"phrases": ["ねえ"]}, "quality": {"auto_submit_threshold": 0.9}}"#,
        )
        .unwrap();
        assert_eq!(c.wake.phrases, vec!["ねえ".to_string()]);
        assert_eq!(c.wake.cooldown_ms, 2000);
        assert!((c.quality.auto_submit_threshold - 0.9).abs() < 1e-6);
        assert_eq!(c.quality.history_len, 20);
        assert_eq!(c.stt_timeout_ms, 30_000);
    }
}
