//! **TranscriptionQualityTracker**: confidence history and the auto-submit decision.
//!
//! The decision looks only at the new result and the threshold. The bounded history
//! exists for the readings stream the host displays.

use crate::ring::RingBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

/// Quality tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Confidence at or above which results are submitted without confirmation (default: 0.8)
    pub auto_submit_threshold: f32,
    /// Number of recent results kept for statistics (default: 20)
    pub history_len: usize,
    /// Results with fewer characters always need confirmation; 0 disables the check
    pub min_text_chars: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            auto_submit_threshold: 0.8,
            history_len: 20,
            min_text_chars: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionResult {
    pub text: String,
    /// Always within 0.0..=1.0.
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptionResult {
    /// Confidence is clamped into range; NaN becomes 0.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            timestamp: Utc::now(),
        }
    }
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Map a Whisper-style average log-probability to 0..=1: -5 or lower is 0, 0 is 1.
pub fn confidence_from_log_prob(avg_logprob: f64) -> f32 {
    clamp_confidence(((avg_logprob + 5.0) / 5.0) as f32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitDecision {
    AutoSubmit,
    /// Show the text and let the user confirm it. Not an error.
    AwaitConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityStats {
    pub window_len: usize,
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    /// All results recorded, including those evicted from the window.
    pub total_recognitions: u64,
}

/// One entry of the readings stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReading {
    pub result: TranscriptionResult,
    pub decision: SubmitDecision,
    pub stats: QualityStats,
}

pub struct TranscriptionQualityTracker {
    config: QualityConfig,
    history: RingBuffer<TranscriptionResult>,
    total: u64,
    readings: broadcast::Sender<QualityReading>,
}

impl TranscriptionQualityTracker {
    pub fn new(config: QualityConfig) -> Self {
        let (readings, _) = broadcast::channel(64);
        Self {
            history: RingBuffer::new(config.history_len),
            config,
            total: 0,
            readings,
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Pure decision over a single result.
    pub fn decide(&self, result: &TranscriptionResult) -> SubmitDecision {
        let long_enough = result.text.trim().chars().count() >= self.config.min_text_chars;
        if result.confidence >= self.config.auto_submit_threshold && long_enough {
            SubmitDecision::AutoSubmit
        } else {
            SubmitDecision::AwaitConfirmation
        }
    }

    /// Add a result to the history, publish and return the reading.
    pub fn record(&mut self, result: TranscriptionResult) -> QualityReading {
        let decision = self.decide(&result);
        self.history.push(result.clone());
        self.total += 1;
        let stats = self.stats();
        info!(
            confidence = result.confidence,
            ?decision,
            mean = stats.mean,
            "📊 Transcription quality: {}",
            result.text
        );
        let reading = QualityReading {
            result,
            decision,
            stats,
        };
        // No subscribers is fine.
        let _ = self.readings.send(reading.clone());
        reading
    }

    pub fn stats(&self) -> QualityStats {
        let window_len = self.history.len();
        let (sum, min, max) = self.history.iter().fold(
            (0.0f32, f32::INFINITY, f32::NEG_INFINITY),
            |(sum, min, max), r| (sum + r.confidence, min.min(r.confidence), max.max(r.confidence)),
        );
        if window_len == 0 {
            return QualityStats {
                window_len,
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                total_recognitions: self.total,
            };
        }
        QualityStats {
            window_len,
            mean: sum / window_len as f32,
            min,
            max,
            total_recognitions: self.total,
        }
    }

    pub fn history(&self) -> Vec<TranscriptionResult> {
        self.history.to_vec()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QualityReading> {
        self.readings.subscribe()
    }

    /// Sender side of the readings stream, for handles created before any subscriber.
    pub fn readings(&self) -> broadcast::Sender<QualityReading> {
        self.readings.clone()
    }
}
