//! Phoneme timing supplied by the synthesis collaborator.
//!
//! The synthesis engine may return per-phoneme durations alongside audio. The VOICEVOX
//! `AudioQuery` document is the format we receive in practice, so it is decoded here and
//! flattened into [`AudioPhonemeUnit`]s.

use crate::error::ExpressionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Symbol used for silence units.
pub const PAUSE: &str = "pau";

/// One phoneme and how long it sounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPhonemeUnit {
    pub phoneme: String,
    pub duration: Duration,
}

impl AudioPhonemeUnit {
    pub fn new(phoneme: impl Into<String>, duration: Duration) -> Self {
        Self {
            phoneme: phoneme.into(),
            duration,
        }
    }

    pub fn is_pause(&self) -> bool {
        self.phoneme == PAUSE
    }
}

/// Sum of all unit durations.
pub fn total_duration(units: &[AudioPhonemeUnit]) -> Duration {
    units
        .iter()
        .fold(Duration::ZERO, |acc, u| acc.saturating_add(u.duration))
}

/// A single mora of an accent phrase. Lengths are seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mora {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub consonant: Option<String>,
    #[serde(default)]
    pub consonant_length: Option<f64>,
    #[serde(default)]
    pub vowel: String,
    #[serde(default)]
    pub vowel_length: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccentPhrase {
    #[serde(default)]
    pub moras: Vec<Mora>,
    #[serde(default)]
    pub pause_mora: Option<Mora>,
}

fn one() -> f64 {
    1.0
}

/// VOICEVOX synthesis query. Unknown fields (pitch, intonation, volume...) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioQuery {
    #[serde(default)]
    pub accent_phrases: Vec<AccentPhrase>,
    #[serde(rename = "speedScale", default = "one")]
    pub speed_scale: f64,
    #[serde(rename = "prePhonemeLength", default)]
    pub pre_phoneme_length: f64,
    #[serde(rename = "postPhonemeLength", default)]
    pub post_phoneme_length: f64,
}

impl AudioQuery {
    pub fn from_json(json: &str) -> Result<Self, ExpressionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Flatten the query into phoneme units: consonant then vowel for each mora, a
    /// `pau` unit for each phrase pause, and `pau` units for leading and trailing
    /// silence. Lengths are divided by the speed scale.
    pub fn phoneme_units(&self) -> Vec<AudioPhonemeUnit> {
        let speed = if self.speed_scale > 0.0 {
            self.speed_scale
        } else {
            1.0
        };
        let mut units = Vec::new();
        let mut push = |phoneme: &str, seconds: f64| {
            if seconds.is_nan() || seconds <= 0.0 {
                return;
            }
            // Lengths that do not fit a Duration after scaling are dropped.
            match Duration::try_from_secs_f64(seconds / speed) {
                Ok(duration) if !duration.is_zero() => {
                    units.push(AudioPhonemeUnit::new(phoneme, duration));
                }
                Ok(_) => {}
                Err(e) => warn!(phoneme, seconds, speed, "skipping phoneme length: {}", e),
            }
        };

        push(PAUSE, self.pre_phoneme_length);
        for phrase in &self.accent_phrases {
            for mora in &phrase.moras {
                if let Some(consonant) = mora.consonant.as_deref().filter(|c| !c.is_empty()) {
                    push(consonant, mora.consonant_length.unwrap_or(0.0));
                }
                if !mora.vowel.is_empty() {
                    push(&mora.vowel, mora.vowel_length);
                }
            }
            if let Some(pause) = &phrase.pause_mora {
                push(PAUSE, pause.vowel_length);
            }
        }
        push(PAUSE, self.post_phoneme_length);
        units
    }
}
