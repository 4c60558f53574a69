//! "Process response text": parse → validate → schedule for one model response.

use crate::config::ExpressionConfig;
use crate::parser::TagParser;
use crate::phoneme::AudioPhonemeUnit;
use crate::timing::{Timeline, TimelineEvent, TimingConfig, TimingScheduler};
use crate::validator::{clean_text, Correction, ExpressionSegment, TagValidator};
use serde::Serialize;
use tracing::info;

/// Validated response, ready for synthesis. Timing is assigned once the synthesizer
/// has reported (or failed to report) phoneme data.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedResponse {
    pub segments: Vec<ExpressionSegment>,
    pub clean_text: String,
    pub corrections: Vec<Correction>,
    #[serde(skip)]
    scheduler: TimingScheduler,
}

impl PreparedResponse {
    pub fn schedule(self, phonemes: Option<&[AudioPhonemeUnit]>) -> ProcessedResponse {
        let timeline = self.scheduler.schedule(&self.segments, phonemes);
        ProcessedResponse {
            clean_text: self.clean_text,
            timeline,
            corrections: self.corrections,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedResponse {
    /// Marker-free text for speech synthesis.
    pub clean_text: String,
    pub timeline: Timeline,
    pub corrections: Vec<Correction>,
}

impl ProcessedResponse {
    pub fn events(&self) -> &[TimelineEvent] {
        &self.timeline.events
    }
}

#[derive(Debug, Clone)]
pub struct ResponseProcessor {
    parser: TagParser,
    validator: TagValidator,
    scheduler: TimingScheduler,
}

impl Default for ResponseProcessor {
    fn default() -> Self {
        Self::new(ExpressionConfig::default())
    }
}

impl ResponseProcessor {
    pub fn new(config: ExpressionConfig) -> Self {
        Self {
            parser: TagParser::new(),
            validator: TagValidator::new(&config),
            scheduler: TimingScheduler::new(TimingConfig {
                per_char_ms: config.per_char_ms,
            }),
        }
    }

    pub fn prepare(&self, raw: &str) -> PreparedResponse {
        let tokens = self.parser.parse(raw);
        let validation = self.validator.validate(raw, &tokens);
        if !validation.corrections.is_empty() {
            info!(
                corrections = validation.corrections.len(),
                "🩹 Repaired expression markup in response"
            );
        }
        PreparedResponse {
            clean_text: clean_text(&validation.segments),
            segments: validation.segments,
            corrections: validation.corrections,
            scheduler: self.scheduler.clone(),
        }
    }

    pub fn process(&self, raw: &str, phonemes: Option<&[AudioPhonemeUnit]>) -> ProcessedResponse {
        self.prepare(raw).schedule(phonemes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ExpressionKind;
    use std::time::Duration;

    #[test]
    fn process_returns_clean_text_and_events() {
        let processor = ResponseProcessor::default();
        let response = processor.process("<happy>こんにちは</happy><sad>またね</sad>", None);
        assert_eq!(response.clean_text, "こんにちはまたね");
        let events = response.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].expression, ExpressionKind::Happy);
        assert_eq!(events[1].at, Duration::from_millis(750));
        assert!(response.corrections.is_empty());
    }

    #[test]
    fn configured_per_char_reaches_scheduler() {
        let processor = ResponseProcessor::new(ExpressionConfig {
            per_char_ms: 100,
            ..Default::default()
        });
        let response = processor.process("ab<wink>c</wink>", None);
        assert_eq!(response.events()[1].at, Duration::from_millis(200));
    }

    #[test]
    fn prepared_response_serializes_without_scheduler() {
        let prepared = ResponseProcessor::default().prepare("<smile>hi</smile>");
        let json = serde_json::to_value(&prepared).unwrap();
        assert_eq!(json["clean_text"], "hi");
        assert_eq!(json["corrections"][0]["kind"], "aliased");
        assert!(json.get("scheduler").is_none());
    }
}
