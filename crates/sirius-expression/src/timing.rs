//! **TimingScheduler**: places validated segments on the speech timeline.
//!
//! Phoneme timing from the synthesizer is the source of truth when present: the total
//! phoneme duration is split across segments in proportion to their character counts.
//! Without it, each character is assumed to take a fixed time.

use crate::config::default_per_char_ms;
use crate::kind::ExpressionKind;
use crate::phoneme::{total_duration, AudioPhonemeUnit};
use crate::validator::ExpressionSegment;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;
use tracing::debug;

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Estimated speaking time per character, used without phoneme data.
    #[serde(default = "default_per_char_ms")]
    pub per_char_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            per_char_ms: default_per_char_ms(),
        }
    }
}

/// Where the offsets came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSource {
    Phonemes,
    Estimated,
}

/// A segment with its place on the audio timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedSegment {
    pub expression: ExpressionKind,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub char_count: usize,
    #[serde(rename = "start_ms", serialize_with = "serialize_millis")]
    pub start: Duration,
    #[serde(rename = "end_ms", serialize_with = "serialize_millis")]
    pub end: Duration,
}

impl TimedSegment {
    fn from_segment(segment: &ExpressionSegment) -> Self {
        Self {
            expression: segment.expression,
            text: segment.text.clone(),
            start_offset: segment.start_offset,
            end_offset: segment.end_offset,
            char_count: segment.char_count(),
            start: Duration::ZERO,
            end: Duration::ZERO,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    fn absorb_front(&mut self, earlier: TimedSegment) {
        self.text.insert_str(0, &earlier.text);
        self.start_offset = earlier.start_offset;
        self.start = earlier.start;
        self.char_count += earlier.char_count;
    }

    fn absorb_back(&mut self, later: TimedSegment) {
        self.text.push_str(&later.text);
        self.end_offset = later.end_offset;
        self.end = later.end;
        self.char_count += later.char_count;
    }
}

/// "Switch the display to `expression` at `at`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineEvent {
    #[serde(rename = "at_ms", serialize_with = "serialize_millis")]
    pub at: Duration,
    pub expression: ExpressionKind,
}

/// Scheduler output. One event per segment, first at zero, strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub segments: Vec<TimedSegment>,
    pub events: Vec<TimelineEvent>,
    #[serde(rename = "total_ms", serialize_with = "serialize_millis")]
    pub total: Duration,
    pub source: TimingSource,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Expression showing at `offset` into playback.
    pub fn expression_at(&self, offset: Duration) -> Option<ExpressionKind> {
        self.events
            .iter()
            .take_while(|event| event.at <= offset)
            .last()
            .map(|event| event.expression)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimingScheduler {
    config: TimingConfig,
}

impl TimingScheduler {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn per_char(&self) -> Duration {
        Duration::from_millis(self.config.per_char_ms)
    }

    /// Assign offsets to `segments`. Phoneme data with a zero total counts as absent.
    pub fn schedule(
        &self,
        segments: &[ExpressionSegment],
        phonemes: Option<&[AudioPhonemeUnit]>,
    ) -> Timeline {
        let working: Vec<TimedSegment> = segments.iter().map(TimedSegment::from_segment).collect();
        let working = merge_same_expression(fold_empty(working, |s| s.char_count == 0));

        let phoneme_total = phonemes.map(total_duration).unwrap_or_default();
        let (mut timed, source) = if phoneme_total > Duration::ZERO {
            (proportional(working, phoneme_total), TimingSource::Phonemes)
        } else {
            if phonemes.is_some() {
                debug!("phoneme data has zero total duration, using character estimate");
            }
            (self.estimated(working), TimingSource::Estimated)
        };

        // Events may not share an offset: a segment that takes no time joins the next one.
        if timed.len() > 1 {
            timed = merge_same_expression(fold_empty(timed, |s| s.duration().is_zero()));
        }

        let total = timed.last().map(|s| s.end).unwrap_or_default();
        let events = timed
            .iter()
            .map(|s| TimelineEvent {
                at: s.start,
                expression: s.expression,
            })
            .collect();

        debug!(
            segments = timed.len(),
            total_ms = total.as_millis() as u64,
            ?source,
            "timeline scheduled"
        );
        Timeline {
            segments: timed,
            events,
            total,
            source,
        }
    }

    fn estimated(&self, mut segments: Vec<TimedSegment>) -> Vec<TimedSegment> {
        let per_char = self.per_char();
        let mut cursor = Duration::ZERO;
        for segment in &mut segments {
            segment.start = cursor;
            let chars = u32::try_from(segment.char_count).unwrap_or(u32::MAX);
            cursor = cursor.saturating_add(per_char.saturating_mul(chars));
            segment.end = cursor;
        }
        segments
    }
}

fn proportional(mut segments: Vec<TimedSegment>, total: Duration) -> Vec<TimedSegment> {
    let total_chars: usize = segments.iter().map(|s| s.char_count).sum();
    if total_chars == 0 {
        // Only possible for a single empty segment; it spans the whole audio.
        for segment in &mut segments {
            segment.end = total;
        }
        return segments;
    }
    let total_nanos = total.as_nanos();
    let at = |chars: usize| -> Duration {
        let nanos = total_nanos * chars as u128 / total_chars as u128;
        // nanos <= total_nanos, so the seconds part always fits.
        Duration::new((nanos / 1_000_000_000) as u64, (nanos % 1_000_000_000) as u32)
    };
    let mut cumulative = 0;
    for segment in &mut segments {
        segment.start = at(cumulative);
        cumulative += segment.char_count;
        segment.end = at(cumulative);
    }
    segments
}

/// Fold segments matching `is_empty` into the following segment, or into the last one
/// when they trail. A lone empty segment is kept.
fn fold_empty(
    segments: Vec<TimedSegment>,
    is_empty: impl Fn(&TimedSegment) -> bool,
) -> Vec<TimedSegment> {
    let mut out: Vec<TimedSegment> = Vec::with_capacity(segments.len());
    let mut carry: Option<TimedSegment> = None;
    for mut segment in segments {
        if let Some(earlier) = carry.take() {
            segment.absorb_front(earlier);
        }
        if is_empty(&segment) {
            carry = Some(segment);
        } else {
            out.push(segment);
        }
    }
    if let Some(trailing) = carry {
        match out.last_mut() {
            Some(last) => last.absorb_back(trailing),
            None => out.push(trailing),
        }
    }
    out
}

fn merge_same_expression(segments: Vec<TimedSegment>) -> Vec<TimedSegment> {
    let mut out: Vec<TimedSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match out.last_mut() {
            Some(last) if last.expression == segment.expression => last.absorb_back(segment),
            _ => out.push(segment),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(expression: ExpressionKind, text: &str, start: usize) -> ExpressionSegment {
        ExpressionSegment {
            expression,
            text: text.to_string(),
            start_offset: start,
            end_offset: start + text.len(),
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn estimate_uses_per_char_duration() {
        let segments = vec![
            seg(ExpressionKind::Neutral, "0123456789", 0),
            seg(ExpressionKind::Happy, "01234567890123456789", 10),
        ];
        let timeline = TimingScheduler::default().schedule(&segments, None);
        assert_eq!(timeline.source, TimingSource::Estimated);
        let offsets: Vec<Duration> = timeline.events.iter().map(|e| e.at).collect();
        assert_eq!(offsets, vec![ms(0), ms(1500)]);
        assert_eq!(timeline.total, ms(4500));
    }

    #[test]
    fn phonemes_split_proportionally() {
        let segments = vec![
            seg(ExpressionKind::Happy, "abcd", 0),
            seg(ExpressionKind::Sad, "efgh", 4),
        ];
        let phonemes = vec![
            AudioPhonemeUnit::new("a", ms(500)),
            AudioPhonemeUnit::new("i", ms(1500)),
        ];
        let timeline = TimingScheduler::default().schedule(&segments, Some(&phonemes));
        assert_eq!(timeline.source, TimingSource::Phonemes);
        assert_eq!(timeline.events[0].at, ms(0));
        assert_eq!(timeline.events[1].at, ms(1000));
        assert_eq!(timeline.total, ms(2000));
    }

    #[test]
    fn zero_total_phonemes_fall_back_to_estimate() {
        let segments = vec![seg(ExpressionKind::Neutral, "abc", 0)];
        let phonemes = vec![AudioPhonemeUnit::new("pau", Duration::ZERO)];
        let timeline = TimingScheduler::default().schedule(&segments, Some(&phonemes));
        assert_eq!(timeline.source, TimingSource::Estimated);
        assert_eq!(timeline.total, ms(450));
    }

    #[test]
    fn whitespace_segment_merges_forward() {
        let segments = vec![
            seg(ExpressionKind::Happy, "やった", 0),
            seg(ExpressionKind::Neutral, "  \n", 9),
            seg(ExpressionKind::Sad, "でも", 12),
        ];
        let timeline = TimingScheduler::default().schedule(&segments, None);
        assert_eq!(timeline.segments.len(), 2);
        assert_eq!(timeline.segments[1].expression, ExpressionKind::Sad);
        assert_eq!(timeline.segments[1].text, "  \nでも");
        assert_eq!(timeline.segments[1].start_offset, 9);
        assert_eq!(timeline.events[1].at, ms(450));
    }

    #[test]
    fn trailing_whitespace_merges_backward_and_same_kinds_join() {
        let segments = vec![
            seg(ExpressionKind::Happy, "a", 0),
            seg(ExpressionKind::Neutral, " ", 1),
            seg(ExpressionKind::Happy, "b", 2),
            seg(ExpressionKind::Sad, " ", 3),
        ];
        let timeline = TimingScheduler::default().schedule(&segments, None);
        assert_eq!(timeline.segments.len(), 1);
        assert_eq!(timeline.segments[0].text, "a b ");
        assert_eq!(timeline.segments[0].end_offset, 4);
        assert_eq!(timeline.events.len(), 1);
    }

    #[test]
    fn zero_per_char_collapses_to_one_event() {
        let scheduler = TimingScheduler::new(TimingConfig { per_char_ms: 0 });
        let segments = vec![
            seg(ExpressionKind::Happy, "a", 0),
            seg(ExpressionKind::Sad, "b", 1),
        ];
        let timeline = scheduler.schedule(&segments, None);
        assert_eq!(timeline.events.len(), 1);
        assert_eq!(timeline.events[0].at, Duration::ZERO);
    }

    #[test]
    fn huge_per_char_saturates_instead_of_overflowing() {
        let scheduler = TimingScheduler::new(TimingConfig { per_char_ms: u64::MAX });
        let segments = vec![
            seg(ExpressionKind::Neutral, &"a".repeat(10), 0),
            seg(ExpressionKind::Happy, &"b".repeat(2000), 10),
        ];
        let timeline = scheduler.schedule(&segments, None);
        let offsets: Vec<Duration> = timeline.events.iter().map(|e| e.at).collect();
        assert_eq!(offsets, vec![Duration::ZERO, Duration::from_millis(u64::MAX) * 10]);
        assert_eq!(timeline.total, Duration::MAX);
    }

    #[test]
    fn huge_phoneme_total_splits_without_truncation() {
        let segments = vec![
            seg(ExpressionKind::Happy, "ab", 0),
            seg(ExpressionKind::Sad, "cd", 2),
        ];
        let phonemes = vec![
            AudioPhonemeUnit::new("a", Duration::MAX),
            AudioPhonemeUnit::new("i", Duration::MAX),
        ];
        let timeline = TimingScheduler::default().schedule(&segments, Some(&phonemes));
        assert_eq!(timeline.total, Duration::MAX);
        let half = timeline.events[1].at;
        assert!(half > Duration::from_secs(u64::MAX / 2 - 1));
        assert!(half < Duration::MAX);
    }

    #[test]
    fn events_strictly_increase() {
        let segments: Vec<ExpressionSegment> = ExpressionKind::ALL
            .iter()
            .enumerate()
            .map(|(i, kind)| seg(*kind, &"x".repeat(i + 1), i * 10))
            .collect();
        let phonemes = vec![AudioPhonemeUnit::new("a", Duration::from_nanos(7_777_777))];
        for phonemes in [None, Some(phonemes.as_slice())] {
            let timeline = TimingScheduler::default().schedule(&segments, phonemes);
            assert_eq!(timeline.events[0].at, Duration::ZERO);
            assert!(timeline.events.windows(2).all(|w| w[0].at < w[1].at));
            assert_eq!(timeline.events.len(), timeline.segments.len());
        }
    }

    #[test]
    fn expression_at_follows_events() {
        let segments = vec![
            seg(ExpressionKind::Happy, "ab", 0),
            seg(ExpressionKind::Sad, "cd", 2),
        ];
        let timeline = TimingScheduler::default().schedule(&segments, None);
        assert_eq!(timeline.expression_at(ms(0)), Some(ExpressionKind::Happy));
        assert_eq!(timeline.expression_at(ms(299)), Some(ExpressionKind::Happy));
        assert_eq!(timeline.expression_at(ms(300)), Some(ExpressionKind::Sad));
    }

    #[test]
    fn empty_input_gives_empty_timeline() {
        let timeline = TimingScheduler::default().schedule(&[], None);
        assert!(timeline.is_empty());
        assert_eq!(timeline.total, Duration::ZERO);
    }
}
