//! **TagValidator**: resolves marker names to [`ExpressionKind`] and repairs
//! whatever the model got wrong, then folds tokens into contiguous segments.
//!
//! Resolution order for a marker name: canonical name → alias table → nearest
//! canonical name by edit distance → downgrade to plain text. Text content is never
//! dropped; only markup is.

use crate::config::ExpressionConfig;
use crate::kind::ExpressionKind;
use crate::parser::{MarkupRole, StrayReason, Token};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use tracing::debug;

/// Built-in aliases for names models commonly emit instead of the canonical ones.
///
/// `thinking`, `excited`, `confused` and `sleepy` are deliberately absent: the display
/// has no face for them, so they downgrade to plain text.
const BUILTIN_ALIASES: &[(&str, ExpressionKind)] = &[
    ("normal", ExpressionKind::Neutral),
    ("default", ExpressionKind::Neutral),
    ("calm", ExpressionKind::Neutral),
    ("plain", ExpressionKind::Neutral),
    ("smile", ExpressionKind::Happy),
    ("smiling", ExpressionKind::Happy),
    ("joy", ExpressionKind::Happy),
    ("joyful", ExpressionKind::Happy),
    ("glad", ExpressionKind::Happy),
    ("laugh", ExpressionKind::Happy),
    ("laughing", ExpressionKind::Happy),
    ("cheerful", ExpressionKind::Happy),
    ("delighted", ExpressionKind::Happy),
    ("笑顔", ExpressionKind::Happy),
    ("sorrow", ExpressionKind::Sad),
    ("sadness", ExpressionKind::Sad),
    ("unhappy", ExpressionKind::Sad),
    ("lonely", ExpressionKind::Sad),
    ("gloomy", ExpressionKind::Sad),
    ("悲しい", ExpressionKind::Sad),
    ("anger", ExpressionKind::Angry),
    ("mad", ExpressionKind::Angry),
    ("annoyed", ExpressionKind::Angry),
    ("furious", ExpressionKind::Angry),
    ("irritated", ExpressionKind::Angry),
    ("grumpy", ExpressionKind::Angry),
    ("怒り", ExpressionKind::Angry),
    ("surprise", ExpressionKind::Surprised),
    ("shocked", ExpressionKind::Surprised),
    ("shock", ExpressionKind::Surprised),
    ("astonished", ExpressionKind::Surprised),
    ("amazed", ExpressionKind::Surprised),
    ("驚き", ExpressionKind::Surprised),
    ("cry", ExpressionKind::Crying),
    ("tears", ExpressionKind::Crying),
    ("tearful", ExpressionKind::Crying),
    ("sob", ExpressionKind::Crying),
    ("sobbing", ExpressionKind::Crying),
    ("weeping", ExpressionKind::Crying),
    ("泣き", ExpressionKind::Crying),
    ("pain", ExpressionKind::Hurt),
    ("painful", ExpressionKind::Hurt),
    ("ouch", ExpressionKind::Hurt),
    ("wounded", ExpressionKind::Hurt),
    ("winking", ExpressionKind::Wink),
    ("playful", ExpressionKind::Wink),
    ("teasing", ExpressionKind::Wink),
    ("special-mouth", ExpressionKind::Mouth3),
    ("special_mouth", ExpressionKind::Mouth3),
    ("specialmouth", ExpressionKind::Mouth3),
    ("mouth", ExpressionKind::Mouth3),
    ("mouth_3", ExpressionKind::Mouth3),
    ("mouth-3", ExpressionKind::Mouth3),
    ("pleading", ExpressionKind::Pien),
    ("puppy", ExpressionKind::Pien),
    ("puppy_eyes", ExpressionKind::Pien),
    ("うるうる", ExpressionKind::Pien),
    ("ぴえん", ExpressionKind::Pien),
];

/// Names shorter than this are only accepted exactly or through an alias.
const MIN_FUZZY_CHARS: usize = 3;

/// A span of source text shown with one expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionSegment {
    pub expression: ExpressionKind,
    /// Marker-free text to be spoken.
    pub text: String,
    /// Byte offset of the first source byte covered (markup included).
    pub start_offset: usize,
    /// Byte offset one past the last source byte covered.
    pub end_offset: usize,
}

impl ExpressionSegment {
    /// Characters that take speaking time: the trimmed text.
    pub fn char_count(&self) -> usize {
        self.text.trim().chars().count()
    }

    pub fn source_span(&self) -> Range<usize> {
        self.start_offset..self.end_offset
    }
}

/// One repair made while validating. Emitted for observability; never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    /// Name found in the alias table.
    Aliased {
        from: String,
        to: ExpressionKind,
        span: Range<usize>,
    },
    /// Misspelled name mapped to the nearest canonical name.
    FuzzyMatched {
        from: String,
        to: ExpressionKind,
        distance: usize,
        span: Range<usize>,
    },
    /// Unknown name; markup dropped, content kept as plain text.
    Downgraded { from: String, span: Range<usize> },
    /// `<name>…<name>` read as `<name>…</name>`.
    RepairedClose { name: String, span: Range<usize> },
    /// Opening marker never closed. Kept as literal text when the name is known,
    /// dropped (with a `Downgraded` entry) otherwise.
    Unterminated { name: String, span: Range<usize> },
    /// Closing marker without an opening one; dropped like other markup.
    StrayClose { name: String, span: Range<usize> },
}

/// How a marker name resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Exact(ExpressionKind),
    Alias(ExpressionKind),
    Fuzzy(ExpressionKind, usize),
    Unknown,
}

impl Resolution {
    pub fn kind(&self) -> Option<ExpressionKind> {
        match self {
            Resolution::Exact(kind) | Resolution::Alias(kind) | Resolution::Fuzzy(kind, _) => {
                Some(*kind)
            }
            Resolution::Unknown => None,
        }
    }
}

/// Output of [`TagValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub segments: Vec<ExpressionSegment>,
    pub corrections: Vec<Correction>,
}

impl Validation {
    /// Marker-free text for speech synthesis.
    pub fn clean_text(&self) -> String {
        clean_text(&self.segments)
    }
}

/// Concatenate segment texts.
pub fn clean_text(segments: &[ExpressionSegment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// Validates parsed tokens against the closed expression set.
#[derive(Debug, Clone)]
pub struct TagValidator {
    aliases: BTreeMap<String, ExpressionKind>,
    fuzzy_matching: bool,
}

impl Default for TagValidator {
    fn default() -> Self {
        Self::new(&ExpressionConfig::default())
    }
}

impl TagValidator {
    pub fn new(config: &ExpressionConfig) -> Self {
        let mut aliases: BTreeMap<String, ExpressionKind> = BUILTIN_ALIASES
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect();
        for (name, kind) in &config.aliases {
            aliases.insert(name.trim().to_lowercase(), *kind);
        }
        Self {
            aliases,
            fuzzy_matching: config.fuzzy_matching,
        }
    }

    /// Resolve a single marker name.
    pub fn resolve(&self, name: &str) -> Resolution {
        let normalized = name.trim().to_lowercase();
        if let Some(kind) = ExpressionKind::from_name(&normalized) {
            return Resolution::Exact(kind);
        }
        if let Some(kind) = self.aliases.get(&normalized) {
            return Resolution::Alias(*kind);
        }
        if self.fuzzy_matching {
            if let Some((kind, distance)) = nearest_kind(&normalized) {
                return Resolution::Fuzzy(kind, distance);
            }
        }
        Resolution::Unknown
    }

    /// Fold `tokens` (from [`crate::TagParser`]) over `source` into segments.
    pub fn validate(&self, source: &str, tokens: &[Token]) -> Validation {
        let mut corrections = Vec::new();
        let mut cache: HashMap<String, Resolution> = HashMap::new();
        // Resolved kind of each open marker; None for downgraded ones.
        let mut open: Vec<Option<ExpressionKind>> = Vec::new();
        let mut builder = SegmentBuilder::default();

        for token in tokens {
            match token {
                Token::Text { span, .. } => {
                    let current = current_kind(&open);
                    builder.push_text(current, &source[span.clone()], span.clone());
                }
                Token::Markup { span, tag, role } => {
                    builder.push_markup(span.clone());
                    match role {
                        MarkupRole::Open => {
                            let key = tag.normalized_name();
                            let resolution = *cache
                                .entry(key)
                                .or_insert_with(|| self.resolve(&tag.name));
                            record_resolution(&mut corrections, &tag.name, &tag.span, resolution);
                            open.push(resolution.kind());
                        }
                        MarkupRole::Close => {
                            open.pop();
                        }
                        MarkupRole::RepairedClose => {
                            open.pop();
                            push_correction(
                                &mut corrections,
                                Correction::RepairedClose {
                                    name: tag.name.clone(),
                                    span: span.clone(),
                                },
                            );
                        }
                    }
                }
                Token::Stray {
                    span, name, reason, ..
                } => {
                    // Only an unclosed marker with a known name stays as literal text.
                    // Orphan closes and unknown names are dropped like any other markup.
                    let correction = match reason {
                        StrayReason::Unterminated => {
                            let resolution = *cache
                                .entry(name.trim().to_lowercase())
                                .or_insert_with(|| self.resolve(name));
                            if resolution.kind().is_some() {
                                let current = current_kind(&open);
                                builder.push_text(current, &source[span.clone()], span.clone());
                            } else {
                                record_resolution(&mut corrections, name, span, resolution);
                                builder.push_markup(span.clone());
                            }
                            Correction::Unterminated {
                                name: name.clone(),
                                span: span.clone(),
                            }
                        }
                        StrayReason::UnmatchedClose => {
                            builder.push_markup(span.clone());
                            Correction::StrayClose {
                                name: name.clone(),
                                span: span.clone(),
                            }
                        }
                    };
                    push_correction(&mut corrections, correction);
                }
            }
        }

        Validation {
            segments: builder.finish(source.len()),
            corrections,
        }
    }
}

fn current_kind(open: &[Option<ExpressionKind>]) -> ExpressionKind {
    open.iter()
        .rev()
        .find_map(|kind| *kind)
        .unwrap_or(ExpressionKind::Neutral)
}

fn record_resolution(
    corrections: &mut Vec<Correction>,
    name: &str,
    span: &Range<usize>,
    resolution: Resolution,
) {
    let correction = match resolution {
        Resolution::Exact(_) => return,
        Resolution::Alias(to) => Correction::Aliased {
            from: name.to_string(),
            to,
            span: span.clone(),
        },
        Resolution::Fuzzy(to, distance) => Correction::FuzzyMatched {
            from: name.to_string(),
            to,
            distance,
            span: span.clone(),
        },
        Resolution::Unknown => Correction::Downgraded {
            from: name.to_string(),
            span: span.clone(),
        },
    };
    push_correction(corrections, correction);
}

fn push_correction(corrections: &mut Vec<Correction>, correction: Correction) {
    debug!(?correction, "expression tag corrected");
    corrections.push(correction);
}

/// Nearest canonical name within the allowed edit distance.
fn nearest_kind(name: &str) -> Option<(ExpressionKind, usize)> {
    let len = name.chars().count();
    if len < MIN_FUZZY_CHARS {
        return None;
    }
    let limit = if len >= 6 { 2 } else { 1 };
    let mut best: Option<(ExpressionKind, usize)> = None;
    for kind in ExpressionKind::ALL {
        let distance = levenshtein(name, kind.as_str());
        if distance <= limit && best.map_or(true, |(_, d)| distance < d) {
            best = Some((kind, distance));
        }
    }
    best
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Accumulates contiguous segments; markup is absorbed into the next text.
#[derive(Default)]
struct SegmentBuilder {
    segments: Vec<ExpressionSegment>,
    pending_markup: Option<usize>,
}

impl SegmentBuilder {
    fn push_markup(&mut self, span: Range<usize>) {
        self.pending_markup.get_or_insert(span.start);
    }

    fn push_text(&mut self, expression: ExpressionKind, text: &str, span: Range<usize>) {
        let start = self.pending_markup.take().unwrap_or(span.start);
        match self.segments.last_mut() {
            Some(last) if last.expression == expression => {
                last.text.push_str(text);
                last.end_offset = span.end;
            }
            _ => self.segments.push(ExpressionSegment {
                expression,
                text: text.to_string(),
                start_offset: start,
                end_offset: span.end,
            }),
        }
    }

    fn finish(mut self, source_len: usize) -> Vec<ExpressionSegment> {
        if self.pending_markup.take().is_some() {
            match self.segments.last_mut() {
                Some(last) => last.end_offset = source_len,
                None => self.segments.push(ExpressionSegment {
                    expression: ExpressionKind::Neutral,
                    text: String::new(),
                    start_offset: 0,
                    end_offset: source_len,
                }),
            }
        }
        self.segments
    }
}
