//! # Sirius Expression - Speech-Synchronized Facial Expressions
//!
//! Turns annotated language-model output into marker-free text for synthesis plus a
//! timeline of expression changes that runs in lockstep with the spoken audio.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      Response Processor                        │
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────────────┐     │
//! │  │ TagParser  │ → │ TagValidator │ → │ TimingScheduler  │     │
//! │  │ (<happy>…) │   │ alias / fuzzy│   │ phonemes or 150ms│     │
//! │  └────────────┘   └──────────────┘   └──────────────────┘     │
//! │                                               ↓               │
//! │                                     ┌──────────────────┐      │
//! │                 Display  ←──────────│  TimelinePlayer  │      │
//! │                                     └──────────────────┘      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Malformed markup never fails the pipeline. It is repaired, and every repair is
//! returned as a [`Correction`].

pub mod config;
pub mod display;
pub mod error;
pub mod kind;
pub mod parser;
pub mod phoneme;
pub mod pipeline;
pub mod timing;
pub mod validator;

pub use config::ExpressionConfig;
pub use display::{
    never_cancel, ExpressionDisplay, LoggingDisplay, PlaybackReport, RecordingDisplay,
    TimelinePlayer,
};
pub use error::ExpressionError;
pub use kind::{ExpressionKind, UnknownExpression};
pub use parser::{MarkupRole, RawTag, StrayReason, TagParser, Token};
pub use phoneme::{total_duration, AudioPhonemeUnit, AudioQuery};
pub use pipeline::{PreparedResponse, ProcessedResponse, ResponseProcessor};
pub use timing::{TimedSegment, Timeline, TimelineEvent, TimingConfig, TimingScheduler, TimingSource};
pub use validator::{
    clean_text, Correction, ExpressionSegment, Resolution, TagValidator, Validation,
};
