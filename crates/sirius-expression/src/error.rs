//! Error types for the expression pipeline

use thiserror::Error;

/// Errors raised at the collaborator boundaries.
///
/// Tag parsing and validation never fail; malformed markup is corrected and reported
/// as [`crate::Correction`] values instead.
#[derive(Error, Debug)]
pub enum ExpressionError {
    #[error("Display error: {0}")]
    Display(String),

    #[error("Invalid audio query: {0}")]
    AudioQuery(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
