//! The closed set of facial expressions the display can show.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A facial expression understood by the display collaborator.
///
/// Tag names in model output map onto these variants; anything else is either
/// corrected by the validator or downgraded to plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionKind {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Crying,
    Hurt,
    Wink,
    /// The "special mouth" face, tagged `<mouth3>` by the model.
    Mouth3,
    Pien,
}

impl ExpressionKind {
    /// Every kind, in declaration order. Fuzzy matching breaks ties by this order.
    pub const ALL: [ExpressionKind; 10] = [
        ExpressionKind::Neutral,
        ExpressionKind::Happy,
        ExpressionKind::Sad,
        ExpressionKind::Angry,
        ExpressionKind::Surprised,
        ExpressionKind::Crying,
        ExpressionKind::Hurt,
        ExpressionKind::Wink,
        ExpressionKind::Mouth3,
        ExpressionKind::Pien,
    ];

    /// Canonical tag name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpressionKind::Neutral => "neutral",
            ExpressionKind::Happy => "happy",
            ExpressionKind::Sad => "sad",
            ExpressionKind::Angry => "angry",
            ExpressionKind::Surprised => "surprised",
            ExpressionKind::Crying => "crying",
            ExpressionKind::Hurt => "hurt",
            ExpressionKind::Wink => "wink",
            ExpressionKind::Mouth3 => "mouth3",
            ExpressionKind::Pien => "pien",
        }
    }

    /// Exact lookup of a canonical name after trimming and lowercasing.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
    }
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`ExpressionKind::from_str`] for names outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown expression: {0}")]
pub struct UnknownExpression(pub String);

impl FromStr for ExpressionKind {
    type Err = UnknownExpression;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownExpression(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ExpressionKind::ALL {
            assert_eq!(ExpressionKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn from_name_normalizes_case_and_whitespace() {
        assert_eq!(ExpressionKind::from_name("  HAPPY "), Some(ExpressionKind::Happy));
        assert_eq!(ExpressionKind::from_name("Mouth3"), Some(ExpressionKind::Mouth3));
        assert_eq!(ExpressionKind::from_name("thinking"), None);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ExpressionKind::Pien).unwrap();
        assert_eq!(json, "\"pien\"");
        let back: ExpressionKind = serde_json::from_str("\"surprised\"").unwrap();
        assert_eq!(back, ExpressionKind::Surprised);
    }

    #[test]
    fn default_is_neutral() {
        assert_eq!(ExpressionKind::default(), ExpressionKind::Neutral);
        assert!("excited".parse::<ExpressionKind>().is_err());
    }
}
