//! Configuration for the expression pipeline.

use crate::kind::ExpressionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub(crate) fn default_per_char_ms() -> u64 {
    150
}

fn default_true() -> bool {
    true
}

/// Expression pipeline settings.
///
/// | Key | Default | Description |
/// |-----|---------|-------------|
/// | per_char_ms | 150 | Estimated speech time per character when no phoneme timing is available. |
/// | aliases | {} | Extra tag-name aliases, merged over the built-in table. |
/// | fuzzy_matching | true | Map misspelled tag names to the nearest known expression. |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionConfig {
    #[serde(default = "default_per_char_ms")]
    pub per_char_ms: u64,
    #[serde(default)]
    pub aliases: BTreeMap<String, ExpressionKind>,
    #[serde(default = "default_true")]
    pub fuzzy_matching: bool,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            per_char_ms: default_per_char_ms(),
            aliases: BTreeMap::new(),
            fuzzy_matching: true,
        }
    }
}
