//! Layered daemon configuration: defaults, then an optional TOML file, then `SIRIUS__*`
//! environment variables.

use serde::{Deserialize, Serialize};
use sirius_expression::ExpressionConfig;
use sirius_voice::VoiceConfig;
use std::path::Path;

/// Used when `SIRIUS_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/sirius.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiriusConfig {
    pub expression: ExpressionConfig,
    pub voice: VoiceConfig,
}

impl SiriusConfig {
    /// Precedence: env `SIRIUS__SECTION__KEY` > file at `SIRIUS_CONFIG` (or
    /// `config/sirius.toml`) > defaults. A missing file is not an error.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path =
            std::env::var("SIRIUS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            tracing::debug!(path = %path.display(), "reading config file");
            builder.add_source(config::File::from(path))
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            builder
        };

        builder
            .add_source(config::Environment::with_prefix("SIRIUS").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = SiriusConfig::load_from(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(cfg.expression.per_char_ms, 150);
        assert_eq!(cfg.voice.stt_timeout_ms, 30_000);
        assert_eq!(cfg.voice.wake.phrases.len(), 9);
    }

    #[test]
    fn file_overrides_selected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sirius.toml");
        std::fs::write(
            &path,
            r#"
[expression]
per_char_ms = 120

[voice]
stt_timeout_ms = 10000

[voice.wake]
phrases = ["ねえシリウス"]
cooldown_ms = 3000
"#,
        )
        .unwrap();

        let cfg = SiriusConfig::load_from(&path).unwrap();

        assert_eq!(cfg.expression.per_char_ms, 120);
        assert!(cfg.expression.fuzzy_matching);
        assert_eq!(cfg.voice.stt_timeout_ms, 10_000);
        assert_eq!(cfg.voice.wake.phrases, vec!["ねえシリウス".to_string()]);
        assert_eq!(cfg.voice.wake.cooldown_ms, 3000);
        assert_eq!(cfg.voice.wake.buffer_ms, 3000);
        assert_eq!(cfg.voice.vad.silence_stop_ms, 2000);
    }

    #[test]
    fn shipped_config_parses() {
        let text = include_str!("../../../config/sirius.toml");
        let cfg: SiriusConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.voice.sample_rate(), 16000);
        assert_eq!(cfg.voice.wake.acknowledgment, "はい、なんですか");
        assert!((cfg.voice.quality.auto_submit_threshold - 0.8).abs() < 1e-6);
    }
}
