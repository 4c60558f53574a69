//! **Speech-to-Text (STT)**: turn wake probes and utterances into `(text, confidence)`.
//!
//! Implement `SttBackend` for any recognizer. Calls are blocking; the coordinator runs
//! them on the blocking pool under a timeout.

use crate::audio::encode_wav;
use crate::error::{VoiceError, VoiceResult};
use crate::quality::confidence_from_log_prob;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Confidence reported when the service gives no per-segment scores.
const UNKNOWN_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    pub fn empty() -> Self {
        Self::new("", 0.0)
    }
}

/// Backend for converting mono f32 PCM to text. Must accept sub-second buffers.
pub trait SttBackend: Send + Sync {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<Transcript>;
}

/// One scripted reply of [`PlaceholderStt`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(Transcript),
    Fail(String),
    /// Block for the duration, then return the transcript.
    Slow(Duration, Transcript),
}

impl ScriptedReply {
    pub fn text(text: &str, confidence: f32) -> Self {
        ScriptedReply::Text(Transcript::new(text, confidence))
    }
}

/// Placeholder STT: replays a script, then a fixed response. Use for tests and for
/// running the pipeline without a recognizer.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, returned once the script is exhausted.
    pub response: Option<Transcript>,
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            response: Some(Transcript::new(text, confidence)),
            ..Self::default()
        }
    }

    pub fn scripted(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    /// Number of transcription calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|e| VoiceError::Stt(format!("placeholder script poisoned: {}", e)))?
            .pop_front();
        match next {
            Some(ScriptedReply::Text(t)) => Ok(t),
            Some(ScriptedReply::Fail(msg)) => Err(VoiceError::Stt(msg)),
            Some(ScriptedReply::Slow(delay, t)) => {
                std::thread::sleep(delay);
                Ok(t)
            }
            None => {
                if let Some(ref r) = self.response {
                    return Ok(r.clone());
                }
                let secs = samples.len() as f32 / sample_rate.max(1) as f32;
                Ok(Transcript::new(
                    format!(
                        "[STT placeholder: {} samples, {:.1}s; set STT_API_KEY for a real recognizer]",
                        samples.len(),
                        secs
                    ),
                    0.0,
                ))
            }
        }
    }
}

/// Production STT backend: OpenAI-compatible transcription API (OpenAI Whisper, Groq, local
/// whisper servers...). Uses `STT_API_URL` (e.g. https://api.openai.com/v1), `STT_API_KEY`,
/// `STT_MODEL` (default whisper-1) and optionally `STT_LANGUAGE` (default ja).
#[derive(Debug, Clone)]
pub struct OpenAiCompatStt {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// ISO-639-1 hint sent with each request.
    pub language: Option<String>,
    client: reqwest::blocking::Client,
}

impl OpenAiCompatStt {
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("STT_API_KEY")
            .map_err(|_| VoiceError::Config("STT requires STT_API_KEY".to_string()))?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        let language = std::env::var("STT_LANGUAGE")
            .ok()
            .or_else(|| Some("ja".to_string()))
            .filter(|l| !l.trim().is_empty());
        let mut stt = Self::new(base_url, api_key, model)?;
        stt.language = language;
        Ok(stt)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: None,
            client,
        })
    }
}

impl SttBackend for OpenAiCompatStt {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<Transcript> {
        if samples.is_empty() {
            return Ok(Transcript::empty());
        }
        let wav = encode_wav(samples, sample_rate)?;
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        let transcript = parse_verbose_json(&json);
        debug!(confidence = transcript.confidence, "STT response parsed");
        Ok(transcript)
    }
}

/// Text plus confidence from the mean `avg_logprob` of the returned segments.
fn parse_verbose_json(json: &serde_json::Value) -> Transcript {
    let text = json
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let logprobs: Vec<f64> = json
        .get("segments")
        .and_then(|s| s.as_array())
        .map(|segments| {
            segments
                .iter()
                .filter_map(|seg| seg.get("avg_logprob").and_then(|v| v.as_f64()))
                .collect()
        })
        .unwrap_or_default();
    let confidence = if logprobs.is_empty() {
        UNKNOWN_CONFIDENCE
    } else {
        confidence_from_log_prob(logprobs.iter().sum::<f64>() / logprobs.len() as f64)
    };
    Transcript { text, confidence }
}

/// Create the best available STT backend from environment.
/// Priority: (1) OpenAiCompatStt if `STT_API_KEY` is set, (2) PlaceholderStt.
pub fn create_best_stt() -> Box<dyn SttBackend> {
    match OpenAiCompatStt::from_env() {
        Ok(stt) => {
            info!("🗣️ STT: {} ({})", stt.base_url, stt.model);
            Box::new(stt)
        }
        Err(e) => {
            info!("🗣️ STT: placeholder ({})", e);
            Box::new(PlaceholderStt::new())
        }
    }
}
