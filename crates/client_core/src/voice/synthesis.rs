use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::Serialize;

use crate::error::VoiceError;

/// Longest text sent to the synthesis service unmodified.
pub const MAX_SYNTHESIS_CHARS: usize = 2000;
const TRUNCATED_SYNTHESIS_CHARS: usize = 1900;
/// Path of the controller's synthesis endpoint, relative to its base URL.
pub const SYNTHESIS_PATH: &str = "/api/voice/synthesize";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the clip's content type, for players that
    /// sniff formats by name.
    pub fn extension(&self) -> &'static str {
        let essence = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());
        match essence.as_deref() {
            Some("audio/mpeg" | "audio/mp3") => "mp3",
            Some("audio/wav" | "audio/x-wav" | "audio/wave") => "wav",
            Some("audio/ogg" | "audio/opus") => "ogg",
            Some("audio/flac") => "flac",
            _ => "bin",
        }
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, speaker: &str, text: &str) -> Result<AudioClip, VoiceError>;
}

/// Produces no audio; used when no synthesis service is configured so
/// narration still flows through the queue and gets acknowledged.
pub struct NullSynthesizer;

#[async_trait]
impl SpeechSynthesizer for NullSynthesizer {
    async fn synthesize(&self, _speaker: &str, _text: &str) -> Result<AudioClip, VoiceError> {
        Ok(AudioClip::default())
    }
}

/// Optional voice overrides. The controller picks a voice per character on
/// its own; a voice is only sent when one is configured here.
#[derive(Debug, Clone, Default)]
pub struct VoiceTable {
    voices: HashMap<String, String>,
    default_voice: Option<String>,
}

impl VoiceTable {
    pub fn new(voices: HashMap<String, String>, default_voice: Option<String>) -> Self {
        Self {
            voices,
            default_voice,
        }
    }

    pub fn voice_for(&self, speaker: &str) -> Option<&str> {
        self.voices
            .get(speaker)
            .or(self.default_voice.as_ref())
            .map(String::as_str)
    }
}

/// Body of the controller's `POST /api/voice/synthesize`.
#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(rename = "character")]
    speaker: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

pub struct HttpSpeechSynthesizer {
    http: Client,
    endpoint: String,
    voices: VoiceTable,
}

impl HttpSpeechSynthesizer {
    pub fn new(endpoint: impl Into<String>, voices: VoiceTable) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            voices,
        }
    }

    /// Synthesizes through the controller's own voice endpoint.
    pub fn for_controller(server_url: &str, voices: VoiceTable) -> Self {
        Self::new(controller_synthesis_url(server_url), voices)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub fn controller_synthesis_url(server_url: &str) -> String {
    format!("{}{SYNTHESIS_PATH}", server_url.trim().trim_end_matches('/'))
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, speaker: &str, text: &str) -> Result<AudioClip, VoiceError> {
        let text = truncate_for_synthesis(text);
        let res = self
            .http
            .post(&self.endpoint)
            .json(&SynthesisRequest {
                text: &text,
                speaker,
                voice: self.voices.voice_for(speaker),
            })
            .send()
            .await
            .map_err(|err| VoiceError::synthesis(speaker, err))?
            .error_for_status()
            .map_err(|err| VoiceError::synthesis(speaker, err))?;

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = res
            .bytes()
            .await
            .map_err(|err| VoiceError::synthesis(speaker, err))?;
        if bytes.is_empty() {
            return Err(VoiceError::synthesis(speaker, "service returned no audio"));
        }
        Ok(AudioClip::new(bytes.to_vec(), content_type))
    }
}

pub fn truncate_for_synthesis(text: &str) -> String {
    if text.chars().count() <= MAX_SYNTHESIS_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(TRUNCATED_SYNTHESIS_CHARS).collect();
    truncated.push_str("...");
    truncated
}
