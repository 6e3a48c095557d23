//! Google Cloud Text-to-Speech over REST.

use super::{ProviderError, SpeechSynthesizer, SynthesizedSpeech};
use crate::models::{PauseSettings, SpeechDefaults, VoiceProfile};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TTS_API_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Filler words followed by a fixed hesitation pause.
const FILLER_PAUSES: [(&str, f32); 3] = [("Ähm", 0.2), ("Also", 0.15), ("Hmm", 0.3)];

pub struct GoogleSpeechSynthesizer {
    api_key: Secret<String>,
    client: Client,
}

impl GoogleSpeechSynthesizer {
    pub fn new(api_key: Secret<String>) -> Result<Self, ProviderError> {
        if api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Text-to-speech API key not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self { api_key, client })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        defaults: &SpeechDefaults,
    ) -> Result<SynthesizedSpeech, ProviderError> {
        let request = SynthesizeRequest {
            input: SynthesisInput {
                ssml: to_ssml(text, &voice.pauses),
            },
            voice: VoiceSelection {
                language_code: &defaults.language_code,
                name: &voice.name,
                ssml_gender: &voice.gender,
            },
            audio_config: AudioConfig {
                audio_encoding: &defaults.audio_encoding,
                speaking_rate: voice.speaking_rate,
                pitch: voice.pitch,
                volume_gain_db: voice.volume_gain_db,
                sample_rate_hertz: defaults.sample_rate_hertz,
            },
        };

        tracing::debug!(voice = %voice.name, text_len = text.len(), "Synthesizing speech");

        let response = self
            .client
            .post(TTS_API_URL)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError(format!(
                "Text-to-speech error {}: {}",
                status, body
            )));
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        if body.audio_content.is_empty() {
            return Err(ProviderError::ApiError(
                "Text-to-speech returned no audio".to_string(),
            ));
        }

        Ok(SynthesizedSpeech {
            audio_content: body.audio_content,
            audio_encoding: defaults.audio_encoding.clone(),
        })
    }
}

/// Render plain text as SSML with natural pauses after punctuation and
/// filler words.
pub fn to_ssml(text: &str, pauses: &PauseSettings) -> String {
    let brk = |secs: f32| format!("<break time=\"{}s\"/>", secs);

    let mut ssml = escape_xml(text)
        .replace("...", &brk(pauses.long))
        .replace(". ", &format!(".{} ", brk(pauses.medium)))
        .replace(", ", &format!(",{} ", brk(pauses.short)))
        .replace("? ", &format!("?{} ", brk(pauses.long)))
        .replace("! ", &format!("!{} ", brk(pauses.medium)));

    for (filler, secs) in FILLER_PAUSES {
        ssml = ssml.replace(filler, &format!("{}{}", filler, brk(secs)));
    }

    format!("<speak>{}</speak>", ssml)
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig<'a>,
}

#[derive(Debug, Serialize)]
struct SynthesisInput {
    ssml: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig<'a> {
    audio_encoding: &'a str,
    speaking_rate: f32,
    pitch: f32,
    volume_gain_db: f32,
    sample_rate_hertz: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}
