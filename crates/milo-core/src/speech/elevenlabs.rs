use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::VoiceService;
use crate::error::TutorError;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
/// "Sarah": natural and expressive.
pub const VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
pub const MODEL_ID: &str = "eleven_multilingual_v2";

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Serialize)]
struct SynthesisRequest {
    text: String,
    model_id: String,
    voice_settings: VoiceSettings,
}

#[derive(Clone)]
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            model_id: MODEL_ID.to_string(),
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.8,
                style: 0.6,
                use_speaker_boost: true,
            },
        }
    }

    /// Fetch MPEG audio for `text`.
    pub async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, TutorError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, VOICE_ID);

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .header("Content-Type", "application/json")
            .json(&Self::request(text))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(TutorError::status(
                status.as_u16(),
                format!("ElevenLabs API error {}: {}", status, text),
            ));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(TutorError::Playback("ElevenLabs returned no audio".to_string()));
        }
        tracing::debug!(bytes = audio.len(), "Received synthesized audio");
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl VoiceService for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TutorError> {
        self.text_to_speech(text).await
    }
}
