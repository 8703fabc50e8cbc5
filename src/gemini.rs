//! Thin REST client for one-shot generation calls.
//!
//! The live conversation runs over the dedicated session transport; this
//! client covers everything else: post-turn classification, session
//! titles, and standalone speech synthesis.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use tracing::debug;

use crate::audio::codec;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Model used for text classification and titling.
pub const CLASSIFICATION_MODEL: &str = "gemini-2.5-flash";

/// Model used for standalone speech synthesis.
pub const TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }

    /// One-shot text generation; returns the first candidate's text.
    pub async fn generate_content(&self, model: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let response = self.post(model, &body).await?;
        extract_text(&response)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("response contained no text candidate"))
    }

    /// Synthesize speech for `text`; returns mono samples at 24 kHz.
    pub async fn generate_speech(&self, text: &str, voice: &str) -> Result<Vec<f32>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice }
                    }
                }
            }
        });
        let response = self.post(TTS_MODEL, &body).await?;
        let data = extract_audio(&response)
            .ok_or_else(|| anyhow!("response contained no audio candidate"))?;
        let samples = codec::decode_samples(data).context("decoding synthesized audio")?;
        debug!(samples = samples.len(), "Synthesized speech");
        Ok(samples)
    }

    async fn post(&self, model: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}:generateContent?key={}", API_BASE, model, self.api_key);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .context("sending generateContent request")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("generateContent failed with {}: {}", status, detail);
        }
        response
            .json()
            .await
            .context("parsing generateContent response")
    }
}

fn first_part(response: &serde_json::Value) -> Option<&serde_json::Value> {
    response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)
}

fn extract_text(response: &serde_json::Value) -> Option<&str> {
    first_part(response)?.get("text")?.as_str()
}

fn extract_audio(response: &serde_json::Value) -> Option<&str> {
    first_part(response)?
        .get("inlineData")?
        .get("data")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_from_candidate() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Sadness" }] }
            }]
        });
        assert_eq!(extract_text(&response), Some("Sadness"));
    }

    #[test]
    fn test_extract_text_missing_candidates() {
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn test_extract_audio_from_inline_data() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "inlineData": { "data": "AAAA" } }] }
            }]
        });
        assert_eq!(extract_audio(&response), Some("AAAA"));
    }

    #[test]
    fn test_extract_audio_ignores_text_only_parts() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "no audio here" }] }
            }]
        });
        assert_eq!(extract_audio(&response), None);
    }
}
