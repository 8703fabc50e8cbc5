//! Wire protocol for the bidirectional live endpoint.
//!
//! Outbound frames are JSON text messages: one `setup` frame at open, then
//! `realtimeInput` frames carrying base64 PCM. Inbound frames carry any
//! combination of transcript fragments, audio parts, and control flags on a
//! single `serverContent` object; dispatch is keyed on field presence.

use serde::Deserialize;
use serde_json::json;

/// Build the session setup frame sent immediately after connect.
///
/// Requests audio responses with the given prebuilt voice, plus incremental
/// transcription of both the input and output audio.
pub fn setup_frame(model: &str, voice: &str, system_instruction: &str) -> serde_json::Value {
    json!({
        "setup": {
            "model": format!("models/{}", model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                }
            },
            "systemInstruction": {
                "parts": [ { "text": system_instruction } ]
            },
            "inputAudioTranscription": {},
            "outputAudioTranscription": {}
        }
    })
}

/// Build an outbound audio frame from an already-encoded PCM chunk.
pub fn media_frame(base64_pcm: &str, sample_rate: u32) -> serde_json::Value {
    json!({
        "realtimeInput": {
            "media": {
                "data": base64_pcm,
                "mimeType": format!("audio/pcm;rate={}", sample_rate)
            }
        }
    })
}

/// One inbound frame from the live endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerFrame {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
}

/// Content payload of an inbound frame. All fields are independent; a
/// single frame may carry several at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub input_transcription: Option<TranscriptionFragment>,
    pub output_transcription: Option<TranscriptionFragment>,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub model_turn: Option<ModelTurn>,
}

/// An incremental, possibly partial, piece of recognized text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionFragment {
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: String,
}

impl ServerContent {
    /// First inline audio payload carried by this frame, if any.
    pub fn audio_data(&self) -> Option<&str> {
        self.model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
            .map(|d| d.data.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_frame_shape() {
        let frame = setup_frame("gemini-live", "Zephyr", "Be kind.");
        assert_eq!(frame["setup"]["model"], "models/gemini-live");
        assert_eq!(
            frame["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
        assert_eq!(frame["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert!(frame["setup"]["inputAudioTranscription"].is_object());
        assert!(frame["setup"]["outputAudioTranscription"].is_object());
    }

    #[test]
    fn test_media_frame_shape() {
        let frame = media_frame("QUJD", 16_000);
        assert_eq!(frame["realtimeInput"]["media"]["data"], "QUJD");
        assert_eq!(
            frame["realtimeInput"]["media"]["mimeType"],
            "audio/pcm;rate=16000"
        );
    }

    #[test]
    fn test_parse_transcript_fragments() {
        let raw = r#"{
            "serverContent": {
                "inputTranscription": { "text": "Hel" },
                "outputTranscription": { "text": "Hi " }
            }
        }"#;
        let frame: ServerFrame = serde_json::from_str(raw).unwrap();
        let content = frame.server_content.unwrap();
        assert_eq!(content.input_transcription.unwrap().text, "Hel");
        assert_eq!(content.output_transcription.unwrap().text, "Hi ");
        assert!(!content.turn_complete);
        assert!(!content.interrupted);
    }

    #[test]
    fn test_parse_audio_and_control_flags() {
        let raw = r#"{
            "serverContent": {
                "turnComplete": true,
                "interrupted": true,
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } }
                    ]
                }
            }
        }"#;
        let frame: ServerFrame = serde_json::from_str(raw).unwrap();
        let content = frame.server_content.unwrap();
        assert!(content.turn_complete);
        assert!(content.interrupted);
        assert_eq!(content.audio_data(), Some("AAAA"));
    }

    #[test]
    fn test_parse_setup_complete() {
        let frame: ServerFrame = serde_json::from_str(r#"{ "setupComplete": {} }"#).unwrap();
        assert!(frame.setup_complete.is_some());
        assert!(frame.server_content.is_none());
    }

    #[test]
    fn test_parse_unknown_fields_tolerated() {
        let raw = r#"{ "usageMetadata": { "totalTokenCount": 3 } }"#;
        let frame: ServerFrame = serde_json::from_str(raw).unwrap();
        assert!(frame.server_content.is_none());
    }
}
