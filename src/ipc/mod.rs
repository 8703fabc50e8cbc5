//! IPC protocol types for communication with the frontend.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::chat::emotion::Emotion;
use crate::chat::ChatMessage;

// ---------------------------------------------------------------------------
// Events: core -> UI (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the frontend via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum UiEvent {
    Starting {},
    Ready {},
    /// Live session connection state changed.
    CallState {
        state: String,
    },
    /// Interim "user said so far" text; empty clears the indicator.
    UserTranscript {
        text: String,
    },
    /// Interim "model said so far" text; empty clears the indicator.
    ModelTranscript {
        text: String,
    },
    /// A turn completed and these records were appended.
    Turn {
        messages: Vec<ChatMessage>,
    },
    /// Asynchronous emotion tag for an existing message.
    Emotion {
        #[serde(rename = "messageId")]
        message_id: String,
        emotion: Emotion,
    },
    /// A coping strategy matched the user's last message.
    Strategy {
        title: String,
        description: String,
    },
    /// Generated title for the active session.
    SessionTitle {
        title: String,
    },
    SpeakingStart {},
    SpeakingEnd {},
    AudioDevices {
        input: Vec<String>,
        output: Vec<String>,
    },
    Error {
        message: String,
    },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: UI -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the frontend via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum UiCommand {
    /// Open a live voice call.
    StartCall {
        #[serde(default)]
        voice: Option<String>,
    },
    /// End the live voice call and release its devices.
    EndCall {},
    /// Silence or restore spoken replies; transcripts keep flowing.
    SetVoiceReply {
        enabled: bool,
    },
    /// Synthesize and play a single utterance outside a call.
    Speak {
        text: String,
    },
    /// Start a fresh chat session transcript.
    NewSession {},
    ListAudioDevices {},
    Ping {},
    Stop {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = UiEvent::CallState {
            state: "listening".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "call_state");
        assert_eq!(json["data"]["state"], "listening");
    }

    #[test]
    fn test_emotion_event_uses_message_id_key() {
        let event = UiEvent::Emotion {
            message_id: "abc".to_string(),
            emotion: Emotion::Sadness,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["messageId"], "abc");
        assert_eq!(json["data"]["emotion"], "sadness");
    }

    #[test]
    fn test_command_parse() {
        let cmd: UiCommand =
            serde_json::from_str(r#"{"command":"start_call","voice":"Kore"}"#).unwrap();
        assert!(matches!(cmd, UiCommand::StartCall { voice: Some(v) } if v == "Kore"));

        let cmd: UiCommand = serde_json::from_str(r#"{"command":"start_call"}"#).unwrap();
        assert!(matches!(cmd, UiCommand::StartCall { voice: None }));

        let cmd: UiCommand =
            serde_json::from_str(r#"{"command":"set_voice_reply","enabled":false}"#).unwrap();
        assert!(matches!(cmd, UiCommand::SetVoiceReply { enabled: false }));
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        assert!(serde_json::from_str::<UiCommand>(r#"{"command":"warp"}"#).is_err());
    }
}
