//! Error taxonomy for the voice core.
//!
//! Primary-path errors (`Permission`, `Device`, `Transport`) tear the live
//! session down and are surfaced to the frontend. `Decode` is handled
//! per-segment. Enrichment failures never reach this type; they degrade to
//! defaults inside the chat module.

/// Errors produced by the voice core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    /// Microphone access denied. Terminal for the start attempt.
    Permission(String),
    /// Audio hardware unavailable (input or output).
    Device(String),
    /// Remote connection failed or closed abnormally.
    Transport(String),
    /// Malformed audio payload.
    Decode(String),
    /// Missing or invalid startup configuration.
    Config(String),
}

impl std::fmt::Display for VoiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permission(msg) => write!(f, "microphone permission error: {}", msg),
            Self::Device(msg) => write!(f, "audio device error: {}", msg),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Decode(msg) => write!(f, "audio decode error: {}", msg),
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for VoiceError {}
