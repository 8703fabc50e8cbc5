//! Post-turn emotion classification.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::gemini::{GeminiClient, CLASSIFICATION_MODEL};

/// Emotion attached to a user message after classification.
/// `Analyzing` is a transient placeholder, never a stored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Neutral,
    Analyzing,
}

/// Emotions that trigger a coping-strategy lookup.
pub const NEGATIVE_EMOTIONS: &[Emotion] = &[Emotion::Sadness, Emotion::Anger, Emotion::Fear];

/// Classifiable emotions, excluding the transient placeholder.
const VALID_EMOTIONS: &[Emotion] = &[
    Emotion::Joy,
    Emotion::Sadness,
    Emotion::Anger,
    Emotion::Fear,
    Emotion::Surprise,
    Emotion::Neutral,
];

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "Joy",
            Self::Sadness => "Sadness",
            Self::Anger => "Anger",
            Self::Fear => "Fear",
            Self::Surprise => "Surprise",
            Self::Neutral => "Neutral",
            Self::Analyzing => "Analyzing",
        }
    }

    pub fn is_negative(&self) -> bool {
        NEGATIVE_EMOTIONS.contains(self)
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a classifier's free-text reply onto the fixed set.
/// Anything outside the set falls back to `Neutral`.
fn emotion_from_response(response: &str) -> Emotion {
    let trimmed = response.trim();
    VALID_EMOTIONS
        .iter()
        .copied()
        .find(|e| e.as_str().eq_ignore_ascii_case(trimmed))
        .unwrap_or(Emotion::Neutral)
}

/// Classify the predominant emotion in `text`.
///
/// Never fails: classifier errors and unrecognized replies both come
/// back as `Neutral`.
pub async fn analyze_emotion(client: &GeminiClient, text: &str) -> Emotion {
    if text.trim().is_empty() {
        return Emotion::Neutral;
    }
    let names: Vec<&str> = VALID_EMOTIONS.iter().map(|e| e.as_str()).collect();
    let prompt = format!(
        "Analyze the predominant emotion of the following text. Respond with \
         only one of these exact words: {}.\n\nText: \"{}\"",
        names.join(", "),
        text
    );
    match client.generate_content(CLASSIFICATION_MODEL, &prompt).await {
        Ok(response) => emotion_from_response(&response),
        Err(e) => {
            warn!("Emotion classification failed: {:#}", e);
            Emotion::Neutral
        }
    }
}
