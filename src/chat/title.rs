//! Session title generation.

use tracing::warn;

use crate::chat::{ChatMessage, MessageSender};
use crate::gemini::{GeminiClient, CLASSIFICATION_MODEL};

const FALLBACK_TITLE: &str = "Chat Summary";
const EMPTY_TITLE: &str = "New Chat";

/// Strip quoting and markdown emphasis the model sometimes adds.
fn clean_title(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '*'))
        .collect()
}

/// Generate a short descriptive title from the opening messages.
///
/// Never fails: generation errors yield a fixed fallback title.
pub async fn generate_title(client: &GeminiClient, messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return EMPTY_TITLE.to_string();
    }
    let conversation = messages
        .iter()
        .take(4)
        .map(|m| {
            let who = match m.sender {
                MessageSender::User => "User",
                MessageSender::Ai => "AI",
            };
            format!("{}: {}", who, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Generate a very short, concise title (3-5 words max) for the following \
         conversation. The title should be neutral and descriptive. Do not use \
         quotes.\n\n{}",
        conversation
    );
    match client.generate_content(CLASSIFICATION_MODEL, &prompt).await {
        Ok(response) => {
            let title = clean_title(&response);
            if title.is_empty() {
                FALLBACK_TITLE.to_string()
            } else {
                title
            }
        }
        Err(e) => {
            warn!("Title generation failed: {:#}", e);
            FALLBACK_TITLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_strips_quotes_and_asterisks() {
        assert_eq!(clean_title("\"Coping With Stress\""), "Coping With Stress");
        assert_eq!(clean_title("**Morning Anxiety**"), "Morning Anxiety");
        assert_eq!(clean_title("  'A Hard Day'\n"), "A Hard Day");
    }

    #[test]
    fn test_clean_title_keeps_plain_text() {
        assert_eq!(clean_title("Sleep Troubles"), "Sleep Troubles");
    }
}
