//! Coping-strategy catalog and relevance matching.

use serde::Serialize;
use tracing::warn;

use crate::gemini::{GeminiClient, CLASSIFICATION_MODEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CopingStrategy {
    pub title: &'static str,
    pub description: &'static str,
}

/// Fixed strategy catalog. Matching is by exact title.
pub const COPING_STRATEGIES: &[CopingStrategy] = &[
    CopingStrategy {
        title: "5-4-3-2-1 Grounding Technique",
        description: "This technique helps you stay in the present moment during \
            times of anxiety or panic.\n\
            \u{2022} Name 5 things you can see.\n\
            \u{2022} Name 4 things you can feel.\n\
            \u{2022} Name 3 things you can hear.\n\
            \u{2022} Name 2 things you can smell.\n\
            \u{2022} Name 1 thing you can taste.",
    },
    CopingStrategy {
        title: "Box Breathing",
        description: "A simple technique to calm your nervous system.\n\
            \u{2022} Breathe in for 4 seconds.\n\
            \u{2022} Hold your breath for 4 seconds.\n\
            \u{2022} Breathe out for 4 seconds.\n\
            \u{2022} Hold your breath for 4 seconds.\n\
            \u{2022} Repeat for a few minutes.",
    },
    CopingStrategy {
        title: "Mindful Observation",
        description: "Focus your attention on a single object around you. Notice \
            its color, texture, shape, and weight without judgment. This helps to \
            quiet distracting thoughts.",
    },
    CopingStrategy {
        title: "Positive Reframing",
        description: "Challenge a negative thought. Ask yourself:\n\
            \u{2022} Is this thought 100% true?\n\
            \u{2022} What is a more positive or balanced way to see this situation?\n\
            \u{2022} What can I learn from this?",
    },
    CopingStrategy {
        title: "Mindful Listening",
        description: "Put on a piece of calming music or listen to the sounds \
            around you. Try to separate each sound and focus on it individually. \
            This can help anchor you to the present.",
    },
    CopingStrategy {
        title: "Progressive Muscle Relaxation",
        description: "Tense a group of muscles (like your hands) as you breathe \
            in, and relax them as you breathe out. Work your way through different \
            muscle groups in your body to release physical tension.",
    },
];

/// Resolve a matcher reply to a catalog entry. "None" and anything that
/// is not an exact title both mean no suggestion.
fn strategy_from_response(response: &str) -> Option<&'static CopingStrategy> {
    let title = response.trim();
    if title == "None" {
        return None;
    }
    COPING_STRATEGIES.iter().find(|s| s.title == title)
}

/// Ask which catalog strategy fits `user_message`, if any.
///
/// Never fails: matcher errors and off-catalog replies both mean no
/// suggestion.
pub async fn find_relevant_strategy(
    client: &GeminiClient,
    user_message: &str,
) -> Option<&'static CopingStrategy> {
    if user_message.trim().is_empty() {
        return None;
    }
    let titles: Vec<&str> = COPING_STRATEGIES.iter().map(|s| s.title).collect();
    let prompt = format!(
        "Based on the user's message, which of the following coping strategies \
         is most relevant?\n\nUser message: \"{}\"\n\nAvailable strategies: \
         \"{}\"\n\nRespond with only the exact title of the most appropriate \
         strategy. If none seem relevant, respond with \"None\".",
        user_message,
        titles.join("\", \"")
    );
    match client.generate_content(CLASSIFICATION_MODEL, &prompt).await {
        Ok(response) => strategy_from_response(&response),
        Err(e) => {
            warn!("Strategy lookup failed: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_title_matches() {
        let found = strategy_from_response("Box Breathing").unwrap();
        assert_eq!(found.title, "Box Breathing");
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        assert!(strategy_from_response(" Positive Reframing \n").is_some());
    }

    #[test]
    fn test_none_reply_means_no_suggestion() {
        assert!(strategy_from_response("None").is_none());
    }

    #[test]
    fn test_off_catalog_reply_means_no_suggestion() {
        assert!(strategy_from_response("Deep Breathing").is_none());
        assert!(strategy_from_response("").is_none());
        // Case must match exactly.
        assert!(strategy_from_response("box breathing").is_none());
    }

    #[test]
    fn test_catalog_has_six_unique_titles() {
        assert_eq!(COPING_STRATEGIES.len(), 6);
        for (i, a) in COPING_STRATEGIES.iter().enumerate() {
            for b in &COPING_STRATEGIES[i + 1..] {
                assert_ne!(a.title, b.title);
            }
        }
    }
}
