//! Summary generation: merges the stored summary with newly approved comment
//! text through an external text-generation service.

use thiserror::Error;

pub mod anthropic;
pub use anthropic::AnthropicGenerator;

/// Characters of the previous summary sent to the generator (tail kept).
pub const MAX_PREVIOUS_SUMMARY_CHARS: usize = 2_000;
/// Characters of joined comment text sent to the generator (tail kept).
pub const MAX_COMMENT_TEXT_CHARS: usize = 16_000;
pub const COMMENT_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator called without any new comment text")]
    EmptyInput,
    #[error("generator denied access: {0}")]
    PermissionDenied(String),
    #[error("generator throttled the request: {0}")]
    RateLimited(String),
    #[error("generator returned an unusable response: {0}")]
    MalformedResponse(String),
    #[error("generator request failed: {0}")]
    Transport(String),
}

impl GeneratorError {
    /// Whether a later attempt can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::EmptyInput | Self::PermissionDenied(_))
    }
}

// ============================================================================
// SummaryGenerator trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait SummaryGenerator: Send + Sync {
    /// Produce an updated summary. Must not be called with an empty
    /// `new_comments`; implementations return `GeneratorError::EmptyInput`.
    async fn generate(
        &self,
        previous_summary: &str,
        new_comments: &[String],
    ) -> Result<String, GeneratorError>;
}

/// Bounded inputs for one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInput {
    pub previous_summary: String,
    pub comment_text: String,
}

impl PromptInput {
    pub fn prepare(previous_summary: &str, new_comments: &[String]) -> Result<Self, GeneratorError> {
        if new_comments.iter().all(|c| c.trim().is_empty()) {
            return Err(GeneratorError::EmptyInput);
        }
        let joined = new_comments.join(COMMENT_SEPARATOR);
        Ok(Self {
            previous_summary: tail_truncate(previous_summary.trim(), MAX_PREVIOUS_SUMMARY_CHARS)
                .to_string(),
            comment_text: tail_truncate(&joined, MAX_COMMENT_TEXT_CHARS).to_string(),
        })
    }
}

/// Keep the last `max_chars` characters of `text`.
pub fn tail_truncate(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    &text[start..]
}

// ============================================================================
// Test utilities
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_truncate_keeps_the_end() {
        assert_eq!(tail_truncate("abcdef", 3), "def");
        assert_eq!(tail_truncate("abc", 3), "abc");
        assert_eq!(tail_truncate("abc", 10), "abc");
        assert_eq!(tail_truncate("abc", 0), "");
    }

    #[test]
    fn tail_truncate_respects_char_boundaries() {
        let text = "héllo wörld ✨";
        let tail = tail_truncate(text, 5);
        assert_eq!(tail, "rld ✨");
        assert_eq!(tail.chars().count(), 5);
    }

    #[test]
    fn prepare_rejects_empty_input() {
        assert!(matches!(
            PromptInput::prepare("old", &[]),
            Err(GeneratorError::EmptyInput)
        ));
        assert!(matches!(
            PromptInput::prepare("old", &["  ".to_string()]),
            Err(GeneratorError::EmptyInput)
        ));
    }

    #[test]
    fn prepare_bounds_both_inputs() {
        let previous = format!("{}RECENT", "x".repeat(MAX_PREVIOUS_SUMMARY_CHARS));
        let comments: Vec<String> = (0..2_000).map(|i| format!("comment number {}", i)).collect();

        let input = PromptInput::prepare(&previous, &comments).unwrap();
        assert_eq!(input.previous_summary.chars().count(), MAX_PREVIOUS_SUMMARY_CHARS);
        assert!(input.previous_summary.ends_with("RECENT"));
        assert_eq!(input.comment_text.chars().count(), MAX_COMMENT_TEXT_CHARS);
        assert!(input.comment_text.ends_with("comment number 1999"));
    }

    #[test]
    fn prepare_joins_with_separator() {
        let input =
            PromptInput::prepare("", &["first".to_string(), "second".to_string()]).unwrap();
        assert_eq!(input.comment_text, format!("first{}second", COMMENT_SEPARATOR));
        assert_eq!(input.previous_summary, "");
    }

    #[test]
    fn retryability_by_class() {
        assert!(!GeneratorError::PermissionDenied("401".into()).is_retryable());
        assert!(!GeneratorError::EmptyInput.is_retryable());
        assert!(GeneratorError::RateLimited("429".into()).is_retryable());
        assert!(GeneratorError::MalformedResponse("empty".into()).is_retryable());
        assert!(GeneratorError::Transport("reset".into()).is_retryable());
    }
}
