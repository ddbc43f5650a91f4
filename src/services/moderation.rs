//! Answer moderation. Flagged text is redacted, never rejected, and failures let the text through.

use futures::future::BoxFuture;
use rustrict::CensorStr;
use thiserror::Error;
use tracing::warn;

/// Outcome of moderating one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    /// Whether the text was considered inappropriate.
    pub flagged: bool,
    /// Redacted rendering of the text.
    pub cleaned: String,
}

/// Error raised by a moderation backend.
#[derive(Debug, Error)]
pub enum ModerationError {
    /// The backend could not produce a verdict.
    #[error("moderation backend unavailable: {0}")]
    Unavailable(String),
}

/// Moderation collaborator.
pub trait Moderator: Send + Sync {
    /// Judge `text`.
    fn moderate(&self, text: String) -> BoxFuture<'static, Result<ModerationVerdict, ModerationError>>;
}

/// Local word-list moderator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustrictModerator;

impl Moderator for RustrictModerator {
    fn moderate(&self, text: String) -> BoxFuture<'static, Result<ModerationVerdict, ModerationError>> {
        Box::pin(async move {
            let flagged = text.as_str().is_inappropriate();
            let cleaned = if flagged {
                text.as_str().censor()
            } else {
                text
            };
            Ok(ModerationVerdict { flagged, cleaned })
        })
    }
}

/// Text as it will be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeratedText {
    /// Stored rendering.
    pub text: String,
    /// Whether the stored rendering was redacted.
    pub masked: bool,
}

/// Moderate an answer, falling back to the original text when the backend fails.
pub async fn moderate_answer(moderator: &dyn Moderator, text: &str) -> ModeratedText {
    match moderator.moderate(text.to_string()).await {
        Ok(ModerationVerdict {
            flagged: true,
            cleaned,
        }) => ModeratedText {
            text: cleaned,
            masked: true,
        },
        Ok(_) => ModeratedText {
            text: text.to_string(),
            masked: false,
        },
        Err(err) => {
            warn!(error = %err, "moderation failed; storing answer unmoderated");
            ModeratedText {
                text: text.to_string(),
                masked: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenModerator;

    impl Moderator for BrokenModerator {
        fn moderate(
            &self,
            _text: String,
        ) -> BoxFuture<'static, Result<ModerationVerdict, ModerationError>> {
            Box::pin(async { Err(ModerationError::Unavailable("timeout".into())) })
        }
    }

    #[tokio::test]
    async fn clean_text_is_stored_verbatim() {
        let stored = moderate_answer(&RustrictModerator, "A very polite goldfish").await;
        assert_eq!(
            stored,
            ModeratedText {
                text: "A very polite goldfish".into(),
                masked: false,
            }
        );
    }

    #[tokio::test]
    async fn flagged_text_is_masked_not_rejected() {
        let stored = moderate_answer(&RustrictModerator, "what the fuck").await;
        assert!(stored.masked);
        assert_ne!(stored.text, "what the fuck");
        assert!(stored.text.starts_with("what the"));
    }

    #[tokio::test]
    async fn backend_failure_lets_text_through() {
        let stored = moderate_answer(&BrokenModerator, "anything").await;
        assert_eq!(stored.text, "anything");
        assert!(!stored.masked);
    }
}
