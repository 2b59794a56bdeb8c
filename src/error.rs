//! Failure kinds of a chat request.
//!
//! A clarification is not an error: it is a successful
//! [`ChatAnswer`](crate::models::ChatAnswer) with `needs_clarification` set.
//! Only the two variants below end a request without an answer.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The question was rejected before the pipeline ran.
    #[error("Invalid question: {0}")]
    Validation(String),

    /// A backend failed or missed its deadline. Never retried by the pipeline.
    #[error("{stage} unavailable: {reason}")]
    ServiceUnavailable { stage: Stage, reason: String },
}

/// Pipeline stage that talks to an external backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classification,
    Retrieval,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Classification => f.write_str("classification"),
            Stage::Retrieval => f.write_str("retrieval"),
            Stage::Generation => f.write_str("generation"),
        }
    }
}

impl ChatError {
    pub fn unavailable(stage: Stage, reason: impl fmt::Display) -> Self {
        ChatError::ServiceUnavailable {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ChatError::ServiceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_stage() {
        let err = ChatError::unavailable(Stage::Retrieval, "deadline of 5s exceeded");
        assert_eq!(err.to_string(), "retrieval unavailable: deadline of 5s exceeded");
        assert!(err.is_unavailable());
        assert!(!ChatError::Validation("empty".into()).is_unavailable());
    }
}
