//! Error types for the brain chain.
//!
//! Policy rejections and refinement exhaustion are *outcomes*, not errors:
//! they travel as [`PolicyRejection`](crate::chain::PolicyRejection) and
//! [`StageOutcome::Degraded`](crate::chain::StageOutcome) values. Everything
//! here is locally recoverable; [`Brain::process`](crate::Brain::process)
//! never lets one of these reach the end user.

use thiserror::Error;

/// Errors raised inside the pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum BrainError {
    /// A stage read a context key that no earlier stage wrote.
    #[error("Context key '{key}' was read before any stage wrote it")]
    MissingContextKey { key: &'static str },

    /// A context key holds a value of a different type than requested.
    #[error("Context key '{key}' holds a value of another type")]
    ContextTypeMismatch { key: &'static str },

    /// A stage tried to overwrite a frozen context key.
    #[error("Context key '{key}' is frozen (written by '{writer}')")]
    FrozenContextKey { key: &'static str, writer: String },

    /// The text-completion capability failed.
    #[error("Completion error: {0}")]
    Completion(String),

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// The conversation/edit/feedback data provider failed.
    #[error("Data provider error: {0}")]
    Provider(String),

    /// A tool invocation failed after passing policy.
    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    /// A tool identifier has no registered implementation.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was cancelled before the chain finished.
    #[error("Request cancelled")]
    Cancelled,

    /// A stage failed for a reason of its own.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },
}

impl BrainError {
    /// Whether this error came from an external call (completion, provider, tool, timeout).
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            BrainError::Completion(_)
                | BrainError::Timeout { .. }
                | BrainError::Provider(_)
                | BrainError::Tool { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_classification() {
        assert!(BrainError::Completion("boom".into()).is_external());
        assert!(BrainError::Timeout {
            operation: "complete".into(),
            after_ms: 10
        }
        .is_external());
        assert!(!BrainError::MissingContextKey { key: "draft" }.is_external());
        assert!(!BrainError::Cancelled.is_external());
    }

    #[test]
    fn test_error_display() {
        let err = BrainError::FrozenContextKey {
            key: "agentPlan",
            writer: "conductor".into(),
        };
        assert_eq!(
            err.to_string(),
            "Context key 'agentPlan' is frozen (written by 'conductor')"
        );
    }
}
