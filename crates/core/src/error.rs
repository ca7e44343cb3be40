//! Error types for issuehub
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for issuehub
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source '{source_name}' failed: {reason}")]
    SourceFailed { source_name: String, reason: String },

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Aggregator disposed")]
    Disposed,
}

/// Result type alias for issuehub operations
pub type Result<T> = std::result::Result<T, IssueError>;

impl IssueError {
    /// Create a source failure error
    pub fn source_failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        IssueError::SourceFailed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the aggregator keeps working after this error.
    ///
    /// A failed source only aborts the pass it happened in; the next
    /// recompute starts from scratch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IssueError::SourceFailed { .. } | IssueError::Io(_) | IssueError::Json(_)
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            IssueError::Io(e) => format!("File operation failed: {}", e),
            IssueError::Config(msg) => format!("Configuration error: {}", msg),
            IssueError::SourceFailed { source_name, reason } => {
                format!("Could not collect issues from {}: {}", source_name, reason)
            }
            IssueError::Disposed => "The issue model is no longer available".to_string(),
            _ => self.to_string(),
        }
    }
}
