//! Error types for the policy committee simulator

use thiserror::Error;

/// Result type alias for committee operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the committee simulator
#[derive(Debug, Error)]
pub enum Error {
    /// Non-success status returned by the generation endpoint
    #[error("Generation API error: status {status}: {body}")]
    Api { status: u16, body: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generator output could not be read as a JSON object
    #[error("Unparseable generator output for {prompt}: {reason}")]
    JsonExtraction { prompt: String, reason: String },

    /// The blackboard could not be built for a meeting
    #[error("Blackboard build failed for meeting {meeting_id}: {source}")]
    BlackboardBuild {
        meeting_id: String,
        #[source]
        source: Box<Error>,
    },

    /// Missing or malformed prompt template
    #[error("Prompt template error: {0}")]
    Template(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Artifact storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown background job
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an API status error
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Create a JSON extraction error
    pub fn json_extraction(prompt: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JsonExtraction {
            prompt: prompt.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a failure as a blackboard build error
    pub fn blackboard_build(meeting_id: impl Into<String>, source: Error) -> Self {
        Self::BlackboardBuild {
            meeting_id: meeting_id.into(),
            source: Box::new(source),
        }
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx are transient; everything
    /// else fails the call immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
