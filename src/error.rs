//! Domain-specific error types for scripture-insights

use thiserror::Error;

/// Main error type for the insights service
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Could not normalize reference '{input}'")]
    Normalization { input: String },

    #[error("Inference server unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Recovered locally into a degraded payload; never surfaced to HTTP callers.
    #[error("Malformed model output: {message}")]
    MalformedModelOutput { message: String, raw_output: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl InsightError {
    pub fn validation(message: impl Into<String>) -> Self {
        InsightError::Validation {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        InsightError::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// HTTP status code a caller should see for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            InsightError::Validation { .. } | InsightError::Normalization { .. } => 400,
            InsightError::UpstreamUnavailable { .. } => 502,
            InsightError::MalformedModelOutput { .. }
            | InsightError::Config { .. }
            | InsightError::Serialization { .. }
            | InsightError::Internal { .. } => 500,
        }
    }

    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        self.status_code() == 400
    }
}

impl From<anyhow::Error> for InsightError {
    fn from(err: anyhow::Error) -> Self {
        InsightError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for InsightError {
    fn from(err: serde_json::Error) -> Self {
        InsightError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for InsightError {
    fn from(err: reqwest::Error) -> Self {
        InsightError::UpstreamUnavailable {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

/// Result type alias for insights operations
pub type Result<T> = std::result::Result<T, InsightError>;
