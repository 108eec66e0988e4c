use thiserror::Error;

/// Application-wide error types for Argus.
#[derive(Error, Debug)]
pub enum AppError {
    /// Browser navigation or page interaction failed.
    #[error("Page error: {0}")]
    PageError(String),

    /// A bounded wait expired.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// An element the pipeline depends on is not on the page.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// A CSS selector could not be compiled.
    #[error("Invalid selector '{selector}': {reason}")]
    SelectorError { selector: String, reason: String },

    /// The anti-automation challenge could not be cleared.
    #[error("Challenge not cleared: {0}")]
    ChallengeFailed(String),

    /// The challenge-solving service reported a non-zero error code.
    #[error("Solver error {code}: {description}")]
    SolverError { code: i64, description: String },

    /// HTTP request to an external service failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Reading or writing the record store failed.
    #[error("Store error: {0}")]
    StoreError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is a transient page condition worth
    /// retrying in place (unready DOM, slow render, stale element).
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Timeout(_) | AppError::ElementNotFound(_) | AppError::NetworkError(_) => {
                true
            }
            AppError::PageError(msg) => {
                msg.contains("timeout")
                    || msg.contains("stale")
                    || msg.contains("not ready")
                    || msg.contains("detached")
            }
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
