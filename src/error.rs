//! Error types for Tradepost

use thiserror::Error;

/// Main error type for Tradepost
#[derive(Error, Debug)]
pub enum MarketError {
    // Caller-correctable input
    #[error("Validation failed: {0}")]
    Validation(String),

    // Negotiation state errors
    #[error("Negotiation is closed: {0}")]
    InvalidState(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Backend errors
    #[error("Backend unavailable: {0}")]
    Transient(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Tradepost operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// What the UI should do with a failed action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feedback {
    /// Show the message next to the offending field
    Inline,
    /// Non-retryable; reload the negotiation from the store
    Refresh,
    /// Show access denied, no retry
    AccessDenied,
    /// Offer a retry and keep the typed input
    Retry,
    /// Log and show a generic failure
    Generic,
}

impl MarketError {
    /// Stable tag used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::Validation(_) => "validation",
            MarketError::InvalidState(_) => "invalid_state",
            MarketError::InvalidTransition { .. } => "invalid_transition",
            MarketError::Authorization(_) => "authorization",
            MarketError::NotFound(_) => "not_found",
            MarketError::Transient(_) => "transient",
            MarketError::Configuration(_) => "configuration",
            MarketError::Io(_) => "io",
            MarketError::Json(_) => "json",
        }
    }

    pub fn feedback(&self) -> Feedback {
        match self {
            MarketError::Validation(_) | MarketError::Json(_) => Feedback::Inline,
            MarketError::InvalidState(_) | MarketError::NotFound(_) => Feedback::Refresh,
            MarketError::Authorization(_) => Feedback::AccessDenied,
            MarketError::Transient(_) | MarketError::Io(_) => Feedback::Retry,
            MarketError::InvalidTransition { .. } | MarketError::Configuration(_) => {
                Feedback::Generic
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.feedback() == Feedback::Retry
    }
}
