//! Error types for cardflow
//!
//! This module provides the error type hierarchy using `thiserror`, matching
//! the taxonomy the payment flow distinguishes between: local validation,
//! processor/widget failures, backend rejections, and transport failures.

use thiserror::Error;

use crate::modal::validator::ValidationErrors;

/// The main error type for payment-flow operations
#[derive(Error, Debug)]
pub enum FlowError {
    /// Local field-level validation failure; rendered inline per field
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(ValidationErrors),

    /// Failure reported by the hosted widget or the processor confirmation
    #[error("Processor error: {0}")]
    Processor(String),

    /// Non-2xx response from a backend payment endpoint
    #[error("Backend error ({status}): {detail}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Error detail extracted from the response body
        detail: String,
    },

    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (bad base URL, missing token)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for payment-flow operations
pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    /// Create a processor error from a widget-reported message
    pub fn processor<S: Into<String>>(msg: S) -> Self {
        FlowError::Processor(msg.into())
    }

    /// Create a configuration error from a string
    pub fn config<S: Into<String>>(msg: S) -> Self {
        FlowError::Config(msg.into())
    }

    /// Single top-level message suitable for the modal's error banner
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Validation(_) => "Please correct the highlighted fields.".to_string(),
            FlowError::Processor(msg) => msg.clone(),
            FlowError::Backend { detail, .. } => detail.clone(),
            FlowError::Network(_) => {
                "Network error. Please check your connection and try again.".to_string()
            }
            FlowError::Json(_) | FlowError::Config(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Whether retrying the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowError::Network(_)
                | FlowError::Backend {
                    status: 500..=599,
                    ..
                }
        )
    }
}
