//! Error types for secret store operations.

use thiserror::Error;

/// Result type for secret store operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while listing or reading secrets.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// A bearer credential could not be acquired, or the store rejected it.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The store answered with an unexpected status.
    #[error("Secret store returned {status} for {operation}: {message}")]
    Backend {
        operation: String,
        status: u16,
        message: String,
    },

    /// The store answered with a body we could not interpret.
    #[error("Malformed secret store response for {operation}: {reason}")]
    Malformed { operation: String, reason: String },

    /// Transport-level failure talking to the store or the identity endpoint.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid store or credential configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SecretsError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn malformed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Short label used for metrics and non-debug logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::Backend { .. } => "backend",
            Self::Malformed { .. } => "malformed",
            Self::Http(_) => "http",
            Self::Config { .. } => "config",
        }
    }
}
