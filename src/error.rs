//! Application error types.
//!
//! One error enum covers the whole service. The taxonomy matters for
//! request handling: configuration errors are fatal at startup only,
//! everything else is logged, isolated to the affected project/MR, and
//! reported to the caller.

use thiserror::Error;

/// Service-level errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file is missing, unreadable, or invalid.
    #[error("Config error: {message}")]
    Config { message: String },

    /// Network-level failure talking to GitLab (timeout, connect).
    #[error("Network error: {message}")]
    Network { message: String },

    /// GitLab answered with a non-success status.
    #[error("GitLab API error: {message}")]
    GitLabApi {
        message: String,
        status_code: Option<u16>,
        endpoint: Option<String>,
    },

    /// Inbound webhook body or GitLab response body failed to decode.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Database write failed.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Webhook token did not match the configured one.
    #[error("token mismatch")]
    TokenMismatch,

    /// Shutdown in progress, new reconciliations are refused.
    #[error("service is shutting down")]
    Unavailable,
}

impl AppError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a GitLab API error.
    pub fn gitlab_api(message: impl Into<String>) -> Self {
        Self::GitLabApi {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create a GitLab API error with status code and endpoint.
    pub fn gitlab_api_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::GitLabApi {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("request timed out")
        } else if err.is_connect() {
            Self::network("failed to connect to GitLab")
        } else if err.is_status() {
            Self::gitlab_api(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}
