//! Custom error types for fixguard.
//!
//! Gate outcomes are never errors: a BLOCK is an ordinary
//! [`GateDecision`](crate::gate::GateDecision) value. The errors here cover
//! configuration, malformed requests, and session storage trouble.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fixguard operations
#[derive(Error, Debug)]
pub enum GuardError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Request Errors
    // =========================================================================
    /// The action request could not be evaluated
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Session store could not be read or written
    #[error("Session storage error for {key}: {message}")]
    Storage { key: String, message: String },

    /// Could not acquire the per-key session lock
    #[error("Failed to acquire session lock {path}: {message}")]
    Lock { path: PathBuf, message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GuardError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if this error comes from the session store rather than the caller
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Lock { .. } | Self::Io(_) | Self::Json(_)
        )
    }

    /// Get error code for exit status.
    ///
    /// Code 2 is reserved for BLOCK decisions and never returned here.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for fixguard results
pub type Result<T> = std::result::Result<T, GuardError>;

/// Extension trait for converting foreign errors to a storage GuardError
pub trait IntoGuardError<T> {
    fn into_guard_storage(self, key: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoGuardError<T> for std::result::Result<T, E> {
    fn into_guard_storage(self, key: &str) -> Result<T> {
        self.map_err(|e| GuardError::storage(key, e.into().to_string()))
    }
}
