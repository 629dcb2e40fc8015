//! Error types for the cache gateway
//!
//! All modules use `CacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache gateway operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in the cache gateway core
#[derive(Error, Debug)]
pub enum CacheError {
    // Lookup errors
    #[error("No backend record for {0}")]
    NotFound(String),

    #[error("Malformed repository document: {0}")]
    MalformedDocument(String),

    #[error("Backend unavailable: {context}")]
    BackendUnavailable { context: String },

    // Registry errors
    #[error("Registry authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unexpected registry response {status}: {body}")]
    Protocol { status: u16, body: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Unknown build policy: {0}")]
    UnknownPolicy(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a backend-unavailable error with context
    pub fn backend(context: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            context: context.into(),
        }
    }

    /// Check if the error means "no such record" rather than a failure
    ///
    /// The routing layer presents these as a plain 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
