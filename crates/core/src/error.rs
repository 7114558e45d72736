//! Error types for shift-core

use thiserror::Error;

/// Result type alias using the shift-core error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the migration and backup pipelines
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration; fatal before any work starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient transport failure (timeouts, throttling, dispatch errors)
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were rejected by the endpoint
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A definitive not-found answer from the endpoint
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Verification failed: corrupt archive or size mismatch after upload
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// The database export collaborator failed
    #[error("Export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error came from a definitive not-found response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
