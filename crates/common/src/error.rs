//! Error types for vmdesk

use thiserror::Error;

/// Result type alias using vmdesk Error
pub type Result<T> = std::result::Result<T, Error>;

/// vmdesk error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed or empty catalog payload; the previous catalog is retained.
    #[error("Invalid catalog: {0}")]
    CatalogInvalid(String),

    /// Network failure or timeout while fetching the catalog.
    #[error("Catalog unreachable: {0}")]
    CatalogUnreachable(String),

    /// The origin server reported itself unreachable (HTTP 523).
    #[error("Origin server is down")]
    OriginDown,

    #[error("Access denied to {code}: {reason}")]
    AccessDenied { code: String, reason: String },

    #[error("Password entry cancelled for {0}")]
    CredentialCancelled(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Only these halt the session controller; everything else is contained
    /// to the attempt that produced it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::OriginDown)
    }
}
