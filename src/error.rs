//! # Errors
//!
//! [`VectorError`] is the single error type returned by the library layer
//! (scope resolution, collections, the store and the embedding model).
//!
//! The variants fall into two groups:
//!
//! - **Client errors**: only [`VectorError::InvalidScope`]. The request named a
//!   scope that can never be valid; retrying is pointless and no state was touched.
//! - **Server errors**: everything else. Store and model failures are passed
//!   through unmodified and are never retried here.
//!
//! Missing records are *not* errors: `delete` and `record_hit` treat them as
//! no-ops and `get` returns `None`.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, VectorError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VectorError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("embedding model unavailable: {0}")]
    Initialization(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("store error: {0}")]
    Store(#[from] diesel::result::Error),

    #[error("store connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("embedding decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl VectorError {
    /// `true` when the caller sent something unusable (maps to HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(self, VectorError::InvalidScope(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for VectorError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        VectorError::Poisoned(e.to_string())
    }
}
