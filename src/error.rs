//! Error types for per-proxy lookups.
//!
//! These never escape the classification pipeline: each stage logs them and
//! degrades to its least-committal result.

use thiserror::Error;

/// Failure of a single lookup stage for one IP
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    #[error("ASN database error: {0}")]
    Database(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("unexpected HTTP status: {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no API key configured")]
    MissingApiKey,
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else {
            LookupError::Http(e)
        }
    }
}

impl From<tokio::time::error::Elapsed> for LookupError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        LookupError::Timeout
    }
}
