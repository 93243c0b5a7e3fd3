//! Unified error types for linkpeek.
//!
//! Every variant renders with a stable UPPER_SNAKE code prefix so log lines
//! and MCP error payloads can be matched on without parsing prose.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the preview pipeline.
///
/// None of these reach an end user directly: the preview service turns
/// every failure into a fallback link.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty HTML).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be normalized or uses an unsupported scheme.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// SSRF blocked - private/internal address not allowed.
    #[error("SSRF_BLOCKED: {0}")]
    SsrfBlocked(String),

    /// Fetch exceeded the configured timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Connection, DNS, TLS or redirect failure.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Origin answered with something other than 200 OK.
    #[error("BAD_STATUS: {0}")]
    BadStatus(u16),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Origin answered 200 with no body.
    #[error("EMPTY_BODY: {0}")]
    EmptyBody(String),

    /// No usable preview metadata in the document.
    #[error("PARSE_FAILURE: {0}")]
    ParseFailure(String),

    /// No cache entry found for the given URL.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Background refresh queue is full or shut down.
    #[error("QUEUE_FULL: {0}")]
    QueueFull(String),

    /// A queued refresh no longer owns its fetch lock.
    #[error("LOCK_LOST: {0}")]
    LockLost(String),

    /// Stored value could not be encoded or decoded.
    #[error("SERIALIZATION: {0}")]
    Serialization(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::ParseFailure(msg) => (-32000, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::SsrfBlocked(msg) => (-32004, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::BadStatus(status) => (-32008, format!("status {status}")),
            Error::Network(msg) => (-32008, msg.clone()),
            Error::EmptyBody(msg) => (-32008, msg.clone()),
            Error::QueueFull(msg) => (-32013, msg.clone()),
            Error::LockLost(msg) => (-32014, msg.clone()),
            Error::Serialization(msg) => (-32002, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
