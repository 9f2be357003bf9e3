//! Error types for history-archive operations.

use thiserror::Error;

/// Errors that can occur while talking to a history archive.
///
/// Archive access is read-only HTTPS, so failures fall into transport
/// problems, non-success statuses, and documents that do not parse.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The request itself failed (connection, timeout, redirect loop).
    #[error("archive request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The archive answered with a non-success status.
    #[error("archive returned HTTP {status} for {url}")]
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The archive URL does not parse.
    #[error("invalid archive URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The archive state document does not parse as JSON.
    #[error("malformed archive state: {0}")]
    Json(#[from] serde_json::Error),

    /// The response parsed but did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No archive available to serve the request.
    #[error("no archive available")]
    NoArchiveAvailable,
}
