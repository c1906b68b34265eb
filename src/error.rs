//! Error types for the sharepointlib library.

use thiserror::Error;

/// Main error type for sharepointlib operations.
#[derive(Error, Debug)]
pub enum SharePointError {
    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status} {reason}: {} ({method} {url})", .message.as_deref().unwrap_or("no server message"))]
    Transport {
        status: u16,
        reason: String,
        /// Server-supplied error message, when the body was parseable JSON.
        message: Option<String>,
        method: String,
        url: String,
    },

    /// Network request error.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Form-digest renewal failed; no mutating call was issued.
    #[error("form digest renewal failed: {0}")]
    DigestRenewal(#[source] Box<SharePointError>),

    /// The create call that must precede an upload failed.
    #[error("upload file creation failed: {0}")]
    UploadCreate(#[source] Box<SharePointError>),

    /// A chunk transfer failed; the server was sent a cancel notification.
    #[error("upload aborted: {0}")]
    UploadAborted(#[source] Box<SharePointError>),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unexpected response from server.
    #[error("invalid response from server")]
    InvalidResponse,

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

/// Result type alias for sharepointlib operations.
pub type Result<T> = std::result::Result<T, SharePointError>;
