//! Error types for the Frappe client.
//!
//! # Design
//! Each failure kind a caller may want to branch on gets its own variant:
//! a rejected login, an exception raised on the server, a doctype without an
//! upload template. Network failures keep the underlying `ureq::Error` so the
//! caller can still inspect timeouts and TLS problems.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FrappeError>;

/// Errors returned by `FrappeClient` operations.
#[derive(Debug, Error)]
pub enum FrappeError {
    /// Login did not answer with the `"Logged In"` sentinel.
    #[error("login rejected by server: {message}")]
    Auth { message: String },

    /// The response envelope carried a truthy `exc` field.
    #[error("server raised an exception: {detail}")]
    Server { detail: String },

    /// The doctype is not in the server's list of importable doctypes.
    #[error("the doctype `{doctype}` is not uploadable, so you can't download the template")]
    NotUploadable { doctype: String },

    /// A document is missing a key needed to build the request URL.
    #[error("document has no `{field}` field")]
    MissingField { field: &'static str },

    /// The response body was not valid JSON.
    #[error("response is not valid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    /// Network, timeout, proxy or TLS failure from the HTTP stack.
    #[error(transparent)]
    Transport(#[from] ureq::Error),

    /// Reading a streamed response body failed.
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FrappeError {
    /// True when the request hit the configured timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FrappeError::Transport(ureq::Error::Timeout(_)))
    }
}
