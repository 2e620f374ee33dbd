//! Error types for storypub.
//!
//! Library crates use [`StoryPubError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all storypub operations.
#[derive(Debug, thiserror::Error)]
pub enum StoryPubError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required input (file path, username, password) was not supplied.
    #[error("missing input: {what}")]
    MissingInput { what: String },

    /// The document is empty or contains only blank lines.
    #[error("could not determine a title from the markdown")]
    NoTitleFound,

    /// No ServiceNow instance URL was configured.
    #[error("missing ServiceNow instance URL")]
    MissingInstanceUrl,

    /// The configured instance is neither an absolute URL nor a bare hostname.
    #[error("invalid ServiceNow instance URL: {url}")]
    InvalidInstanceUrl { url: String },

    /// The primary existence search failed at the transport level.
    #[error("failed to search stories: {}", describe_failure(.status, .body))]
    SearchFailed { status: Option<u16>, body: String },

    /// Network/HTTP error during create, update, or client setup.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad payload override, malformed toggle, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Render an HTTP failure as `<status> <body>`, or just the body when no response arrived.
fn describe_failure(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(status) => format!("{status} {body}"),
        None => body.to_string(),
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StoryPubError>;

impl StoryPubError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a missing-input error naming the absent value.
    pub fn missing_input(what: impl Into<String>) -> Self {
        Self::MissingInput { what: what.into() }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
