//! Error types for the Gregory build pipeline.
//!
//! Library crates use [`GregoryError`] via `thiserror`.
//! The `gregory-build` binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Gregory build operations.
#[derive(Debug, thiserror::Error)]
pub enum GregoryError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport or HTTP failure while fetching one API page.
    #[error("fetch failed for {url}{}: {cause}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Fetch {
        url: String,
        status: Option<u16>,
        cause: String,
    },

    /// Malformed field or payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Failure writing one tabular sink file.
    #[error("export to {path:?} failed: {cause}")]
    Export { path: PathBuf, cause: String },

    /// Filesystem failure creating a category directory or index document.
    #[error("could not materialize {path:?}: {source}")]
    Materialize {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external tool (site generator, VCS, press kit) failed or is missing.
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Direct-store read error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embed token signing error.
    #[error("signing error: {0}")]
    Signing(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input shape, empty collections, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GregoryError>;

impl GregoryError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a fetch error for `url`.
    pub fn fetch(url: impl Into<String>, status: Option<u16>, cause: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            status,
            cause: cause.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create an export error for the sink at `path`.
    pub fn export(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::Export {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    /// Wrap a `std::io::Error` raised while materializing a category.
    pub fn materialize(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Materialize {
            path: path.into(),
            source,
        }
    }

    /// Create an external tool error.
    pub fn external(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: msg.into(),
        }
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
