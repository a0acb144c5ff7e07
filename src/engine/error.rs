//! Error types for the request engine.
//!
//! Errors carry enough context to be rendered by a host layer without access
//! to engine internals: the failing URL or path, the HTTP status and reason,
//! and a best-effort detail message extracted from error response bodies.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while orchestrating a web request.
#[derive(Debug, Error)]
pub enum WebError {
    /// Conflicting or incomplete configuration, detected before any network
    /// activity (credential conflicts, missing tokens, body conflicts, ...).
    #[error("invalid configuration: {message}")]
    Validation {
        /// Description of the conflict.
        message: String,
    },

    /// The target URI is absent or cannot be resolved to an absolute URI.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL string.
        url: String,
    },

    /// A malformed Content-Type or header value under strict validation.
    #[error("invalid content type: {message}")]
    ContentType {
        /// Description of the malformed value.
        message: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS, ...).
    /// Transport errors are never retried; they terminate the operation.
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP status after the retry policy was exhausted.
    #[error("HTTP {status} ({reason}) requesting {url}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The reason phrase for the status.
        reason: String,
        /// Best-effort human-readable detail extracted from the response
        /// body with HTML tags stripped. Absent when extraction failed.
        detail: Option<String>,
        /// The URL that returned the status.
        url: String,
    },

    /// Auto-redirect is disabled (explicit cap of 0) and the server answered
    /// with a redirect. Reported per page, never fatal to a paginated run.
    #[error("maximum redirection count exceeded requesting {url}")]
    RedirectLimitExceeded {
        /// The URL that answered with a redirect.
        url: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("{message}: {source}")]
    ClientBuild {
        /// What was being configured.
        message: String,
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// File system error while reading a body file or writing the output.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The operation's cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl WebError {
    /// Creates a configuration validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a content-type error.
    pub fn content_type(message: impl Into<String>) -> Self {
        Self::ContentType {
            message: message.into(),
        }
    }

    /// Creates a network error from a transport error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status failure.
    pub fn http_status(
        status: u16,
        reason: impl Into<String>,
        detail: Option<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::HttpStatus {
            status,
            reason: reason.into(),
            detail,
            url: url.into(),
        }
    }

    /// Creates a redirect-limit-exceeded report.
    pub fn redirect_limit_exceeded(url: impl Into<String>) -> Self {
        Self::RedirectLimitExceeded { url: url.into() }
    }

    /// Creates a client construction error.
    pub fn client_build(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::ClientBuild {
            message: message.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// No From<reqwest::Error> or From<std::io::Error> impls: the variants require
// context (url, path) the source errors do not carry, so callers go through
// the constructor helpers instead.
