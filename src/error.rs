//! Error types for rs-surf.
//!
//! The variants mirror the failure taxonomy of the acquisition pipeline.
//! Most of them are absorbed by the fallback cascade; only
//! [`Error::FetchExhausted`], post-launch [`Error::Render`] failures and a
//! recurring [`Error::AuthExpired`] reach the caller of `Fetcher::fetch`.

use std::fmt;

/// Error type for fetch and extraction operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// DNS, connection or timeout failure on a plain HTTP request.
    #[error("network error fetching {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying cause.
        message: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP status {status} fetching {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// Browser launch, navigation or evaluation failure.
    #[error("render error: {0}")]
    Render(String),

    /// A saved session no longer authenticates (redirected to login).
    #[error("session for {site_id} expired (redirected to {url})")]
    AuthExpired {
        /// Site whose session expired.
        site_id: String,
        /// URL the browser ended up on.
        url: String,
    },

    /// The primary or secondary article extractor failed.
    #[error("extraction engine failed: {0}")]
    ExtractionEngine(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Filesystem failure (session store, config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every retrieval strategy failed.
    #[error("all fetch strategies failed; last attempted {strategy}: {source}")]
    FetchExhausted {
        /// Last strategy tried.
        strategy: String,
        /// Cause reported by that strategy.
        #[source]
        source: Box<Error>,
    },
}

/// Tag identifying the failure class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// See [`Error::Network`].
    Network,
    /// See [`Error::HttpStatus`].
    HttpStatus,
    /// See [`Error::Render`].
    Render,
    /// See [`Error::AuthExpired`].
    AuthExpired,
    /// See [`Error::ExtractionEngine`].
    ExtractionEngine,
    /// See [`Error::Configuration`].
    Configuration,
    /// See [`Error::Io`] and [`Error::Json`].
    Storage,
    /// See [`Error::FetchExhausted`].
    FetchExhausted,
}

impl Error {
    /// Failure class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::Render(_) => ErrorKind::Render,
            Self::AuthExpired { .. } => ErrorKind::AuthExpired,
            Self::ExtractionEngine(_) => ErrorKind::ExtractionEngine,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Json(_) => ErrorKind::Storage,
            Self::FetchExhausted { .. } => ErrorKind::FetchExhausted,
        }
    }

    pub(crate) fn render(err: impl fmt::Display) -> Self {
        Self::Render(err.to_string())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::HttpStatus => "http-status",
            Self::Render => "render",
            Self::AuthExpired => "auth-expired",
            Self::ExtractionEngine => "extraction-engine",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::FetchExhausted => "fetch-exhausted",
        };
        f.write_str(name)
    }
}

/// Result type alias for fetch and extraction operations.
pub type Result<T> = std::result::Result<T, Error>;
