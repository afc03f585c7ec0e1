//! Error types for starstream
//!
//! Errors fall into two scopes:
//! - **Item** errors (permanent miss, decode failure, exhausted retries) are
//!   isolated to one time key or location. The pipeline reports them and drops the item.
//! - **Run** errors (invalid range, configuration, local filesystem) abort the
//!   run of the adapter that raised them.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Result type alias for starstream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for starstream
#[derive(Debug, Error)]
pub enum Error {
    /// Interval whose start lies after its end
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start instant
        start: NaiveDateTime,
        /// Requested end instant
        end: NaiveDateTime,
    },

    /// Sampling step that is zero or finer than the source can serve
    #[error("invalid step: {0}")]
    InvalidStep(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Transient network failure (connection reset, timeout)
    #[error("transient network error: {0}")]
    Transient(String),

    /// HTTP client error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Transient failures persisted past the retry budget
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Message of the final transient failure
        last_error: String,
    },

    /// The remote side has no data for this location (non-2xx or error page)
    #[error("data not available at {location}: {reason}")]
    PermanentMiss {
        /// URL or remote identifier that was queried
        location: String,
        /// Why the response was rejected
        reason: String,
    },

    /// Raw payload could not be turned into the canonical artifact
    #[error("decode error: {0}")]
    Decode(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid regular expression in an adapter pattern
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// How far an error reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Affects a single time key or location; siblings continue
    Item,
    /// Aborts the whole adapter run
    Run,
}

impl Error {
    /// Shorthand for a [`Error::PermanentMiss`]
    pub fn miss(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::PermanentMiss {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::Config`] naming the offending key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Classify the error as item-scoped or run-scoped.
    ///
    /// Local I/O failures are run-scoped: a destination that cannot be written
    /// will fail every remaining item the same way.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::InvalidRange { .. }
            | Error::InvalidStep(_)
            | Error::Config { .. }
            | Error::Io(_)
            | Error::Pattern(_) => ErrorScope::Run,
            Error::Transient(_)
            | Error::Network(_)
            | Error::RetriesExhausted { .. }
            | Error::PermanentMiss { .. }
            | Error::Decode(_)
            | Error::Serialization(_)
            | Error::Other(_) => ErrorScope::Item,
        }
    }

    /// True for a response that says the data does not exist remotely
    pub fn is_permanent_miss(&self) -> bool {
        matches!(self, Error::PermanentMiss { .. })
    }

    /// Short machine-readable code, used in run reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRange { .. } => "invalid_range",
            Error::InvalidStep(_) => "invalid_step",
            Error::Config { .. } => "config_error",
            Error::Transient(_) => "transient_network_error",
            Error::Network(_) => "network_error",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::PermanentMiss { .. } => "permanent_miss",
            Error::Decode(_) => "decode_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Pattern(_) => "pattern_error",
            Error::Other(_) => "internal_error",
        }
    }
}
