use std::time::Duration;

use thiserror::Error;

/// Failure surface of a discovery source.
///
/// Only [`DiscoveryError::RateLimited`] may put an endpoint into backoff;
/// every other variant is retried on the next cycle without touching the
/// budget beyond the attempted call.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("rate limited (retry_after: {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out")]
    Timeout,

    #[error("transport: {0}")]
    Transport(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl DiscoveryError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, DiscoveryError::RateLimited { .. })
    }

    /// Server-supplied cool-down hint, when the provider sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DiscoveryError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DiscoveryError::Timeout
        } else {
            DiscoveryError::Transport(err.to_string())
        }
    }
}

/// Reply drafting failed. Never fatal: the pipeline substitutes a
/// deterministic fallback reply and keeps the opportunity.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,

    #[error("provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("generator disabled")]
    Disabled,
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Provider {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }
}

/// A notification send that did not land. Logged, surfaced in `/status`,
/// never aborts the scheduler loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{sink} send timed out after {after:?}")]
    Timeout { sink: &'static str, after: Duration },

    #[error("{sink}: {message}")]
    Failed { sink: &'static str, message: String },
}

impl DispatchError {
    pub fn sink(&self) -> &'static str {
        match self {
            DispatchError::Timeout { sink, .. } => sink,
            DispatchError::Failed { sink, .. } => sink,
        }
    }
}

/// Dedup-store or history I/O failure. Callers log loudly and keep serving
/// from memory for the rest of the cycle.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
