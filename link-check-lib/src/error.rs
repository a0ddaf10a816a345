//! Error handling for link checking operations.
//!
//! Probe failures are not errors from the caller's point of view: the worker
//! pool folds them into [`LinkStatus::Unavailable`](crate::LinkStatus). The
//! variants that do reach callers come from the dispatcher (closed pool), the
//! store (corrupt or unwritable snapshot) and request validation.

use std::fmt;

/// Main error type for link checking operations.
#[derive(Debug, Clone)]
pub enum LinkCheckError {
    /// A probe could not establish reachability (network error, timeout,
    /// malformed URL). Absorbed into `Unavailable` by the worker pool.
    ProbeInconclusive {
        url: String,
        message: String,
    },

    /// The task queue was closed before the batch could be dispatched.
    PoolClosed,

    /// The snapshot file exists but could not be parsed.
    CorruptState {
        path: String,
        message: String,
    },

    /// Reading or writing the snapshot file failed.
    PersistenceFailure {
        path: String,
        message: String,
    },

    /// The request itself was malformed (e.g. an unparsable HTTP body).
    InvalidRequest {
        reason: String,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading configuration files
    FileError {
        path: String,
        message: String,
    },

    /// Generic internal errors that don't fit other categories
    Internal {
        message: String,
    },
}

impl LinkCheckError {
    /// Create a new inconclusive probe error.
    pub fn probe<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::ProbeInconclusive {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new corrupt snapshot error.
    pub fn corrupt_state<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::CorruptState {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new persistence error.
    pub fn persistence<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::PersistenceFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid request error.
    pub fn invalid_request<R: Into<String>>(reason: R) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error means the service is shutting down rather than that
    /// the request itself was bad.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }

    /// Whether the error originates from the snapshot store.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::CorruptState { .. } | Self::PersistenceFailure { .. }
        )
    }
}

impl fmt::Display for LinkCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeInconclusive { url, message } => {
                write!(f, "Probe of '{}' inconclusive: {}", url, message)
            }
            Self::PoolClosed => {
                write!(f, "Worker pool is closed; no new tasks are accepted")
            }
            Self::CorruptState { path, message } => {
                write!(f, "Corrupt state file '{}': {}", path, message)
            }
            Self::PersistenceFailure { path, message } => {
                write!(f, "Failed to persist state to '{}': {}", path, message)
            }
            Self::InvalidRequest { reason } => {
                write!(f, "Invalid request: {}", reason)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for LinkCheckError {}

#[cfg(feature = "http-probe")]
impl From<reqwest::Error> for LinkCheckError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        if err.is_timeout() {
            Self::probe(url, "request timed out")
        } else if err.is_connect() {
            Self::probe(url, format!("connection failed: {}", err))
        } else if err.is_builder() {
            Self::probe(url, format!("malformed URL: {}", err))
        } else {
            Self::probe(url, format!("HTTP request failed: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            LinkCheckError::PoolClosed.to_string(),
            "Worker pool is closed; no new tasks are accepted"
        );
        assert_eq!(
            LinkCheckError::corrupt_state("state.json", "expected value").to_string(),
            "Corrupt state file 'state.json': expected value"
        );
        assert_eq!(
            LinkCheckError::invalid_request("empty link").to_string(),
            "Invalid request: empty link"
        );
    }

    #[test]
    fn test_classification() {
        assert!(LinkCheckError::PoolClosed.is_shutdown());
        assert!(!LinkCheckError::PoolClosed.is_storage());
        assert!(LinkCheckError::persistence("a", "b").is_storage());
        assert!(LinkCheckError::corrupt_state("a", "b").is_storage());
        assert!(!LinkCheckError::invalid_request("x").is_storage());
    }
}
