//! Remote store error types.

use std::fmt;

/// Errors that can occur talking to the remote store.
#[derive(Debug)]
pub enum StoreError {
    /// Store unreachable or connection lost
    Unavailable(String),
    /// IO error
    Io(std::io::Error),
    /// Backend-specific error
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "store unavailable: {}", e),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Backend(e) => write!(f, "store backend error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Result type for remote store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
