//! Pool Error Taxonomy
//!
//! Every fallible operation in the pool core returns `PoolError`. The variant
//! decides how the cycle boundary reacts: transient network failures abandon
//! the cycle and wait for the next poll, everything else propagates.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use std::fmt;
use thiserror::Error;

/// Errors raised by the pool core and its collaborators
#[derive(Debug, Error)]
pub enum PoolError {
    /// Malformed input (empty transaction id, non-positive quantity, bad address)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unreachable host or timeout from an external collaborator
    #[error("Network unavailable during {operation}: {message}")]
    NetworkTransient { operation: String, message: String },

    /// Curve math invoked outside its valid domain
    #[error("Curve domain error: {0}")]
    Domain(String),

    /// Anything else, logged with context and re-thrown
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

/// Coarse classification used by callers to pick a recovery path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NetworkTransient,
    Domain,
    Unhandled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NetworkTransient => write!(f, "network-transient"),
            ErrorKind::Domain => write!(f, "domain"),
            ErrorKind::Unhandled => write!(f, "unhandled"),
        }
    }
}

impl PoolError {
    pub fn validation(message: impl Into<String>) -> Self {
        PoolError::Validation(message.into())
    }

    pub fn domain(message: impl Into<String>) -> Self {
        PoolError::Domain(message.into())
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::NetworkTransient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Validation(_) => ErrorKind::Validation,
            PoolError::NetworkTransient { .. } => ErrorKind::NetworkTransient,
            PoolError::Domain(_) => ErrorKind::Domain,
            PoolError::Unhandled(_) => ErrorKind::Unhandled,
        }
    }

    /// Only transient errors are retried, and only by the next scheduled poll
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::NetworkTransient
    }
}

/// Result alias for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;
