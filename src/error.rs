//! Error types
//!
//! Errors surfaced by subscribers, providers and the registry.

use std::io;
use std::sync::Arc;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BroadcastError>;

/// Error type for broadcast operations
///
/// Cheap to clone so that a single upstream failure can be handed to every
/// subscriber waiting on the same round.
#[derive(Debug, Clone)]
pub enum BroadcastError {
    /// The physical source failed while reading; the provider is poisoned
    UpstreamRead(Arc<io::Error>),
    /// The physical source failed while closing
    Close(Arc<io::Error>),
    /// The handle was used in a way its state does not allow
    IllegalUse(&'static str),
    /// A blocking wait could not complete (poisoned lock, cancelled task)
    WaitFailed(String),
}

impl BroadcastError {
    /// Whether this error leaves the provider permanently unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BroadcastError::UpstreamRead(_) | BroadcastError::WaitFailed(_)
        )
    }

    pub(crate) fn upstream(err: io::Error) -> Self {
        BroadcastError::UpstreamRead(Arc::new(err))
    }

    pub(crate) fn close(err: io::Error) -> Self {
        BroadcastError::Close(Arc::new(err))
    }

    pub(crate) fn lock_poisoned() -> Self {
        BroadcastError::WaitFailed("provider lock poisoned by a panicking reader".to_string())
    }
}

impl std::fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastError::UpstreamRead(err) => write!(f, "Upstream read failed: {}", err),
            BroadcastError::Close(err) => write!(f, "Closing upstream source failed: {}", err),
            BroadcastError::IllegalUse(what) => write!(f, "Illegal use of subscriber: {}", what),
            BroadcastError::WaitFailed(why) => write!(f, "Wait for next chunk failed: {}", why),
        }
    }
}

impl std::error::Error for BroadcastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BroadcastError::UpstreamRead(err) | BroadcastError::Close(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<BroadcastError> for io::Error {
    fn from(err: BroadcastError) -> Self {
        let kind = match &err {
            BroadcastError::UpstreamRead(inner) | BroadcastError::Close(inner) => inner.kind(),
            BroadcastError::IllegalUse(_) => io::ErrorKind::InvalidInput,
            BroadcastError::WaitFailed(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
