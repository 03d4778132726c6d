use crate::listener::ListenerId;

/// Errors from listener management.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// No listener is registered under this id.
    #[error("unknown listener: {0}")]
    UnknownListener(ListenerId),
}

/// Result alias for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
