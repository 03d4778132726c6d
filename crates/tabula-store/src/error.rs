/// Errors from snapshot storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The table was deleted and no longer accepts writes.
    #[error("table is closed")]
    Closed,

    /// Commit or discard without a matching batch on this thread.
    #[error("no batch is active on this thread")]
    NoActiveBatch,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
