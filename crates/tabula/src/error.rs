use tabula_events::EventError;
use tabula_store::StoreError;
use tabula_types::TypeError;
use thiserror::Error;

/// Errors surfaced by the table API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// A header could not be built.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A column selector is not usable for the requested operation.
    #[error("invalid column: {0}")]
    InvalidColumn(String),

    /// Arithmetic on an empty or non-numeric cell, or an unsupported
    /// combination of kinds.
    #[error("invalid cell: {0}")]
    InvalidCell(String),

    /// A row selector is not usable for the requested operation.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    /// The table is closed, or handles from different tables were mixed.
    #[error("invalid table: {0}")]
    InvalidTable(String),

    /// A value that cannot be stored, or an empty selection.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A listener operation failed.
    #[error("invalid listener: {0}")]
    InvalidListener(String),
}

/// Result alias for table operations.
pub type TableResult<T> = Result<T, TableError>;

impl From<StoreError> for TableError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Closed => TableError::InvalidTable(e.to_string()),
            StoreError::NoActiveBatch => TableError::InvalidTable(e.to_string()),
        }
    }
}

impl From<TypeError> for TableError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::InvalidHeader(msg) => TableError::InvalidHeader(msg),
            TypeError::UnsupportedValue(_) | TypeError::Parse { .. } => TableError::InvalidValue(e.to_string()),
        }
    }
}

impl From<EventError> for TableError {
    fn from(e: EventError) -> Self {
        TableError::InvalidListener(e.to_string())
    }
}
