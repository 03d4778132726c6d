use thiserror::Error;

/// Errors produced by value and header operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A header was built from a missing label.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A value of a kind that cannot be stored in a cell.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// A textual value could not be parsed into the requested kind.
    #[error("cannot parse {input:?} as {kind}")]
    Parse { input: String, kind: String },
}

/// Result alias for type operations.
pub type Result<T> = std::result::Result<T, TypeError>;
