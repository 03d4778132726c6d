use tabula_types::ValueKind;
use thiserror::Error;

/// Errors produced by arithmetic on cell values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MathError {
    /// An operand is not a number (this includes the empty value).
    #[error("value of kind {0} is not numeric")]
    NotNumeric(ValueKind),

    /// Integer or decimal division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A double that has no decimal form (NaN or infinite).
    #[error("{0} has no decimal representation")]
    NotRepresentable(String),

    /// A temporal value combined with an amount it does not support.
    #[error("cannot apply {amount} to a {kind} value")]
    IncompatibleTemporal { kind: ValueKind, amount: &'static str },

    /// Calendar arithmetic left the supported range.
    #[error("temporal overflow")]
    TemporalOverflow,
}

/// Result alias for math operations.
pub type Result<T> = std::result::Result<T, MathError>;
