//! Arithmetic over Tabula cell values.
//!
//! Numbers of different kinds are combined through a fixed promotion table,
//! decimal division is rounded by one process-wide [`MathConfig`], and
//! temporal values accept calendar periods and exact durations.
//!
//! # Modules
//!
//! - [`numeric`] -- promotion and the `+ - * / %` operators
//! - [`context`] -- decimal precision and rounding
//! - [`temporal`] -- [`Period`] and duration arithmetic
//! - [`error`] -- error types

pub mod context;
pub mod error;
pub mod numeric;
pub mod temporal;

pub use context::{math_config, set_math_config, MathConfig, Rounding};
pub use error::{MathError, Result};
pub use numeric::{apply, apply_with, max, min, promote, promote_values, sum, NumericKind, Op};
pub use temporal::{Amount, Period};
