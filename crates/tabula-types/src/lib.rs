//! Foundation types for Tabula.
//!
//! Defines the value model shared by every other crate: typed cell values
//! with an absence sentinel, column headers, and the relations used to
//! resolve a row index against a sparse column.
//!
//! # Modules
//!
//! - [`value`] -- the [`Value`] sum type and its total ordering
//! - [`header`] -- [`Header`], an ordered tuple of labels
//! - [`relation`] -- [`IndexRelation`] lookups (at, before, after, ...)
//! - [`extract`] -- [`FromValue`] for typed reads
//! - [`error`] -- error types

pub mod error;
pub mod extract;
pub mod header;
pub mod relation;
pub mod value;

pub use error::{Result, TypeError};
pub use extract::FromValue;
pub use header::Header;
pub use relation::IndexRelation;
pub use value::{compare_values, Value, ValueKind};

/// Row index. Signed, sparse, and possibly negative.
pub type Index = i64;

// Re-export the numeric and temporal crates so callers build values with the
// same versions.
pub use bigdecimal::BigDecimal;
pub use chrono;
pub use num_bigint::BigInt;
