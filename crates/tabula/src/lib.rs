//! Reactive, versioned tables.
//!
//! A [`Table`] is a sparse grid of typed [`Value`]s addressed by column
//! [`Header`] and signed row [`Index`]. Every change produces a new immutable
//! snapshot with a higher version, and listeners registered on a table, a
//! column, a row, a cell or a range receive one event per changed cell.
//!
//! ```ignore
//! let t = Table::named("prices");
//! t.set("Price", 0, 10i64)?;
//! let listener = t.column("Price").on().events(|events| {
//!     for e in events {
//!         println!("{e}");
//!     }
//!     Ok(())
//! })?;
//! ops::move_(ColumnAction::after(&t.column("Price"), &t.column("Name")))?;
//! ```
//!
//! # Modules
//!
//! - [`table`] -- the registry, reads, writes and batches
//! - [`cell`], [`column`], [`row`] -- handles into a table
//! - [`range`], [`cells`] -- ranges and unions of cells
//! - [`listener`] -- scopes, subscriptions and events
//! - [`ops`] -- copy and move of columns and rows, plus maintenance
//! - [`functions`] -- aggregates and bound cells
//! - [`utils`] -- typed extraction helpers
//! - [`error`] -- error types

pub mod cell;
pub mod cells;
pub mod column;
pub mod error;
pub mod functions;
pub mod iter;
pub mod listener;
pub mod ops;
pub mod range;
pub mod row;
pub mod table;
pub mod utils;

pub use cell::Cell;
pub use cells::{CellSource, Cells};
pub use column::Column;
pub use error::{TableError, TableResult};
pub use functions::{bind, Aggregate};
pub use iter::CellIter;
pub use listener::{ListenerBuilder, ListenerReference, ListenerScope, TableListenerEvent};
pub use ops::{copy, copy_as, move_, move_as, Action, ColumnAction, ColumnTarget, Mode, Position, RowAction};
pub use range::{CellOrder, CellRange, ColumnRange, RowIter, RowRange};
pub use row::Row;
pub use table::{Table, TableSnapshot};

// Re-export the value model and configuration so callers need one dependency.
pub use tabula_events::{ListenerConfig, ListenerError, ListenerId, ListenerInfo};
pub use tabula_math::{math_config, set_math_config, MathConfig, Period, Rounding};
pub use tabula_types::{chrono, BigDecimal, BigInt, FromValue, Header, Index, IndexRelation, Value, ValueKind};
