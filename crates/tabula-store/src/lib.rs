//! Versioned in-memory storage for Tabula.
//!
//! A table is a chain of immutable [`TableRef`] snapshots. Each edit builds
//! a successor that shares every untouched column with its predecessor, and
//! a [`SnapshotCell`] publishes successors one at a time.
//!
//! # Design Rules
//!
//! 1. Snapshots never change once built; anything holding one keeps reading
//!    the same data.
//! 2. Writers to one table serialize on its publish step. Different tables
//!    are independent.
//! 3. A batch stages its edits privately and publishes them as one step, or
//!    not at all.
//! 4. The [`Registry`] is the only shared name lookup.

pub mod error;
pub mod registry;
pub mod snapshot;
pub mod storage;

pub use error::{StoreError, StoreResult};
pub use registry::Registry;
pub use snapshot::{ColumnCells, ColumnMeta, TableRef};
pub use storage::{SnapshotCell, Transition, WriteGuard};
