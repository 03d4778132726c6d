//! Structural edits: copying and moving columns and rows, within a table or
//! across tables, and the maintenance operations built on them.
//!
//! An edit is described by an action naming the source, the anchor and
//! where the source lands relative to the anchor:
//!
//! ```ignore
//! copy(ColumnAction::after(&t.column("A"), &t.column("C")))?;
//! move_(RowAction::to(&t.row(0), &other.row(5)))?;
//! ```

mod column;
mod maintenance;
mod row;

use std::collections::HashSet;
use std::sync::Arc;

use tabula_store::TableRef;
use tabula_types::{Header, Index};

use crate::column::Column;
use crate::error::{TableError, TableResult};
use crate::listener::TableListenerEvent;
use crate::row::Row;
use crate::table::Table;

pub use maintenance::{
    clear_cell, clear_column, clear_row, clear_table, clone_table, compact, remove_column, remove_row, rename,
    sort_columns, sort_rows, swap_columns, swap_rows,
};

/// Where the source lands relative to the anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    /// Just before the anchor, shifting what precedes it.
    Before,
    /// Just after the anchor, shifting what follows it.
    After,
    /// Over the anchor, replacing its content.
    To,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Copy,
    Move,
}

/// The destination of a column edit.
#[derive(Clone, Debug)]
pub enum ColumnTarget {
    Column(Column),
    /// Append to the end of a table.
    Table(Table),
}

/// A column edit: `left` placed relative to `right`.
#[derive(Clone, Debug)]
pub struct ColumnAction {
    pub left: Column,
    pub right: ColumnTarget,
    pub position: Position,
}

impl ColumnAction {
    pub fn to(left: &Column, right: &Column) -> Self {
        Self::with(left, right, Position::To)
    }

    pub fn before(left: &Column, right: &Column) -> Self {
        Self::with(left, right, Position::Before)
    }

    pub fn after(left: &Column, right: &Column) -> Self {
        Self::with(left, right, Position::After)
    }

    /// `left` appended as the last column of `table`.
    pub fn to_table(left: &Column, table: &Table) -> Self {
        Self { left: left.clone(), right: ColumnTarget::Table(table.clone()), position: Position::After }
    }

    fn with(left: &Column, right: &Column, position: Position) -> Self {
        Self { left: left.clone(), right: ColumnTarget::Column(right.clone()), position }
    }
}

/// A row edit: `left` placed relative to `right`.
///
/// `right` must be addressed with `At`; `left` may use any relation and is
/// resolved separately in each column.
#[derive(Clone, Debug)]
pub struct RowAction {
    pub left: Row,
    pub right: Row,
    pub position: Position,
}

impl RowAction {
    pub fn to(left: &Row, right: &Row) -> Self {
        Self { left: left.clone(), right: right.clone(), position: Position::To }
    }

    pub fn before(left: &Row, right: &Row) -> Self {
        Self { left: left.clone(), right: right.clone(), position: Position::Before }
    }

    pub fn after(left: &Row, right: &Row) -> Self {
        Self { left: left.clone(), right: right.clone(), position: Position::After }
    }
}

#[derive(Clone, Debug)]
pub enum Action {
    Column(ColumnAction),
    Row(RowAction),
}

impl From<ColumnAction> for Action {
    fn from(action: ColumnAction) -> Self {
        Action::Column(action)
    }
}

impl From<RowAction> for Action {
    fn from(action: RowAction) -> Self {
        Action::Row(action)
    }
}

/// Copy a column or row. The source is left untouched.
pub fn copy(action: impl Into<Action>) -> TableResult<()> {
    run(action.into(), Mode::Copy)
}

/// Move a column or row, vacating the source.
pub fn move_(action: impl Into<Action>) -> TableResult<()> {
    run(action.into(), Mode::Move)
}

/// Copy a column, giving the copy the header `name`.
pub fn copy_as(action: ColumnAction, name: impl Into<Header>) -> TableResult<()> {
    column::relocate(&action, Mode::Copy, Some(name.into()))
}

/// Move a column, giving it the header `name` at its destination.
pub fn move_as(action: ColumnAction, name: impl Into<Header>) -> TableResult<()> {
    column::relocate(&action, Mode::Move, Some(name.into()))
}

fn run(action: Action, mode: Mode) -> TableResult<()> {
    match action {
        Action::Column(action) => column::relocate(&action, mode, None),
        Action::Row(action) => row::relocate(&action, mode),
    }
}

/// One event per key a column held before the change, then one per key it
/// only holds after.
pub(crate) fn column_events(
    table: &Table,
    old: &Arc<TableRef>,
    new: &Arc<TableRef>,
    headers: &[Header],
) -> Vec<TableListenerEvent> {
    let mut events = Vec::new();
    for header in headers {
        let before = old.column_indexes(header);
        let known: HashSet<Index> = before.iter().copied().collect();
        let after = new.column_indexes(header).into_iter().filter(|i| !known.contains(i));
        for index in before.into_iter().chain(after) {
            events.push(table.event(old, new, header, index));
        }
    }
    events
}

/// Events for explicit coordinates, each coordinate once.
pub(crate) fn coordinate_events(
    table: &Table,
    old: &Arc<TableRef>,
    new: &Arc<TableRef>,
    coordinates: impl IntoIterator<Item = (Header, Index)>,
) -> Vec<TableListenerEvent> {
    let mut seen = HashSet::new();
    coordinates
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .map(|(h, i)| table.event(old, new, &h, i))
        .collect()
}

/// Fail early when a table has been deleted.
pub(crate) fn require_open(table: &Table) -> TableResult<()> {
    if table.is_closed() {
        return Err(TableError::InvalidTable(format!("{table} is deleted")));
    }
    Ok(())
}
