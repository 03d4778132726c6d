use std::fmt;

use tabula_types::{Header, Index, IndexRelation, Value};

use crate::cell::Cell;
use crate::error::{TableError, TableResult};
use crate::iter::CellIter;
use crate::listener::{ListenerBuilder, ListenerScope};
use crate::range::RowRange;
use crate::table::Table;

/// A live handle to one row of a table.
///
/// A row built with a relation other than [`IndexRelation::At`] resolves
/// its index separately in every column.
#[derive(Clone, PartialEq, Eq)]
pub struct Row {
    table: Table,
    index: Index,
    relation: IndexRelation,
}

impl Row {
    pub(crate) fn new(table: Table, index: Index, relation: IndexRelation) -> Self {
        Self { table, index, relation }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn index(&self) -> Index {
        self.index
    }

    pub fn relation(&self) -> IndexRelation {
        self.relation
    }

    /// The cell of this row in column `header`.
    pub fn get(&self, header: impl Into<Header>) -> Cell {
        self.table.cell_at(header, self.relation, self.index)
    }

    /// Write into this row. Only rows addressed with `At` accept writes.
    pub fn set(&self, header: impl Into<Header>, value: impl Into<Value>) -> TableResult<()> {
        self.require_exact()?;
        self.table.set(header, self.index, value)
    }

    pub(crate) fn require_exact(&self) -> TableResult<()> {
        if !self.relation.is_exact() {
            return Err(TableError::InvalidRow(format!(
                "row {} {} cannot be written to",
                self.relation, self.index
            )));
        }
        Ok(())
    }

    /// Headers of the columns that have a value in this row.
    pub fn headers(&self) -> Vec<Header> {
        self.iter().map(|c| c.header().clone()).collect()
    }

    /// Populated cells of this row in column order.
    pub fn iter(&self) -> CellIter {
        let snapshot = self.table.current();
        let coordinates = snapshot
            .headers()
            .into_iter()
            .filter_map(|h| snapshot.resolve(&h, self.index, self.relation).map(|(i, _)| (h, i)))
            .collect();
        CellIter::new(self.table.clone(), snapshot, coordinates)
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(Cell::into_value).collect()
    }

    /// Every row between this one and `end`, inclusive.
    pub fn range_to(&self, end: &Row) -> TableResult<RowRange> {
        RowRange::new(self.clone(), end.clone())
    }

    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.table.clone(), ListenerScope::Row(self.index, self.relation))
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = Cell;
    type IntoIter = CellIter;

    fn into_iter(self) -> CellIter {
        self.iter()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row({}, {} {})", self.table, self.relation, self.index)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relation.is_exact() {
            write!(f, "{}", self.index)
        } else {
            write!(f, "{} {}", self.relation, self.index)
        }
    }
}
