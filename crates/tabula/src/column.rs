use std::fmt;

use tabula_types::{Header, Index, IndexRelation, Value};

use crate::cell::Cell;
use crate::error::TableResult;
use crate::iter::CellIter;
use crate::listener::{ListenerBuilder, ListenerScope};
use crate::range::ColumnRange;
use crate::table::Table;

/// A live handle to one column of a table.
///
/// The column need not exist yet; writing through the handle creates it.
#[derive(Clone, PartialEq, Eq)]
pub struct Column {
    table: Table,
    header: Header,
}

impl Column {
    pub(crate) fn new(table: Table, header: Header) -> Self {
        Self { table, header }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn at(&self, index: Index) -> Cell {
        self.get(IndexRelation::At, index)
    }

    pub fn before(&self, index: Index) -> Cell {
        self.get(IndexRelation::Before, index)
    }

    pub fn after(&self, index: Index) -> Cell {
        self.get(IndexRelation::After, index)
    }

    pub fn at_or_before(&self, index: Index) -> Cell {
        self.get(IndexRelation::AtOrBefore, index)
    }

    pub fn at_or_after(&self, index: Index) -> Cell {
        self.get(IndexRelation::AtOrAfter, index)
    }

    pub fn get(&self, relation: IndexRelation, index: Index) -> Cell {
        self.table.cell_at(self.header.clone(), relation, index)
    }

    pub fn set(&self, index: Index, value: impl Into<Value>) -> TableResult<()> {
        self.table.set(self.header.clone(), index, value)
    }

    pub fn clear(&self, index: Index) -> TableResult<()> {
        self.table.clear_cell(self.header.clone(), index)
    }

    /// Position among the table's columns, if the column exists.
    pub fn order(&self) -> Option<i64> {
        self.table.current().column_meta(&self.header).map(|m| m.order)
    }

    /// Whether the column is currently listed among the table's headers.
    pub fn exists(&self) -> bool {
        self.table.current().is_visible(&self.header)
    }

    /// Populated indexes, ascending.
    pub fn indexes(&self) -> Vec<Index> {
        self.table.current().column_indexes(&self.header)
    }

    /// Populated cells in index order.
    pub fn iter(&self) -> CellIter {
        let snapshot = self.table.current();
        let coordinates = snapshot
            .column_indexes(&self.header)
            .into_iter()
            .map(|i| (self.header.clone(), i))
            .collect();
        CellIter::new(self.table.clone(), snapshot, coordinates)
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(Cell::into_value).collect()
    }

    /// The columns between this one and `end`, inclusive.
    pub fn range_to(&self, end: &Column) -> TableResult<ColumnRange> {
        ColumnRange::new(self.clone(), end.clone())
    }

    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.table.clone(), ListenerScope::Column(self.header.clone()))
    }
}

impl<'a> IntoIterator for &'a Column {
    type Item = Cell;
    type IntoIter = CellIter;

    fn into_iter(self) -> CellIter {
        self.iter()
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column({}{})", self.table, self.header)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Test 1: relation shortcuts on a sparse column ----
    #[test]
    fn relation_shortcuts() {
        let t = Table::anonymous();
        let a = t.column("A");
        a.set(-3, "m3").unwrap();
        a.set(4, "p4").unwrap();
        assert_eq!(a.at(4).value(), &Value::from("p4"));
        assert_eq!(a.before(4).index(), -3);
        assert_eq!(a.after(-3).index(), 4);
        assert_eq!(a.at_or_before(0).value(), &Value::from("m3"));
        assert_eq!(a.at_or_after(0).value(), &Value::from("p4"));
        assert!(a.after(4).is_empty());
        assert_eq!(a.indexes(), vec![-3, 4]);
    }

    // ---- Test 2: an obtained iterator is frozen ----
    #[test]
    fn iterator_is_bound_to_creation() {
        let t = Table::anonymous();
        let a = t.column("A");
        a.set(0, 1i64).unwrap();
        a.set(1, 2i64).unwrap();
        let mut frozen = a.iter();
        a.set(2, 3i64).unwrap();
        a.clear(0).unwrap();
        assert_eq!(frozen.next().map(Cell::into_value), Some(Value::Long(1)));
        assert_eq!(frozen.next().map(Cell::into_value), Some(Value::Long(2)));
        assert!(frozen.next().is_none());
        assert_eq!(a.values(), vec![Value::Long(2), Value::Long(3)]);
    }

    // ---- Test 3: columns come into existence on write ----
    #[test]
    fn existence_and_order() {
        let t = Table::anonymous();
        assert!(!t.column("A").exists());
        assert_eq!(t.column("A").order(), None);
        t.set("B", 0, 1i64).unwrap();
        t.set("A", 0, 1i64).unwrap();
        assert!(t.column("A").exists());
        assert!(t.column("B").order() < t.column("A").order());
        assert_eq!(t.headers(), vec![Header::from("B"), Header::from("A")]);
    }
}
