use std::collections::BTreeSet;
use std::fmt;

use tabula_store::TableRef;
use tabula_types::{Header, Index};

use crate::cell::Cell;
use crate::column::Column;
use crate::error::{TableError, TableResult};
use crate::iter::CellIter;
use crate::listener::{ListenerBuilder, ListenerScope};
use crate::row::Row;
use crate::table::Table;

/// Which way a [`CellRange`] walks its rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CellOrder {
    /// Column by column, each top to bottom.
    #[default]
    Column,
    /// Row by row, each left to right.
    Row,
}

pub(crate) fn check_same_table(a: &Table, b: &Table) -> TableResult<()> {
    if !a.same_as(b) {
        return Err(TableError::InvalidTable(format!("{a} and {b} are different tables")));
    }
    Ok(())
}

/// Visible headers whose order lies between the orders of `start` and
/// `end`, walking from `start`. Empty if either endpoint is missing.
pub(crate) fn headers_between(snapshot: &TableRef, start: &Header, end: &Header) -> Vec<Header> {
    let (Some(a), Some(b)) = (snapshot.column_meta(start), snapshot.column_meta(end)) else {
        return Vec::new();
    };
    let (lo, hi) = (a.order.min(b.order), a.order.max(b.order));
    let mut headers: Vec<Header> = snapshot
        .all_headers()
        .into_iter()
        .filter(|h| {
            snapshot
                .column_meta(h)
                .is_some_and(|m| (m.order >= lo && m.order <= hi) && (!m.prenatal || h == start || h == end))
        })
        .collect();
    if a.order > b.order {
        headers.reverse();
    }
    headers
}

pub(crate) fn header_between(snapshot: &TableRef, start: &Header, end: &Header, header: &Header) -> bool {
    match (snapshot.column_meta(start), snapshot.column_meta(end), snapshot.column_meta(header)) {
        (Some(a), Some(b), Some(m)) => m.order >= a.order.min(b.order) && m.order <= a.order.max(b.order),
        _ => false,
    }
}

pub(crate) fn index_between(start: Index, end: Index, index: Index) -> bool {
    index >= start.min(end) && index <= start.max(end)
}

/// Populated indexes of `header` in the closed range, walking from `start`.
fn column_indexes_between(snapshot: &TableRef, header: &Header, start: Index, end: Index) -> Vec<Index> {
    let cells = snapshot.column_cells(header);
    let mut indexes: Vec<Index> = cells.range(start.min(end)..=start.max(end)).map(|(i, _)| *i).collect();
    if start > end {
        indexes.reverse();
    }
    indexes
}

/// Populated coordinates of a rectangle.
fn rectangle(snapshot: &TableRef, headers: &[Header], start: Index, end: Index, order: CellOrder) -> Vec<(Header, Index)> {
    match order {
        CellOrder::Column => headers
            .iter()
            .flat_map(|h| {
                column_indexes_between(snapshot, h, start, end)
                    .into_iter()
                    .map(move |i| (h.clone(), i))
            })
            .collect(),
        CellOrder::Row => {
            let indexes: BTreeSet<Index> = headers
                .iter()
                .flat_map(|h| column_indexes_between(snapshot, h, start, end))
                .collect();
            let mut indexes: Vec<Index> = indexes.into_iter().collect();
            if start > end {
                indexes.reverse();
            }
            let mut coordinates = Vec::new();
            for i in indexes {
                for h in headers {
                    if !snapshot.cell(h, i).is_empty() {
                        coordinates.push((h.clone(), i));
                    }
                }
            }
            coordinates
        }
    }
}

/// The rectangle spanned by two cells of one table.
///
/// Columns are taken by their current order between the endpoints' columns
/// and indexes from the closed range between the endpoints' indexes. Both
/// run backwards when the start lies after the end.
#[derive(Clone, Debug)]
pub struct CellRange {
    start: Cell,
    end: Cell,
    order: CellOrder,
}

impl CellRange {
    pub fn new(start: Cell, end: Cell) -> TableResult<Self> {
        check_same_table(start.table(), end.table())?;
        Ok(Self { start, end, order: CellOrder::Column })
    }

    /// The same range walked in `order`.
    pub fn by(mut self, order: CellOrder) -> Self {
        self.order = order;
        self
    }

    pub fn start(&self) -> &Cell {
        &self.start
    }

    pub fn end(&self) -> &Cell {
        &self.end
    }

    pub fn order(&self) -> CellOrder {
        self.order
    }

    pub fn table(&self) -> &Table {
        self.start.table()
    }

    /// Headers currently inside the range, walking from the start.
    pub fn headers(&self) -> Vec<Header> {
        headers_between(&self.table().current(), self.start.header(), self.end.header())
    }

    /// Whether `cell`'s coordinate currently lies inside the range.
    pub fn contains(&self, cell: &Cell) -> bool {
        cell.table().same_as(self.table())
            && self.covers(&self.table().current(), cell.header(), cell.index())
    }

    pub(crate) fn covers(&self, snapshot: &TableRef, header: &Header, index: Index) -> bool {
        index_between(self.start.index(), self.end.index(), index)
            && header_between(snapshot, self.start.header(), self.end.header(), header)
    }

    /// Populated cells inside the range.
    pub fn iter(&self) -> CellIter {
        let snapshot = self.table().current();
        let coordinates = self.coordinates(&snapshot);
        CellIter::new(self.table().clone(), snapshot, coordinates)
    }

    pub(crate) fn coordinates(&self, snapshot: &TableRef) -> Vec<(Header, Index)> {
        let headers = headers_between(snapshot, self.start.header(), self.end.header());
        rectangle(snapshot, &headers, self.start.index(), self.end.index(), self.order)
    }

    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.table().clone(), self.scope())
    }

    pub(crate) fn scope(&self) -> ListenerScope {
        ListenerScope::CellRange {
            start: (self.start.header().clone(), self.start.index()),
            end: (self.end.header().clone(), self.end.index()),
        }
    }
}

impl<'a> IntoIterator for &'a CellRange {
    type Item = Cell;
    type IntoIter = CellIter;

    fn into_iter(self) -> CellIter {
        self.iter()
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}..{}:{}",
            self.start.header(),
            self.start.index(),
            self.end.header(),
            self.end.index()
        )
    }
}

/// The columns between two columns of one table, inclusive.
#[derive(Clone, Debug)]
pub struct ColumnRange {
    start: Column,
    end: Column,
}

impl ColumnRange {
    pub fn new(start: Column, end: Column) -> TableResult<Self> {
        check_same_table(start.table(), end.table())?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &Column {
        &self.start
    }

    pub fn end(&self) -> &Column {
        &self.end
    }

    pub fn table(&self) -> &Table {
        self.start.table()
    }

    /// Column handles currently inside the range, walking from the start.
    pub fn columns(&self) -> Vec<Column> {
        self.headers().into_iter().map(|h| self.table().column(h)).collect()
    }

    pub fn headers(&self) -> Vec<Header> {
        headers_between(&self.table().current(), self.start.header(), self.end.header())
    }

    pub fn contains(&self, column: &Column) -> bool {
        column.table().same_as(self.table())
            && header_between(&self.table().current(), self.start.header(), self.end.header(), column.header())
    }

    pub fn iter(&self) -> std::vec::IntoIter<Column> {
        self.columns().into_iter()
    }

    /// Populated cells of every column in the range.
    pub fn cells(&self) -> CellIter {
        let snapshot = self.table().current();
        let coordinates = headers_between(&snapshot, self.start.header(), self.end.header())
            .into_iter()
            .flat_map(|h| {
                let indexes = snapshot.column_indexes(&h);
                indexes.into_iter().map(move |i| (h.clone(), i))
            })
            .collect();
        CellIter::new(self.table().clone(), snapshot, coordinates)
    }

    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.table().clone(), self.scope())
    }

    pub(crate) fn scope(&self) -> ListenerScope {
        ListenerScope::ColumnRange(self.start.header().clone(), self.end.header().clone())
    }
}

impl<'a> IntoIterator for &'a ColumnRange {
    type Item = Column;
    type IntoIter = std::vec::IntoIter<Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Every row index between two rows of one table, inclusive, whether or not
/// any column holds data there.
#[derive(Clone, Debug)]
pub struct RowRange {
    start: Row,
    end: Row,
}

impl RowRange {
    /// Both rows must be addressed with `At` and belong to one table.
    pub fn new(start: Row, end: Row) -> TableResult<Self> {
        start.require_exact()?;
        end.require_exact()?;
        check_same_table(start.table(), end.table())?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &Row {
        &self.start
    }

    pub fn end(&self) -> &Row {
        &self.end
    }

    pub fn table(&self) -> &Table {
        self.start.table()
    }

    pub fn contains(&self, index: Index) -> bool {
        index_between(self.start.index(), self.end.index(), index)
    }

    /// Number of rows in the range.
    pub fn len(&self) -> u64 {
        self.start.index().abs_diff(self.end.index()) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> RowIter {
        RowIter {
            table: self.table().clone(),
            next: Some(self.start.index()),
            end: self.end.index(),
        }
    }

    /// Populated cells inside the range, row by row.
    pub fn cells(&self) -> CellIter {
        let snapshot = self.table().current();
        let headers = snapshot.headers();
        let coordinates = rectangle(&snapshot, &headers, self.start.index(), self.end.index(), CellOrder::Row);
        CellIter::new(self.table().clone(), snapshot, coordinates)
    }

    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.table().clone(), self.scope())
    }

    pub(crate) fn scope(&self) -> ListenerScope {
        ListenerScope::RowRange(self.start.index(), self.end.index())
    }
}

impl<'a> IntoIterator for &'a RowRange {
    type Item = Row;
    type IntoIter = RowIter;

    fn into_iter(self) -> RowIter {
        self.iter()
    }
}

/// Walks a [`RowRange`] one index at a time, towards its end.
#[derive(Debug)]
pub struct RowIter {
    table: Table,
    next: Option<Index>,
    end: Index,
}

impl Iterator for RowIter {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let current = self.next?;
        self.next = match current.cmp(&self.end) {
            std::cmp::Ordering::Less => current.checked_add(1),
            std::cmp::Ordering::Greater => current.checked_sub(1),
            std::cmp::Ordering::Equal => None,
        };
        Some(self.table.row(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_types::{IndexRelation, Value};

    fn grid() -> Table {
        let t = Table::anonymous();
        for h in ["A", "B", "C"] {
            for i in 0..3 {
                t.set(h, i, format!("{h}{i}")).unwrap();
            }
        }
        t
    }

    fn labels(iter: CellIter) -> Vec<String> {
        iter.map(|c| c.value().to_string()).collect()
    }

    // ---- Test 1: cell ranges walk columns or rows ----
    #[test]
    fn cell_range_orders() {
        let t = grid();
        let range = t.cell("A", 0).range_to(&t.cell("B", 1)).unwrap();
        assert_eq!(labels(range.iter()), vec!["A0", "A1", "B0", "B1"]);
        let range = range.by(CellOrder::Row);
        assert_eq!(labels(range.iter()), vec!["A0", "B0", "A1", "B1"]);
    }

    // ---- Test 2: reversed endpoints walk backwards ----
    #[test]
    fn reversed_cell_range() {
        let t = grid();
        let range = t.cell("C", 2).range_to(&t.cell("B", 1)).unwrap();
        assert_eq!(labels(range.iter()), vec!["C2", "C1", "B2", "B1"]);
        assert!(range.contains(&t.cell("B", 2)));
        assert!(!range.contains(&t.cell("A", 2)));
    }

    // ---- Test 3: ranges span a single table ----
    #[test]
    fn ranges_reject_mixed_tables() {
        let a = grid();
        let b = grid();
        assert!(matches!(a.cell("A", 0).range_to(&b.cell("A", 1)), Err(TableError::InvalidTable(_))));
        assert!(matches!(a.column("A").range_to(&b.column("A")), Err(TableError::InvalidTable(_))));
        assert!(matches!(a.row(0).range_to(&b.row(1)), Err(TableError::InvalidTable(_))));
    }

    // ---- Test 4: row ranges cover every index, with or without data ----
    #[test]
    fn row_range_is_index_shaped() {
        let t = Table::anonymous();
        t.set("A", 0, 0i64).unwrap();
        t.set("A", 4, 4i64).unwrap();
        let range = t.row(0).range_to(&t.row(4)).unwrap();
        let indexes: Vec<Index> = range.iter().map(|r| r.index()).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
        let back: Vec<Index> = t.row(2).range_to(&t.row(-1)).unwrap().iter().map(|r| r.index()).collect();
        assert_eq!(back, vec![2, 1, 0, -1]);
        assert_eq!(range.len(), 5);
        assert_eq!(
            range.cells().map(Cell::into_value).collect::<Vec<_>>(),
            vec![Value::Long(0), Value::Long(4)]
        );
    }

    // ---- Test 5: row range endpoints must be exact ----
    #[test]
    fn row_range_needs_exact_rows() {
        let t = grid();
        let r = t.row_at(IndexRelation::AtOrBefore, 0).range_to(&t.row(2));
        assert!(matches!(r, Err(TableError::InvalidRow(_))));
    }

    // ---- Test 6: column ranges follow column order ----
    #[test]
    fn column_range_follows_order() {
        let t = grid();
        let range = t.column("C").range_to(&t.column("A")).unwrap();
        let headers: Vec<String> = range.iter().map(|c| c.header().to_string()).collect();
        assert_eq!(headers, vec!["[C]", "[B]", "[A]"]);
        assert_eq!(range.cells().count(), 9);
        assert!(range.contains(&t.column("B")));
    }

    // ---- Test 7: range iterators are frozen when obtained ----
    #[test]
    fn range_iteration_is_snapshot_bound() {
        let t = grid();
        let range = t.cell("A", 0).range_to(&t.cell("A", 2)).unwrap();
        let frozen = range.iter();
        t.set("A", 1, Value::Empty).unwrap();
        assert_eq!(labels(frozen), vec!["A0", "A1", "A2"]);
        assert_eq!(labels(range.iter()), vec!["A0", "A2"]);
    }
}
