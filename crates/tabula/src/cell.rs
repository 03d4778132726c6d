use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use tabula_math::{apply, temporal, Amount, MathError, Op, Period};
use tabula_store::TableRef;
use tabula_types::{compare_values, Header, Index, IndexRelation, Value, ValueKind};

use crate::column::Column;
use crate::error::{TableError, TableResult};
use crate::listener::{ListenerBuilder, ListenerScope};
use crate::range::CellRange;
use crate::row::Row;
use crate::table::{Table, TableSnapshot};

/// One coordinate of a table, read from one snapshot.
///
/// The value never changes. Writing through a cell goes to the live table
/// and does not affect the cell itself.
#[derive(Clone)]
pub struct Cell {
    table: Table,
    snapshot: Arc<TableRef>,
    header: Header,
    index: Index,
    value: Value,
}

impl Cell {
    pub(crate) fn read(table: Table, snapshot: Arc<TableRef>, header: Header, index: Index) -> Self {
        let value = snapshot.cell(&header, index);
        Self { table, snapshot, header, index, value }
    }

    /// Resolve `index` with `relation`; an unresolved lookup is an empty cell
    /// at the requested index.
    pub(crate) fn resolve(
        table: Table,
        snapshot: Arc<TableRef>,
        header: Header,
        index: Index,
        relation: IndexRelation,
    ) -> Self {
        match snapshot.resolve(&header, index, relation) {
            Some((found, value)) => Self { table, snapshot, header, index: found, value },
            None => Self { table, snapshot, header, index, value: Value::Empty },
        }
    }

    /// The live table this cell belongs to.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// The version this cell was read from.
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot::new(self.table.clone(), self.snapshot.clone())
    }

    pub(crate) fn raw_snapshot(&self) -> &Arc<TableRef> {
        &self.snapshot
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn index(&self) -> Index {
        self.index
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        self.value.is_numeric()
    }

    /// The live column at this cell's header.
    pub fn column(&self) -> Column {
        self.table.column(self.header.clone())
    }

    /// The live row at this cell's index.
    pub fn row(&self) -> Row {
        self.table.row(self.index)
    }

    /// Write `value` to this coordinate of the live table.
    pub fn set(&self, value: impl Into<Value>) -> TableResult<()> {
        self.table.set(self.header.clone(), self.index, value)
    }

    pub fn clear(&self) -> TableResult<()> {
        self.table.clear_cell(self.header.clone(), self.index)
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    pub fn plus(&self, rhs: impl Into<Value>) -> TableResult<Value> {
        self.arithmetic(Op::Add, rhs.into())
    }

    pub fn minus(&self, rhs: impl Into<Value>) -> TableResult<Value> {
        self.arithmetic(Op::Sub, rhs.into())
    }

    pub fn times(&self, rhs: impl Into<Value>) -> TableResult<Value> {
        self.arithmetic(Op::Mul, rhs.into())
    }

    pub fn div(&self, rhs: impl Into<Value>) -> TableResult<Value> {
        self.arithmetic(Op::Div, rhs.into())
    }

    pub fn rem(&self, rhs: impl Into<Value>) -> TableResult<Value> {
        self.arithmetic(Op::Rem, rhs.into())
    }

    fn arithmetic(&self, op: Op, rhs: Value) -> TableResult<Value> {
        if self.is_empty() {
            return Err(self.invalid("cell is empty"));
        }
        apply(op, &self.value, &rhs).map_err(|e| self.math_error(e))
    }

    pub fn plus_period(&self, period: Period) -> TableResult<Value> {
        self.shift_time(period.into(), false)
    }

    pub fn minus_period(&self, period: Period) -> TableResult<Value> {
        self.shift_time(period.into(), true)
    }

    pub fn plus_duration(&self, duration: Duration) -> TableResult<Value> {
        self.shift_time(duration.into(), false)
    }

    pub fn minus_duration(&self, duration: Duration) -> TableResult<Value> {
        self.shift_time(duration.into(), true)
    }

    fn shift_time(&self, amount: Amount, negate: bool) -> TableResult<Value> {
        if self.is_empty() {
            return Err(self.invalid("cell is empty"));
        }
        let result = if negate {
            temporal::minus(&self.value, amount)
        } else {
            temporal::plus(&self.value, amount)
        };
        result.map_err(|e| self.math_error(e))
    }

    fn math_error(&self, error: MathError) -> TableError {
        self.invalid(&error.to_string())
    }

    fn invalid(&self, message: &str) -> TableError {
        TableError::InvalidCell(format!("{message} at {}:{}", self.header, self.index))
    }

    // ------------------------------------------------------------------
    // Ordering, ranges, listeners
    // ------------------------------------------------------------------

    /// Compare values: empty first, numbers numerically, then text order.
    pub fn compare(&self, other: &Cell) -> Ordering {
        compare_values(&self.value, &other.value)
    }

    /// The rectangle spanned by this cell and `end`.
    pub fn range_to(&self, end: &Cell) -> TableResult<CellRange> {
        CellRange::new(self.clone(), end.clone())
    }

    /// Listen to changes at this coordinate.
    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.table.clone(), ListenerScope::Cell(self.header.clone(), self.index))
    }
}

impl From<&Cell> for Value {
    fn from(cell: &Cell) -> Self {
        cell.value.clone()
    }
}

impl From<Cell> for Value {
    fn from(cell: Cell) -> Self {
        cell.value
    }
}

/// Two cells are equal when they sit at the same coordinate of the same
/// table and hold equal values.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.table.same_as(&other.table)
            && self.header == other.header
            && self.index == other.index
            && self.value == other.value
    }
}

impl PartialEq<Value> for Cell {
    fn eq(&self, other: &Value) -> bool {
        &self.value == other
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("table", &self.table.to_string())
            .field("header", &self.header)
            .field("index", &self.index)
            .field("value", &self.value)
            .field("version", &self.version())
            .finish()
    }
}
