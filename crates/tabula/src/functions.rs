//! Aggregates over cells, and listeners that keep a cell bound to one.

use std::fmt;

use serde::{Deserialize, Serialize};
use tabula_types::Value;

use crate::cell::Cell;
use crate::cells::Cells;
use crate::error::{TableError, TableResult};
use crate::listener::ListenerReference;

/// Sum of the numeric cells, or empty when there are none.
pub fn sum<I>(cells: I) -> TableResult<Value>
where
    I: IntoIterator<Item = Cell>,
{
    let values: Vec<Value> = cells.into_iter().map(Cell::into_value).collect();
    tabula_math::sum(&values).map_err(|e| TableError::InvalidCell(format!("sum failed: {e}")))
}

pub fn max<I>(cells: I) -> Value
where
    I: IntoIterator<Item = Cell>,
{
    let values: Vec<Value> = cells.into_iter().map(Cell::into_value).collect();
    tabula_math::max(&values)
}

pub fn min<I>(cells: I) -> Value
where
    I: IntoIterator<Item = Cell>,
{
    let values: Vec<Value> = cells.into_iter().map(Cell::into_value).collect();
    tabula_math::min(&values)
}

/// Number of non-empty cells.
pub fn count<I>(cells: I) -> usize
where
    I: IntoIterator<Item = Cell>,
{
    cells.into_iter().filter(|c| !c.is_empty()).count()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Max,
    Min,
    Count,
}

impl Aggregate {
    pub fn apply<I>(&self, cells: I) -> TableResult<Value>
    where
        I: IntoIterator<Item = Cell>,
    {
        match self {
            Self::Sum => sum(cells),
            Self::Max => Ok(max(cells)),
            Self::Min => Ok(min(cells)),
            Self::Count => Ok(Value::from(count(cells) as u64)),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Count => "count",
        };
        f.write_str(s)
    }
}

/// Keep `target` equal to `aggregate` over `source`.
///
/// The value is written once right away and again after every change to
/// the source cells. A target inside the source is not re-triggered by its
/// own update.
pub fn bind(target: &Cell, source: &Cells, aggregate: Aggregate) -> TableResult<ListenerReference> {
    let table = target.table().clone();
    let header = target.header().clone();
    let index = target.index();
    let cells = source.clone();
    let update = move || -> TableResult<()> {
        let value = aggregate.apply(cells.iter())?;
        if table.get(header.clone(), index) != value {
            table.set(header.clone(), index, value)?;
        }
        Ok(())
    };
    update()?;
    source
        .on()
        .name(format!("{aggregate} into {}:{}", target.header(), target.index()))
        .skip_history()
        .events(move |_| Ok(update()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    fn table() -> Table {
        let t = Table::anonymous();
        t.set("A", 0, 1i64).unwrap();
        t.set("A", 1, 2.5).unwrap();
        t.set("A", 2, "skip").unwrap();
        t.set("A", 3, 4i64).unwrap();
        t
    }

    // ---- Test 1: aggregates skip non-numbers ----
    #[test]
    fn aggregates() {
        let t = table();
        assert_eq!(sum(t.column("A").iter()).unwrap(), Value::Double(7.5));
        assert_eq!(max(&t.column("A")), Value::Long(4));
        assert_eq!(min(&t.column("A")), Value::Long(1));
        assert_eq!(count(&t.column("A")), 4);
        assert_eq!(sum(t.column("Empty").iter()).unwrap(), Value::Empty);
    }

    // ---- Test 2: bound cells follow their source ----
    #[test]
    fn bind_recomputes() {
        let t = table();
        let total = Table::anonymous();
        bind(&total.cell("Total", 0), &Cells::of(t.column("A")), Aggregate::Sum).unwrap();
        assert_eq!(total.get("Total", 0), Value::Double(7.5));
        t.set("A", 4, 2.5).unwrap();
        assert_eq!(total.get("Total", 0), Value::Double(10.0));
        t.clear_cell("A", 1).unwrap();
        assert_eq!(total.get("Total", 0), Value::Double(7.5));
    }

    // ---- Test 3: a target inside its own source settles ----
    #[test]
    fn bind_inside_source() {
        let t = Table::anonymous();
        t.set("A", 0, 1i64).unwrap();
        t.set("A", 1, 2i64).unwrap();
        bind(&t.cell("B", 0), &Cells::of(&t), Aggregate::Count).unwrap();
        assert_eq!(t.get("B", 0), Value::Long(2));
        t.set("A", 2, 3i64).unwrap();
        assert_eq!(t.get("B", 0), Value::Long(4));
    }
}
