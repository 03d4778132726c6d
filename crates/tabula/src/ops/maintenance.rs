use std::cmp::Ordering;
use std::collections::BTreeMap;

use tabula_store::{ColumnCells, ColumnMeta};
use tabula_types::{Header, Index, Value};
use tracing::{debug, info};

use super::{column_events, coordinate_events, move_, move_as, require_open, ColumnAction, RowAction};
use crate::cell::Cell;
use crate::column::Column;
use crate::error::{TableError, TableResult};
use crate::range::{check_same_table, ColumnRange, RowRange};
use crate::row::Row;
use crate::table::Table;

/// Remove every column and cell.
pub fn clear_table(table: &Table) -> TableResult<()> {
    let mut write = table.write()?;
    let (old, new) = write.apply(|base| Ok(base.cleared()))?;
    debug!(table = %table, version = new.version(), "table cleared");
    write.emit(column_events(table, &old, &new, &old.headers()));
    Ok(())
}

/// Remove every cell of a column, keeping the column.
pub fn clear_column(column: &Column) -> TableResult<()> {
    if !column.exists() {
        return Ok(());
    }
    let table = column.table();
    let header = column.header();
    let mut write = table.write()?;
    let (old, new) = write.apply(|base| Ok(base.with_column_cells(header, ColumnCells::new())))?;
    write.emit(column_events(table, &old, &new, std::slice::from_ref(header)));
    Ok(())
}

/// Remove the row's cell in every column.
pub fn clear_row(row: &Row) -> TableResult<()> {
    let table = row.table();
    let mut cleared = Vec::new();
    let mut write = table.write()?;
    let (old, new) = write.apply(|base| {
        let mut next = base.clone();
        for header in base.headers() {
            if let Some((index, _)) = base.resolve(&header, row.index(), row.relation()) {
                next = next.without_cell(&header, index);
                cleared.push((header, index));
            }
        }
        Ok(next)
    })?;
    write.emit(coordinate_events(table, &old, &new, cleared));
    Ok(())
}

pub fn clear_cell(cell: &Cell) -> TableResult<()> {
    cell.clear()
}

/// Take a column out of its table. Snapshots taken earlier still hold it.
pub fn remove_column(column: &Column) -> TableResult<()> {
    move_(ColumnAction::to_table(column, &Table::anonymous()))
}

/// Take a row's cells out of its table. Other rows keep their indexes.
pub fn remove_row(row: &Row) -> TableResult<()> {
    let scratch = Table::anonymous();
    move_(RowAction::to(row, &scratch.row(row.index())))
}

/// Give a column a new header, keeping its position.
pub fn rename(column: &Column, name: impl Into<Header>) -> TableResult<()> {
    move_as(ColumnAction::to(column, column), name)
}

/// A copy of the table's current state, registered under `name` when given.
///
/// The copy starts at version 0 with no listeners. Registering replaces and
/// closes any table already registered under that name.
pub fn clone_table(table: &Table, name: Option<&str>) -> TableResult<Table> {
    let snapshot = table.current().as_ref().clone().with_version(0);
    let copy = Table::from_snapshot(name.map(str::to_string), &snapshot);
    if name.is_some() {
        Table::register(&copy);
    }
    info!(from = %table, to = %copy, "table cloned");
    Ok(copy)
}

/// Exchange the positions of two columns of one table.
pub fn swap_columns(a: &Column, b: &Column) -> TableResult<()> {
    check_same_table(a.table(), b.table())?;
    let table = a.table();
    require_open(table)?;
    let (ha, hb) = (a.header(), b.header());
    let mut write = table.write()?;
    let (old, new) = write.apply(|base| {
        let (Some(ma), Some(mb)) = (base.column_meta(ha), base.column_meta(hb)) else {
            return Err(TableError::InvalidColumn(format!("cannot swap {ha} and {hb}: missing column")));
        };
        Ok(base
            .with_column(ha, ColumnMeta { order: mb.order, ..ma }, base.column_cells(ha))
            .with_column(hb, ColumnMeta { order: ma.order, ..mb }, base.column_cells(hb)))
    })?;
    write.emit(column_events(table, &old, &new, &[ha.clone(), hb.clone()]));
    Ok(())
}

/// Exchange the contents of two rows of one table.
pub fn swap_rows(a: &Row, b: &Row) -> TableResult<()> {
    a.require_exact()?;
    b.require_exact()?;
    check_same_table(a.table(), b.table())?;
    let table = a.table();
    let (ia, ib) = (a.index(), b.index());
    let mut write = table.write()?;
    let (old, new) = write.apply(|base| {
        let mut next = base.clone();
        for header in base.headers() {
            let (va, vb) = (base.cell(&header, ia), base.cell(&header, ib));
            next = next.with_cell(&header, ia, vb).with_cell(&header, ib, va);
        }
        Ok(next)
    })?;
    let coordinates = old
        .headers()
        .into_iter()
        .flat_map(|h| [(h.clone(), ia), (h, ib)])
        .filter(|(h, i)| !old.cell(h, *i).is_empty() || !new.cell(h, *i).is_empty());
    write.emit(coordinate_events(table, &old, &new, coordinates));
    Ok(())
}

/// Renumber the populated rows `0, 1, 2, ...`, keeping their order.
pub fn compact(table: &Table) -> TableResult<()> {
    let mut write = table.write()?;
    let (old, new) = write.apply(|base| {
        let renumber: BTreeMap<Index, Index> = base.indexes().into_iter().zip(0..).collect();
        let mut next = base.clone();
        for header in base.all_headers() {
            let cells: ColumnCells = base
                .column_cells(&header)
                .iter()
                .map(|(i, v)| (renumber[i], v.clone()))
                .collect();
            next = next.with_column_cells(&header, cells);
        }
        Ok(next)
    })?;
    debug!(table = %table, rows = new.indexes().len(), "table compacted");
    write.emit(column_events(table, &old, &new, &old.headers()));
    Ok(())
}

/// Reorder the populated rows inside `range` by `compare`.
///
/// The populated indexes of the range stay populated; the rows sorted by
/// `compare` are written back onto them in ascending index order.
pub fn sort_rows<F>(range: &RowRange, mut compare: F) -> TableResult<()>
where
    F: FnMut(&Row, &Row) -> Ordering,
{
    let table = range.table();
    table.batch(|t| {
        let slots: Vec<Index> = t.indexes().into_iter().filter(|i| range.contains(*i)).collect();
        let mut rows: Vec<Row> = slots.iter().map(|i| t.row(*i)).collect();
        rows.sort_by(|a, b| compare(a, b));
        let sources: Vec<Index> = rows.iter().map(Row::index).collect();
        if sources == slots {
            return Ok(());
        }
        let mut write = t.write()?;
        let (old, new) = write.apply(|base| {
            let mut next = base.clone();
            for header in base.all_headers() {
                let values: Vec<Value> = sources.iter().map(|i| base.cell(&header, *i)).collect();
                for (slot, value) in slots.iter().zip(values) {
                    next = next.with_cell(&header, *slot, value);
                }
            }
            Ok(next)
        })?;
        let coordinates = old
            .headers()
            .into_iter()
            .flat_map(|h| slots.iter().map(move |i| (h.clone(), *i)))
            .filter(|(h, i)| old.cell(h, *i) != new.cell(h, *i));
        write.emit(coordinate_events(t, &old, &new, coordinates));
        Ok(())
    })
}

/// Reorder the columns inside `range` by `compare`, over the positions
/// those columns already occupy.
pub fn sort_columns<F>(range: &ColumnRange, mut compare: F) -> TableResult<()>
where
    F: FnMut(&Column, &Column) -> Ordering,
{
    let table = range.table();
    table.batch(|t| {
        let mut columns = range.columns();
        columns.sort_by_key(|c| c.order());
        let orders: Vec<i64> = columns.iter().filter_map(Column::order).collect();
        let mut sorted = columns.clone();
        sorted.sort_by(|a, b| compare(a, b));
        if sorted == columns {
            return Ok(());
        }
        let headers: Vec<Header> = sorted.iter().map(|c| c.header().clone()).collect();
        let mut write = t.write()?;
        let (old, new) = write.apply(|base| {
            let mut next = base.clone();
            for (header, order) in headers.iter().zip(&orders) {
                let meta = base
                    .column_meta(header)
                    .ok_or_else(|| TableError::InvalidColumn(format!("column {header} disappeared")))?;
                next = next.with_column(header, ColumnMeta { order: *order, ..meta }, base.column_cells(header));
            }
            Ok(next)
        })?;
        write.emit(column_events(t, &old, &new, &headers));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::copy;
    use std::sync::{Arc, Mutex};
    use tabula_types::compare_values;

    fn table() -> Table {
        let t = Table::anonymous();
        for (h, values) in [("A", [3i64, 1, 2]), ("B", [30, 10, 20])] {
            for (i, v) in values.into_iter().enumerate() {
                t.set(h, i as i64, v).unwrap();
            }
        }
        t
    }

    fn labels(t: &Table) -> Vec<String> {
        t.headers().iter().map(|h| h.to_string()).collect()
    }

    // ---- Test 1: removing a column keeps earlier cells readable ----
    #[test]
    fn remove_column_keeps_old_cells() {
        let t = table();
        let cell = t.cell("A", 0);
        remove_column(&t.column("A")).unwrap();
        assert_eq!(labels(&t), vec!["[B]"]);
        assert_eq!(cell.value(), &Value::Long(3));
        assert_eq!(t.get("A", 0), Value::Empty);
    }

    // ---- Test 2: removing a row leaves the others in place ----
    #[test]
    fn remove_row_keeps_indexes() {
        let t = table();
        remove_row(&t.row(1)).unwrap();
        assert_eq!(t.indexes(), vec![0, 2]);
        assert_eq!(t.get("B", 2), Value::Long(20));
    }

    // ---- Test 3: clearing ----
    #[test]
    fn clear_operations() {
        let t = table();
        clear_row(&t.row(0)).unwrap();
        assert!(t.row(0).values().is_empty());
        clear_column(&t.column("B")).unwrap();
        assert!(t.contains("B"));
        assert!(t.column("B").values().is_empty());
        clear_cell(&t.cell("A", 1)).unwrap();
        assert_eq!(t.indexes(), vec![2]);
        clear_table(&t).unwrap();
        assert!(t.headers().is_empty());
    }

    // ---- Test 4: renaming keeps position and data ----
    #[test]
    fn rename_in_place() {
        let t = table();
        rename(&t.column("A"), "Alpha").unwrap();
        assert_eq!(labels(&t), vec!["[Alpha]", "[B]"]);
        assert_eq!(t.get("Alpha", 0), Value::Long(3));
    }

    // ---- Test 5: clones are independent ----
    #[test]
    fn clone_is_independent() {
        let t = table();
        let name = format!("clone-test-{}", t.id());
        let c = clone_table(&t, Some(&name)).unwrap();
        assert!(Table::lookup(&name).is_some_and(|l| l.same_as(&c)));
        c.set("A", 0, 99i64).unwrap();
        assert_eq!(t.get("A", 0), Value::Long(3));
        assert_eq!(c.get("B", 1), Value::Long(10));
        Table::delete(&name);
    }

    // ---- Test 6: swapping ----
    #[test]
    fn swaps() {
        let t = table();
        swap_columns(&t.column("A"), &t.column("B")).unwrap();
        assert_eq!(labels(&t), vec!["[B]", "[A]"]);
        swap_rows(&t.row(0), &t.row(2)).unwrap();
        assert_eq!(t.get("A", 0), Value::Long(2));
        assert_eq!(t.get("B", 2), Value::Long(30));
        assert!(matches!(
            swap_columns(&t.column("A"), &t.column("Missing")),
            Err(TableError::InvalidColumn(_))
        ));
    }

    // ---- Test 7: compacting closes gaps ----
    #[test]
    fn compact_renumbers() {
        let t = Table::anonymous();
        t.set("A", -5, "a").unwrap();
        t.set("A", 10, "b").unwrap();
        t.set("B", 3, "c").unwrap();
        compact(&t).unwrap();
        assert_eq!(t.indexes(), vec![0, 1, 2]);
        assert_eq!(t.get("A", 0), Value::from("a"));
        assert_eq!(t.get("B", 1), Value::from("c"));
        assert_eq!(t.get("A", 2), Value::from("b"));
    }

    // ---- Test 8: sorting rows publishes one batch ----
    #[test]
    fn sort_rows_by_column() {
        let t = table();
        let batches = Arc::new(Mutex::new(0));
        let b = batches.clone();
        t.on()
            .skip_history()
            .events(move |_| {
                *b.lock().unwrap() += 1;
                Ok(())
            })
            .unwrap();
        let range = t.row(0).range_to(&t.row(2)).unwrap();
        sort_rows(&range, |x, y| compare_values(x.get("A").value(), y.get("A").value())).unwrap();
        assert_eq!(t.column("A").values(), vec![Value::Long(1), Value::Long(2), Value::Long(3)]);
        assert_eq!(t.column("B").values(), vec![Value::Long(10), Value::Long(20), Value::Long(30)]);
        assert_eq!(*batches.lock().unwrap(), 1);
    }

    // ---- Test 9: sorting columns by header ----
    #[test]
    fn sort_columns_by_header() {
        let t = Table::anonymous();
        for h in ["C", "A", "B"] {
            t.set(h, 0, h).unwrap();
        }
        let range = t.column("C").range_to(&t.column("B")).unwrap();
        sort_columns(&range, |x, y| x.header().cmp(y.header())).unwrap();
        assert_eq!(labels(&t), vec!["[A]", "[B]", "[C]"]);
        copy(ColumnAction::to_table(&t.column("A"), &t)).unwrap();
        assert_eq!(labels(&t), vec!["[B]", "[C]", "[A]"]);
    }
}
