use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tabula_store::{ColumnCells, TableRef};
use tabula_types::{Header, Index, IndexRelation, Value};
use tracing::debug;

use super::{coordinate_events, require_open, Mode, Position, RowAction};
use crate::error::{TableError, TableResult};
use crate::listener::TableListenerEvent;
use crate::table::Table;

/// The source row as found in one column: the index it resolved to and the
/// value there.
type Found = BTreeMap<Header, (Index, Value)>;

fn overflow(index: Index) -> TableError {
    TableError::InvalidRow(format!("row index {index} out of range"))
}

/// Resolve the source row in every column of `snapshot`.
fn find(snapshot: &TableRef, index: Index, relation: IndexRelation) -> Found {
    snapshot
        .all_headers()
        .into_iter()
        .filter_map(|h| snapshot.resolve(&h, index, relation).map(|found| (h, found)))
        .collect()
}

/// Make room next to `anchor`: indexes beyond it move one step outward.
fn shift(cells: &ColumnCells, anchor: Index, position: Position) -> TableResult<ColumnCells> {
    let mut shifted = ColumnCells::new();
    for (index, value) in cells.iter() {
        let target = match position {
            Position::After if *index > anchor => index.checked_add(1).ok_or_else(|| overflow(*index))?,
            Position::Before if *index < anchor => index.checked_sub(1).ok_or_else(|| overflow(*index))?,
            _ => *index,
        };
        shifted.insert(target, value.clone());
    }
    Ok(shifted)
}

fn put(cells: &mut ColumnCells, index: Index, value: Value) {
    if value.is_empty() {
        cells.remove(&index);
    } else {
        cells.insert(index, value);
    }
}

/// The index the source row lands on.
fn landing(anchor: Index, position: Position) -> TableResult<Index> {
    match position {
        Position::To => Ok(anchor),
        Position::After => anchor.checked_add(1).ok_or_else(|| overflow(anchor)),
        Position::Before => anchor.checked_sub(1).ok_or_else(|| overflow(anchor)),
    }
}

/// Write the source values into `base`, shifting first when inserting.
///
/// `vacate` lists the cells to remove before anything moves (a move within
/// one table).
fn place(
    base: &TableRef,
    values: &Found,
    vacate: Option<&Found>,
    anchor: Index,
    position: Position,
) -> TableResult<TableRef> {
    let target = landing(anchor, position)?;
    let mut next = base.clone();
    for header in base.all_headers() {
        let mut cells = base.column_cells(&header);
        if let Some((index, _)) = vacate.and_then(|v| v.get(&header)) {
            cells.remove(index);
        }
        if position != Position::To {
            cells = shift(&cells, anchor, position)?;
        }
        let value = values.get(&header).map(|(_, v)| v.clone()).unwrap_or_default();
        put(&mut cells, target, value);
        next = next.with_column_cells(&header, cells);
    }
    Ok(next)
}

/// The source row and the source's column layout, read from one snapshot.
fn lift(snapshot: &TableRef, index: Index, relation: IndexRelation) -> (Found, Vec<(Header, bool)>) {
    let found = find(snapshot, index, relation);
    let layout = snapshot
        .all_headers()
        .into_iter()
        .map(|h| {
            let prenatal = snapshot.column_meta(&h).is_some_and(|m| m.prenatal);
            (h, prenatal)
        })
        .collect();
    (found, layout)
}

/// Place a row lifted from another table, bringing its columns along.
fn land(
    base: &TableRef,
    found: &Found,
    layout: &[(Header, bool)],
    anchor: Index,
    position: Position,
) -> TableResult<TableRef> {
    let mut base = base.clone();
    for (header, prenatal) in layout {
        base = base.ensure_column(header, *prenatal);
    }
    place(&base, found, None, anchor, position)
}

/// Every index beyond the anchor in either snapshot, ascending.
fn shifted_indexes(old: &TableRef, new: &TableRef, anchor: Index, position: Position) -> Vec<Index> {
    let all: BTreeSet<Index> = old.indexes().into_iter().chain(new.indexes()).collect();
    match position {
        Position::After => all.into_iter().filter(|i| *i > anchor).collect(),
        Position::Before => all.into_iter().filter(|i| *i < anchor).collect(),
        Position::To => Vec::new(),
    }
}

/// Coordinates of the vacated source row, one per column.
fn source_coordinates(snapshot: &TableRef, found: &Found, index: Index) -> Vec<(Header, Index)> {
    snapshot
        .headers()
        .into_iter()
        .map(|h| {
            let at = found.get(&h).map(|(i, _)| *i).unwrap_or(index);
            (h, at)
        })
        .collect()
}

/// Destination coordinates: the landing row for an overwrite, or every
/// shifted index of every column for an insert.
fn destination_coordinates(
    old: &TableRef,
    new: &TableRef,
    anchor: Index,
    position: Position,
) -> Vec<(Header, Index)> {
    let indexes = match position {
        Position::To => vec![anchor],
        _ => shifted_indexes(old, new, anchor, position),
    };
    new.headers()
        .into_iter()
        .flat_map(|h| indexes.iter().map(move |i| (h.clone(), *i)))
        .collect()
}

pub(super) fn relocate(action: &RowAction, mode: Mode) -> TableResult<()> {
    let RowAction { left, right, position } = action;
    let position = *position;
    right.require_exact()?;
    let source = left.table();
    let destination = right.table();
    let anchor = right.index();
    require_open(destination)?;
    if mode == Mode::Move {
        require_open(source)?;
    }

    if source.same_as(destination) {
        return relocate_within(destination, left.index(), left.relation(), anchor, position, mode);
    }

    match mode {
        Mode::Copy => {
            let (found, layout) = lift(&source.current(), left.index(), left.relation());
            let mut write = destination.write()?;
            let (old, new) = write.apply(|base| land(base, &found, &layout, anchor, position))?;
            let coordinates = destination_coordinates(&old, &new, anchor, position);
            write.emit(coordinate_events(destination, &old, &new, coordinates));
        }
        Mode::Move => {
            // Both tables change under one pair of locks, or neither does.
            let mut pair = Table::write_pair(source, destination)?;
            let source_base = pair.first.base();
            let (found, layout) = lift(&source_base, left.index(), left.relation());
            let dest_next = land(&pair.second.base(), &found, &layout, anchor, position)?;
            let mut source_next = (*source_base).clone();
            for (header, (index, _)) in &found {
                source_next = source_next.without_cell(header, *index);
            }
            let (src_old, src_new) = pair.first.publish(source_next);
            let (dest_old, dest_new) = pair.second.publish(dest_next);
            let coordinates = source_coordinates(&src_old, &found, left.index());
            pair.first.emit(coordinate_events(source, &src_old, &src_new, coordinates));
            let coordinates = destination_coordinates(&dest_old, &dest_new, anchor, position);
            pair.second.emit(coordinate_events(destination, &dest_old, &dest_new, coordinates));
        }
    }
    debug!(from = %source, to = %destination, row = %left, anchor, ?position, ?mode, "row relocated across tables");
    Ok(())
}

fn relocate_within(
    table: &Table,
    index: Index,
    relation: IndexRelation,
    anchor: Index,
    position: Position,
    mode: Mode,
) -> TableResult<()> {
    let mut found = Found::new();
    let mut write = table.write()?;
    let (old, new): (Arc<TableRef>, Arc<TableRef>) = write.apply(|base| {
        found = find(base, index, relation);
        let vacate = (mode == Mode::Move).then_some(&found);
        place(base, &found, vacate, anchor, position)
    })?;

    let destination = destination_coordinates(&old, &new, anchor, position);
    let coordinates: Vec<(Header, Index)> = match mode {
        Mode::Copy => destination,
        Mode::Move => {
            let shifted: BTreeSet<Index> = shifted_indexes(&old, &new, anchor, position).into_iter().collect();
            source_coordinates(&old, &found, index)
                .into_iter()
                .filter(|(_, i)| !shifted.contains(i))
                .chain(destination)
                .collect()
        }
    };
    debug!(table = %table, row = index, anchor, ?position, ?mode, version = new.version(), "row relocated");
    write.emit(coordinate_events(table, &old, &new, coordinates));
    Ok(())
}
