use std::collections::HashSet;

use tabula_store::{ColumnCells, ColumnMeta, TableRef};
use tabula_types::Header;
use tracing::debug;

use super::{column_events, require_open, ColumnAction, ColumnTarget, Mode, Position};
use crate::error::TableResult;
use crate::table::{require_header, Table};

/// Where the relocated column goes in the destination table.
struct Placement<'a> {
    anchor: Option<&'a Header>,
    position: Position,
    name: &'a Header,
    /// The source column, when it leaves the same table.
    vacate: Option<&'a Header>,
}

impl Placement<'_> {
    fn excludes(&self, header: &Header) -> bool {
        header == self.name
            || self.vacate == Some(header)
            || (self.position == Position::To && self.anchor == Some(header))
    }

    /// The destination's header sequence after the edit, with prenatal flags.
    fn layout(&self, base: &TableRef) -> Vec<(Header, bool)> {
        let prenatal = |h: &Header| base.column_meta(h).is_some_and(|m| m.prenatal);
        let mut layout = Vec::new();
        for header in base.all_headers() {
            if self.anchor == Some(&header) {
                match self.position {
                    Position::Before => {
                        layout.push((self.name.clone(), false));
                        if !self.excludes(&header) {
                            layout.push((header.clone(), prenatal(&header)));
                        }
                    }
                    Position::After => {
                        if !self.excludes(&header) {
                            layout.push((header.clone(), prenatal(&header)));
                        }
                        layout.push((self.name.clone(), false));
                    }
                    Position::To => layout.push((self.name.clone(), false)),
                }
            } else if !self.excludes(&header) {
                layout.push((header.clone(), prenatal(&header)));
            }
        }
        if self.anchor.is_none() {
            layout.push((self.name.clone(), false));
        }
        layout
    }

    /// Lay out the destination and give the relocated column `cells`.
    ///
    /// The existing order values are reused in ascending order so that
    /// columns ahead of the edit keep their positions; a column that did not
    /// exist before takes the next free order.
    fn apply(&self, base: &TableRef, cells: ColumnCells) -> TableRef {
        let base = match self.anchor {
            Some(anchor) if !base.has_column(anchor) => base.ensure_column(anchor, true),
            _ => base.clone(),
        };
        let mut orders: Vec<i64> = base
            .all_headers()
            .iter()
            .filter_map(|h| base.column_meta(h).map(|m| m.order))
            .collect();
        let layout = self.layout(&base);
        let mut next = base.next_order();
        while orders.len() < layout.len() {
            orders.push(next);
            next += 1;
        }
        let metas = layout
            .into_iter()
            .zip(orders)
            .map(|((header, prenatal), order)| (header, ColumnMeta { order, prenatal }))
            .collect();
        base.with_columns(metas).with_column_cells(self.name, cells)
    }
}

/// Headers whose cells an edit touches, source side and destination side.
fn touched(
    mode: Mode,
    position: Position,
    same_table: bool,
    left: &Header,
    anchor: Option<&Header>,
    name: &Header,
) -> (Vec<Header>, Vec<Header>) {
    let mut source = Vec::new();
    let mut destination = Vec::new();
    match (mode, anchor) {
        (Mode::Move, _) => source.push(left.clone()),
        (Mode::Copy, Some(anchor)) if position == Position::To && same_table => {
            if left == name || left == anchor {
                source.push(left.clone());
            }
        }
        _ => {}
    }
    if let (Position::To, Some(anchor)) = (position, anchor) {
        destination.push(anchor.clone());
    }
    destination.push(name.clone());

    if same_table {
        let mut seen = HashSet::new();
        let merged = source.into_iter().chain(destination).filter(|h| seen.insert(h.clone())).collect();
        (Vec::new(), merged)
    } else {
        destination.dedup();
        (source, destination)
    }
}

pub(super) fn relocate(action: &ColumnAction, mode: Mode, name: Option<Header>) -> TableResult<()> {
    let source = action.left.table();
    let left = action.left.header();
    require_header(left)?;
    let (destination, anchor) = match &action.right {
        ColumnTarget::Column(c) => (c.table(), Some(c.header())),
        ColumnTarget::Table(t) => (t, None),
    };
    if let Some(anchor) = anchor {
        require_header(anchor)?;
    }
    let position = if anchor.is_some() { action.position } else { Position::After };
    let name = name.unwrap_or_else(|| match (position, anchor) {
        (Position::To, Some(anchor)) => anchor.clone(),
        _ => left.clone(),
    });
    require_header(&name)?;
    require_open(destination)?;
    if mode == Mode::Move {
        require_open(source)?;
    }

    let same_table = source.same_as(destination);
    let (source_headers, destination_headers) = touched(mode, position, same_table, left, anchor, &name);

    if same_table {
        let placement = Placement {
            anchor,
            position,
            name: &name,
            vacate: (mode == Mode::Move).then_some(left),
        };
        let mut write = destination.write()?;
        let (old, new) = write.apply(|base| Ok(placement.apply(base, base.column_cells(left))))?;
        debug!(table = %destination, column = %left, to = %name, ?position, ?mode, version = new.version(), "column relocated");
        write.emit(column_events(destination, &old, &new, &destination_headers));
        return Ok(());
    }

    let placement = Placement { anchor, position, name: &name, vacate: None };
    match mode {
        Mode::Copy => {
            let cells = source.current().column_cells(left);
            let mut write = destination.write()?;
            let (old, new) = write.apply(|base| Ok(placement.apply(base, cells)))?;
            write.emit(column_events(destination, &old, &new, &destination_headers));
        }
        Mode::Move => {
            // Both tables change under one pair of locks, or neither does.
            let mut pair = Table::write_pair(source, destination)?;
            let source_base = pair.first.base();
            let dest_next = placement.apply(&pair.second.base(), source_base.column_cells(left));
            let (src_old, src_new) = pair.first.publish(source_base.without_column(left));
            let (dest_old, dest_new) = pair.second.publish(dest_next);
            pair.first.emit(column_events(source, &src_old, &src_new, &source_headers));
            pair.second.emit(column_events(destination, &dest_old, &dest_new, &destination_headers));
        }
    }
    debug!(
        from = %source,
        to = %destination,
        column = %left,
        name = %name,
        ?position,
        ?mode,
        "column relocated across tables"
    );
    Ok(())
}
