use std::sync::Arc;

use tabula_store::TableRef;
use tabula_types::{Header, Index};

use crate::cell::Cell;
use crate::table::Table;

/// Forward-only iterator over cells bound to one snapshot.
///
/// The coordinates are fixed when the iterator is created; later writes to
/// the table do not change what it yields.
pub struct CellIter {
    table: Table,
    snapshot: Arc<TableRef>,
    coordinates: std::vec::IntoIter<(Header, Index)>,
}

impl CellIter {
    pub(crate) fn new(table: Table, snapshot: Arc<TableRef>, coordinates: Vec<(Header, Index)>) -> Self {
        Self { table, snapshot, coordinates: coordinates.into_iter() }
    }

    /// Every populated cell of `snapshot`, column by column.
    pub(crate) fn populated(table: Table, snapshot: Arc<TableRef>) -> Self {
        let coordinates = snapshot
            .headers()
            .into_iter()
            .flat_map(|h| {
                let indexes = snapshot.column_indexes(&h);
                indexes.into_iter().map(move |i| (h.clone(), i))
            })
            .collect();
        Self::new(table, snapshot, coordinates)
    }

    /// The snapshot the cells are read from.
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }
}

impl Iterator for CellIter {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        let (header, index) = self.coordinates.next()?;
        Some(Cell::read(self.table.clone(), self.snapshot.clone(), header, index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.coordinates.size_hint()
    }
}

impl ExactSizeIterator for CellIter {}
