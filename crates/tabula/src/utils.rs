//! Free-standing query helpers over cells.

use std::collections::BTreeSet;

use tabula_types::{FromValue, Header, Index};

use crate::cell::Cell;

/// The cell's value when it has kind `T`.
pub fn value_of<T: FromValue>(cell: &Cell) -> Option<T> {
    T::from_value(cell.value())
}

/// Values of kind `T`, skipping cells of any other kind.
pub fn values_of<T, I>(cells: I) -> Vec<T>
where
    T: FromValue,
    I: IntoIterator<Item = Cell>,
{
    cells.into_iter().filter_map(|c| value_of(&c)).collect()
}

pub fn header_of(cell: &Cell) -> &Header {
    cell.header()
}

pub fn index_of(cell: &Cell) -> Index {
    cell.index()
}

/// Distinct headers of the cells, in column order.
pub fn headers_of<I>(cells: I) -> Vec<Header>
where
    I: IntoIterator<Item = Cell>,
{
    let mut seen = BTreeSet::new();
    for cell in cells {
        let order = cell.raw_snapshot().column_meta(cell.header()).map(|m| m.order);
        seen.insert((order, cell.header().clone()));
    }
    let mut headers: Vec<Header> = Vec::with_capacity(seen.len());
    for (_, header) in seen {
        if !headers.contains(&header) {
            headers.push(header);
        }
    }
    headers
}

/// Distinct indexes of the cells, ascending.
pub fn indexes_of<I>(cells: I) -> Vec<Index>
where
    I: IntoIterator<Item = Cell>,
{
    cells.into_iter().map(|c| c.index()).collect::<BTreeSet<_>>().into_iter().collect()
}
