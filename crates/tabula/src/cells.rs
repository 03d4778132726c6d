use std::collections::HashSet;

use tabula_store::TableRef;
use tabula_types::{Header, Index};

use crate::cell::Cell;
use crate::column::Column;
use crate::error::{TableError, TableResult};
use crate::iter::CellIter;
use crate::listener::{ListenerBuilder, ListenerScope};
use crate::range::{check_same_table, headers_between, CellRange, ColumnRange, RowRange};
use crate::row::Row;
use crate::table::Table;

/// One member of a [`Cells`] union.
#[derive(Clone, Debug)]
pub enum CellSource {
    Cell(Cell),
    Column(Column),
    Row(Row),
    CellRange(CellRange),
    ColumnRange(ColumnRange),
    RowRange(RowRange),
    Table(Table),
}

impl CellSource {
    pub fn table(&self) -> &Table {
        match self {
            Self::Cell(c) => c.table(),
            Self::Column(c) => c.table(),
            Self::Row(r) => r.table(),
            Self::CellRange(r) => r.table(),
            Self::ColumnRange(r) => r.table(),
            Self::RowRange(r) => r.table(),
            Self::Table(t) => t,
        }
    }

    /// Populated coordinates of this source in `snapshot`.
    fn coordinates(&self, snapshot: &TableRef) -> Vec<(Header, Index)> {
        match self {
            Self::Cell(c) => {
                let value = snapshot.cell(c.header(), c.index());
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![(c.header().clone(), c.index())]
                }
            }
            Self::Column(c) => column_coordinates(snapshot, c.header()),
            Self::Row(r) => snapshot
                .headers()
                .into_iter()
                .filter_map(|h| snapshot.resolve(&h, r.index(), r.relation()).map(|(i, _)| (h, i)))
                .collect(),
            Self::CellRange(r) => r.coordinates(snapshot),
            Self::ColumnRange(r) => headers_between(snapshot, r.start().header(), r.end().header())
                .iter()
                .flat_map(|h| column_coordinates(snapshot, h))
                .collect(),
            Self::RowRange(r) => snapshot
                .headers()
                .into_iter()
                .flat_map(|h| {
                    let indexes: Vec<Index> = snapshot
                        .column_indexes(&h)
                        .into_iter()
                        .filter(|i| r.contains(*i))
                        .collect();
                    indexes.into_iter().map(move |i| (h.clone(), i))
                })
                .collect(),
            Self::Table(_) => snapshot
                .headers()
                .iter()
                .flat_map(|h| column_coordinates(snapshot, h))
                .collect(),
        }
    }

    fn scope(&self) -> ListenerScope {
        match self {
            Self::Cell(c) => ListenerScope::Cell(c.header().clone(), c.index()),
            Self::Column(c) => ListenerScope::Column(c.header().clone()),
            Self::Row(r) => ListenerScope::Row(r.index(), r.relation()),
            Self::CellRange(r) => r.scope(),
            Self::ColumnRange(r) => r.scope(),
            Self::RowRange(r) => r.scope(),
            Self::Table(_) => ListenerScope::Table,
        }
    }
}

fn column_coordinates(snapshot: &TableRef, header: &Header) -> Vec<(Header, Index)> {
    snapshot
        .column_indexes(header)
        .into_iter()
        .map(|i| (header.clone(), i))
        .collect()
}

macro_rules! cell_source_from {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for CellSource {
                fn from(v: $ty) -> Self {
                    CellSource::$ty(v)
                }
            }

            impl From<&$ty> for CellSource {
                fn from(v: &$ty) -> Self {
                    CellSource::$ty(v.clone())
                }
            }
        )*
    };
}

cell_source_from!(Cell, Column, Row, CellRange, ColumnRange, RowRange, Table);

/// An ad hoc union of cells, columns, rows, ranges and whole tables, all
/// from one table.
///
/// Iterating yields the populated cells of each source in turn, read from
/// the snapshot current when the iterator is created. A coordinate covered
/// by several sources is yielded once.
#[derive(Clone, Debug)]
pub struct Cells {
    sources: Vec<CellSource>,
}

impl Cells {
    /// Needs at least one source; all sources must share a table.
    pub fn new<I, S>(sources: I) -> TableResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<CellSource>,
    {
        let sources: Vec<CellSource> = sources.into_iter().map(Into::into).collect();
        let Some(first) = sources.first() else {
            return Err(TableError::InvalidValue("cells need at least one source".to_string()));
        };
        for source in &sources[1..] {
            check_same_table(first.table(), source.table())?;
        }
        Ok(Self { sources })
    }

    pub fn of(source: impl Into<CellSource>) -> Self {
        Self { sources: vec![source.into()] }
    }

    /// This union extended with `source`.
    pub fn or(mut self, source: impl Into<CellSource>) -> TableResult<Self> {
        let source = source.into();
        check_same_table(self.table(), source.table())?;
        self.sources.push(source);
        Ok(self)
    }

    pub fn sources(&self) -> &[CellSource] {
        &self.sources
    }

    pub fn table(&self) -> &Table {
        // `new` and `of` never build an empty union.
        self.sources[0].table()
    }

    pub fn iter(&self) -> CellIter {
        let snapshot = self.table().current();
        let mut seen = HashSet::new();
        let coordinates = self
            .sources
            .iter()
            .flat_map(|s| s.coordinates(&snapshot))
            .filter(|c| seen.insert(c.clone()))
            .collect();
        CellIter::new(self.table().clone(), snapshot, coordinates)
    }

    /// Whether `cell`'s coordinate is covered by any source.
    pub fn contains(&self, cell: &Cell) -> bool {
        cell.table().same_as(self.table())
            && self
                .scope()
                .covers(&self.table().current(), cell.header(), cell.index())
    }

    pub(crate) fn scope(&self) -> ListenerScope {
        ListenerScope::Any(self.sources.iter().map(CellSource::scope).collect())
    }

    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.table().clone(), self.scope())
    }
}

impl<'a> IntoIterator for &'a Cells {
    type Item = Cell;
    type IntoIter = CellIter;

    fn into_iter(self) -> CellIter {
        self.iter()
    }
}
