use im::OrdMap;
use serde::{Deserialize, Serialize};
use tabula_types::{Header, Index, IndexRelation, Value};

/// Sparse cell storage for one column.
pub type ColumnCells = OrdMap<Index, Value>;

/// Per-column bookkeeping kept alongside the cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Position among the table's columns. Lower sorts first; values need not
    /// be contiguous.
    pub order: i64,
    /// A prenatal column exists only to anchor a structural edit. It is not
    /// listed among the table's headers until something is written to it.
    pub prenatal: bool,
}

/// One immutable version of a table.
///
/// Every edit returns a new snapshot. Both maps are persistent, so an edit
/// to one column shares every other column with the previous version.
#[derive(Clone, Debug, Default)]
pub struct TableRef {
    columns: OrdMap<Header, ColumnMeta>,
    column_cells: OrdMap<Header, ColumnCells>,
    version: u64,
    next_order: i64,
}

impl TableRef {
    /// An empty snapshot at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The order the next new column receives.
    pub fn next_order(&self) -> i64 {
        self.next_order
    }

    /// This snapshot with its version replaced.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn column_meta(&self, header: &Header) -> Option<ColumnMeta> {
        self.columns.get(header).copied()
    }

    /// Whether the column exists, prenatal or not.
    pub fn has_column(&self, header: &Header) -> bool {
        self.columns.contains_key(header)
    }

    /// Whether the column exists and is listed among the headers.
    pub fn is_visible(&self, header: &Header) -> bool {
        self.column_meta(header).is_some_and(|m| !m.prenatal)
    }

    /// Value at exactly `(header, index)`, or [`Value::Empty`].
    pub fn cell(&self, header: &Header, index: Index) -> Value {
        self.column_cells
            .get(header)
            .and_then(|cells| cells.get(&index))
            .cloned()
            .unwrap_or_default()
    }

    /// Resolve `index` against the populated indexes of a column.
    ///
    /// Returns the index that satisfied the relation and its value.
    pub fn resolve(&self, header: &Header, index: Index, relation: IndexRelation) -> Option<(Index, Value)> {
        let cells = self.column_cells.get(header)?;
        let found = match relation {
            IndexRelation::At => cells.get(&index).map(|v| (&index, v)),
            IndexRelation::AtOrBefore => cells.get_prev(&index),
            IndexRelation::AtOrAfter => cells.get_next(&index),
            IndexRelation::Before => cells.get_prev(&index.checked_sub(1)?),
            IndexRelation::After => cells.get_next(&index.checked_add(1)?),
        };
        found.map(|(i, v)| (*i, v.clone()))
    }

    /// Visible headers in column order.
    pub fn headers(&self) -> Vec<Header> {
        self.sorted_columns(false)
    }

    /// Every header, prenatal ones included, in column order.
    pub fn all_headers(&self) -> Vec<Header> {
        self.sorted_columns(true)
    }

    fn sorted_columns(&self, include_prenatal: bool) -> Vec<Header> {
        let mut cols: Vec<(i64, &Header)> = self
            .columns
            .iter()
            .filter(|(_, m)| include_prenatal || !m.prenatal)
            .map(|(h, m)| (m.order, h))
            .collect();
        cols.sort();
        cols.into_iter().map(|(_, h)| h.clone()).collect()
    }

    /// Sorted union of the populated indexes of every column.
    pub fn indexes(&self) -> Vec<Index> {
        let mut all: std::collections::BTreeSet<Index> = std::collections::BTreeSet::new();
        for cells in self.column_cells.values() {
            all.extend(cells.keys().copied());
        }
        all.into_iter().collect()
    }

    /// Populated indexes of one column, ascending.
    pub fn column_indexes(&self, header: &Header) -> Vec<Index> {
        self.column_cells
            .get(header)
            .map(|cells| cells.keys().copied().collect())
            .unwrap_or_default()
    }

    /// The cells of one column. Cheap: the map is shared, not copied.
    pub fn column_cells(&self, header: &Header) -> ColumnCells {
        self.column_cells.get(header).cloned().unwrap_or_default()
    }

    /// Number of columns, prenatal ones included.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Whether no column holds any cell.
    pub fn is_blank(&self) -> bool {
        self.column_cells.values().all(|c| c.is_empty())
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Write a value. Writing [`Value::Empty`] removes the cell; either way
    /// the column exists and is visible afterwards.
    pub fn with_cell(&self, header: &Header, index: Index, value: Value) -> Self {
        let mut next = self.with_materialized(header);
        let mut cells = next.column_cells(header);
        if value.is_empty() {
            cells.remove(&index);
        } else {
            cells.insert(index, value);
        }
        next.column_cells.insert(header.clone(), cells);
        next
    }

    /// Remove a single cell.
    pub fn without_cell(&self, header: &Header, index: Index) -> Self {
        self.with_cell(header, index, Value::Empty)
    }

    /// Make sure a column exists. A new column gets the next order and the
    /// given prenatal flag; an existing column is left untouched.
    pub fn ensure_column(&self, header: &Header, prenatal: bool) -> Self {
        if self.has_column(header) {
            return self.clone();
        }
        let mut next = self.clone();
        next.columns.insert(header.clone(), ColumnMeta { order: next.next_order, prenatal });
        next.column_cells.insert(header.clone(), ColumnCells::new());
        next.next_order += 1;
        next
    }

    /// Make sure a column exists and is visible.
    pub fn with_materialized(&self, header: &Header) -> Self {
        let mut next = self.ensure_column(header, false);
        if let Some(meta) = next.columns.get_mut(header) {
            meta.prenatal = false;
        }
        next
    }

    /// Insert or replace a column's metadata and cells together.
    pub fn with_column(&self, header: &Header, meta: ColumnMeta, cells: ColumnCells) -> Self {
        let mut next = self.clone();
        next.next_order = next.next_order.max(meta.order + 1);
        next.columns.insert(header.clone(), meta);
        next.column_cells.insert(header.clone(), cells);
        next
    }

    /// Replace the cells of a column, creating it if needed. The column's
    /// prenatal flag is kept.
    pub fn with_column_cells(&self, header: &Header, cells: ColumnCells) -> Self {
        let mut next = self.ensure_column(header, false);
        next.column_cells.insert(header.clone(), cells);
        next
    }

    /// Drop a column and its cells.
    pub fn without_column(&self, header: &Header) -> Self {
        let mut next = self.clone();
        next.columns.remove(header);
        next.column_cells.remove(header);
        next
    }

    /// Rebuild the column set from `(header, meta)` pairs.
    ///
    /// Columns missing from `columns` are dropped along with their cells.
    pub fn with_columns(&self, columns: Vec<(Header, ColumnMeta)>) -> Self {
        let mut next = self.clone();
        let mut metas = OrdMap::new();
        let mut cells = OrdMap::new();
        for (header, meta) in columns {
            next.next_order = next.next_order.max(meta.order + 1);
            cells.insert(header.clone(), self.column_cells(&header));
            metas.insert(header, meta);
        }
        next.columns = metas;
        next.column_cells = cells;
        next
    }

    /// Drop every column and cell. Orders keep counting up.
    pub fn cleared(&self) -> Self {
        let mut next = self.clone();
        next.columns = OrdMap::new();
        next.column_cells = OrdMap::new();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn h(label: &str) -> Header {
        Header::from(label)
    }

    fn sample() -> TableRef {
        TableRef::new()
            .with_cell(&h("A"), 0, Value::from("A0"))
            .with_cell(&h("A"), 2, Value::from("A2"))
            .with_cell(&h("A"), -5, Value::from("A-5"))
            .with_cell(&h("B"), 1, Value::from("B1"))
    }

    // ---- Test 1: basic reads ----
    #[test]
    fn reads_cells_and_headers() {
        let t = sample();
        assert_eq!(t.cell(&h("A"), 0), Value::from("A0"));
        assert_eq!(t.cell(&h("A"), 1), Value::Empty);
        assert_eq!(t.cell(&h("Z"), 0), Value::Empty);
        assert_eq!(t.headers(), vec![h("A"), h("B")]);
        assert_eq!(t.indexes(), vec![-5, 0, 1, 2]);
        assert_eq!(t.column_indexes(&h("A")), vec![-5, 0, 2]);
    }

    // ---- Test 2: relations ----
    #[test]
    fn resolves_relations() {
        let t = sample();
        let a = h("A");
        assert_eq!(t.resolve(&a, 1, IndexRelation::At), None);
        assert_eq!(t.resolve(&a, 1, IndexRelation::AtOrBefore), Some((0, Value::from("A0"))));
        assert_eq!(t.resolve(&a, 1, IndexRelation::AtOrAfter), Some((2, Value::from("A2"))));
        assert_eq!(t.resolve(&a, 0, IndexRelation::Before), Some((-5, Value::from("A-5"))));
        assert_eq!(t.resolve(&a, 0, IndexRelation::After), Some((2, Value::from("A2"))));
        assert_eq!(t.resolve(&a, 2, IndexRelation::After), None);
        assert_eq!(t.resolve(&a, i64::MIN, IndexRelation::Before), None);
    }

    // ---- Test 3: edits leave the previous snapshot intact ----
    #[test]
    fn edits_do_not_touch_previous() {
        let before = sample();
        let after = before.with_cell(&h("A"), 0, Value::from("changed")).without_column(&h("B"));
        assert_eq!(before.cell(&h("A"), 0), Value::from("A0"));
        assert_eq!(before.cell(&h("B"), 1), Value::from("B1"));
        assert_eq!(after.cell(&h("A"), 0), Value::from("changed"));
        assert_eq!(after.cell(&h("B"), 1), Value::Empty);
        assert_eq!(after.headers(), vec![h("A")]);
    }

    // ---- Test 4: prenatal columns stay hidden ----
    #[test]
    fn prenatal_columns_are_hidden() {
        let t = sample().ensure_column(&h("P"), true);
        assert!(t.has_column(&h("P")));
        assert!(!t.is_visible(&h("P")));
        assert_eq!(t.headers(), vec![h("A"), h("B")]);
        assert_eq!(t.all_headers(), vec![h("A"), h("B"), h("P")]);

        let t = t.with_cell(&h("P"), 0, Value::from(1i64));
        assert_eq!(t.headers(), vec![h("A"), h("B"), h("P")]);
    }

    // ---- Test 5: writing empty still creates the column ----
    #[test]
    fn empty_write_materializes() {
        let t = TableRef::new().with_cell(&h("A"), 0, Value::Empty);
        assert_eq!(t.headers(), vec![h("A")]);
        assert!(t.indexes().is_empty());
    }

    // ---- Test 6: reordering columns ----
    #[test]
    fn with_columns_reorders_and_drops() {
        let t = sample().with_cell(&h("C"), 0, Value::from("C0"));
        let metas = vec![
            (h("C"), ColumnMeta { order: 0, prenatal: false }),
            (h("A"), ColumnMeta { order: 1, prenatal: false }),
        ];
        let r = t.with_columns(metas);
        assert_eq!(r.headers(), vec![h("C"), h("A")]);
        assert_eq!(r.cell(&h("B"), 1), Value::Empty);
        assert_eq!(r.cell(&h("A"), 2), Value::from("A2"));
        assert!(r.next_order() >= t.next_order());
    }

    proptest! {
        #[test]
        fn older_snapshots_never_change(
            writes in proptest::collection::vec((0usize..3, -5i64..5, 0i64..100), 1..30)
        ) {
            let labels = ["A", "B", "C"];
            let mut snapshots = vec![TableRef::new()];
            for (col, index, value) in &writes {
                let last = snapshots.last().cloned().unwrap_or_default();
                snapshots.push(last.with_cell(&h(labels[*col]), *index, Value::from(*value)));
            }
            // Replaying the writes up to each point must reproduce every snapshot.
            let mut replay = TableRef::new();
            for (step, (col, index, value)) in writes.iter().enumerate() {
                for label in labels {
                    for i in -5..5 {
                        prop_assert_eq!(replay.cell(&h(label), i), snapshots[step].cell(&h(label), i));
                    }
                }
                replay = replay.with_cell(&h(labels[*col]), *index, Value::from(*value));
            }
        }
    }
}
