use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tabula_events::EventProcessor;
use tabula_store::{Registry, SnapshotCell, TableRef, Transition, WriteGuard};
use tabula_types::{Header, Index, IndexRelation, Value};
use tracing::{debug, info};

use crate::cell::Cell;
use crate::column::Column;
use crate::error::{TableError, TableResult};
use crate::iter::CellIter;
use crate::listener::TableListenerEvent;
use crate::row::Row;

static REGISTRY: Registry<Table> = Registry::new();
static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct TableInner {
    id: u64,
    name: Option<String>,
    storage: SnapshotCell,
    pub(crate) events: EventProcessor<TableListenerEvent>,
    /// Events raised inside an open batch, waiting for the commit.
    staged_events: Mutex<Vec<TableListenerEvent>>,
}

/// A live handle to a table.
///
/// Cloning the handle does not copy the table. Reads go to the current
/// snapshot; [`Table::snapshot`] pins one version.
#[derive(Clone)]
pub struct Table {
    pub(crate) inner: Arc<TableInner>,
}

impl Table {
    fn build(name: Option<String>, initial: TableRef) -> Self {
        Self {
            inner: Arc::new(TableInner {
                id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
                name,
                storage: SnapshotCell::new(initial),
                events: EventProcessor::new(),
                staged_events: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The registered table called `name`, created on first use.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let (table, created) = REGISTRY.get_or_create(&name, || Self::build(Some(name.clone()), TableRef::new()));
        if created {
            info!(table = %name, "table created");
        }
        table
    }

    /// A table that is not registered under any name.
    pub fn anonymous() -> Self {
        Self::build(None, TableRef::new())
    }

    /// A new table starting from an existing snapshot.
    pub(crate) fn from_snapshot(name: Option<String>, snapshot: &TableRef) -> Self {
        Self::build(name, snapshot.clone())
    }

    /// Register `table` under its name, closing any table it replaces.
    pub(crate) fn register(table: &Table) {
        if let Some(name) = table.name() {
            if let Some(previous) = REGISTRY.insert(name, table.clone()) {
                if !previous.same_as(table) {
                    previous.close();
                }
            }
            info!(table = %name, "table registered");
        }
    }

    /// The registered table called `name`, if any.
    pub fn lookup(name: &str) -> Option<Self> {
        REGISTRY.get(name)
    }

    /// Names of all registered tables, sorted.
    pub fn names() -> Vec<String> {
        REGISTRY.names()
    }

    /// All registered tables, in name order.
    pub fn tables() -> Vec<Table> {
        REGISTRY.values()
    }

    /// Unregister and close the table called `name`.
    ///
    /// Existing handles keep reading their last state but refuse writes, and
    /// the table's listeners are dropped. Returns `false` if no table had that
    /// name.
    pub fn delete(name: &str) -> bool {
        match REGISTRY.remove(name) {
            Some(table) => {
                table.close();
                info!(table = %name, "table deleted");
                true
            }
            None => false,
        }
    }

    fn close(&self) {
        self.inner.storage.close();
        self.inner.events.clear();
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Process-unique id of this table.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.storage.is_closed()
    }

    /// Whether both handles refer to the same table.
    pub fn same_as(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn version(&self) -> u64 {
        self.current().version()
    }

    /// Pin the current version.
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot { table: self.clone(), snapshot: self.current() }
    }

    pub(crate) fn current(&self) -> Arc<TableRef> {
        self.inner.storage.current()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The cell at exactly `(header, index)`.
    pub fn cell(&self, header: impl Into<Header>, index: Index) -> Cell {
        self.cell_at(header, IndexRelation::At, index)
    }

    /// The cell found by resolving `index` with `relation` in the column.
    ///
    /// When nothing satisfies the relation the result is an empty cell at
    /// `index`.
    pub fn cell_at(&self, header: impl Into<Header>, relation: IndexRelation, index: Index) -> Cell {
        Cell::resolve(self.clone(), self.current(), header.into(), index, relation)
    }

    /// Shorthand for the value at `(header, index)`.
    pub fn get(&self, header: impl Into<Header>, index: Index) -> Value {
        self.current().cell(&header.into(), index)
    }

    pub fn column(&self, header: impl Into<Header>) -> Column {
        Column::new(self.clone(), header.into())
    }

    pub fn row(&self, index: Index) -> Row {
        Row::new(self.clone(), index, IndexRelation::At)
    }

    pub fn row_at(&self, relation: IndexRelation, index: Index) -> Row {
        Row::new(self.clone(), index, relation)
    }

    /// Visible headers in column order.
    pub fn headers(&self) -> Vec<Header> {
        self.current().headers()
    }

    /// Every populated index, ascending.
    pub fn indexes(&self) -> Vec<Index> {
        self.current().indexes()
    }

    pub fn columns(&self) -> Vec<Column> {
        self.headers().into_iter().map(|h| self.column(h)).collect()
    }

    /// Whether a visible column has this header.
    pub fn contains(&self, header: impl Into<Header>) -> bool {
        self.current().is_visible(&header.into())
    }

    /// Every populated cell, column by column.
    pub fn iter(&self) -> CellIter {
        CellIter::populated(self.clone(), self.current())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write `value` at `(header, index)`. Writing [`Value::Empty`] clears
    /// the cell.
    pub fn set(&self, header: impl Into<Header>, index: Index, value: impl Into<Value>) -> TableResult<()> {
        let header = header.into();
        require_header(&header)?;
        let value = value.into();
        let mut write = self.write()?;
        let (old, new) = write.apply(|t| Ok(t.with_cell(&header, index, value)))?;
        debug!(table = %self, header = %header, index, version = new.version(), "cell written");
        write.emit(vec![self.event(&old, &new, &header, index)]);
        Ok(())
    }

    /// Remove the value at `(header, index)`.
    pub fn clear_cell(&self, header: impl Into<Header>, index: Index) -> TableResult<()> {
        self.set(header, index, Value::Empty)
    }

    /// Run `f` as one atomic change.
    ///
    /// Writes made by `f` through this table are visible to `f` but to no
    /// other thread until it returns `Ok`, at which point they are published
    /// together and listeners receive one event per touched cell. If `f`
    /// fails, nothing is published and no events are delivered. A batch
    /// opened inside another batch on the same table joins it.
    pub fn batch<T, F>(&self, f: F) -> TableResult<T>
    where
        F: FnOnce(&Table) -> TableResult<T>,
    {
        let outermost = self.inner.storage.begin_batch()?;
        let mut guard = BatchGuard { table: self, outermost, open: true };
        let result = f(self);
        match &result {
            Ok(_) => guard.commit()?,
            Err(_) => guard.discard()?,
        }
        result
    }

    // ------------------------------------------------------------------
    // Internals shared with the operations
    // ------------------------------------------------------------------

    /// Take the write lock. Events emitted through the handle are queued in
    /// version order and delivered once it is dropped.
    pub(crate) fn write(&self) -> TableResult<TableWrite<'_>> {
        let guard = self.inner.storage.write()?;
        Ok(TableWrite { table: self, guard, _flush: Some(Flush(self)) })
    }

    /// Write locks on two distinct tables, held together until the pair is
    /// dropped. Locks are taken in table id order.
    pub(crate) fn write_pair<'a>(first: &'a Table, second: &'a Table) -> TableResult<TablePair<'a>> {
        debug_assert!(!first.same_as(second), "write_pair needs two distinct tables");
        let (a, b) = if first.id() < second.id() {
            SnapshotCell::write_pair(&first.inner.storage, &second.inner.storage)?
        } else {
            let (b, a) = SnapshotCell::write_pair(&second.inner.storage, &first.inner.storage)?;
            (a, b)
        };
        Ok(TablePair {
            first: TableWrite { table: first, guard: a, _flush: None },
            second: TableWrite { table: second, guard: b, _flush: None },
            _flush: [Flush(first), Flush(second)],
        })
    }

    /// The `(old, new)` pair for one coordinate across a transition.
    pub(crate) fn event(&self, old: &Arc<TableRef>, new: &Arc<TableRef>, header: &Header, index: Index) -> TableListenerEvent {
        TableListenerEvent::new(
            Cell::read(self.clone(), old.clone(), header.clone(), index),
            Cell::read(self.clone(), new.clone(), header.clone(), index),
        )
    }

    /// Collapse the events of a batch to one per coordinate, in the order of
    /// each coordinate's last change, spanning the whole batch.
    fn rebase(&self, events: Vec<TableListenerEvent>, base: &Arc<TableRef>, head: &Arc<TableRef>) -> Vec<TableListenerEvent> {
        let mut seen = HashSet::new();
        let mut coordinates = Vec::new();
        for event in events.iter().rev() {
            let key = (event.header().clone(), event.index());
            if seen.insert(key.clone()) {
                coordinates.push(key);
            }
        }
        coordinates.reverse();
        coordinates
            .into_iter()
            .map(|(h, i)| self.event(base, head, &h, i))
            .collect()
    }

    fn take_staged_events(&self) -> Vec<TableListenerEvent> {
        std::mem::take(&mut *self.inner.staged_events.lock().expect("staged events lock poisoned"))
    }
}

/// Exclusive write access to one table.
pub(crate) struct TableWrite<'a> {
    table: &'a Table,
    guard: WriteGuard<'a>,
    // Declared after the guard: the lock is released before delivery.
    _flush: Option<Flush<'a>>,
}

impl TableWrite<'_> {
    /// The snapshot the next change builds on.
    pub(crate) fn base(&self) -> Arc<TableRef> {
        self.guard.base()
    }

    /// Publish `next` as the successor of [`TableWrite::base`].
    pub(crate) fn publish(&mut self, next: TableRef) -> Transition {
        self.guard.publish(next)
    }

    /// Compute and publish the next snapshot. Nothing is published if `f`
    /// fails.
    pub(crate) fn apply<F>(&mut self, f: F) -> TableResult<Transition>
    where
        F: FnOnce(&TableRef) -> TableResult<TableRef>,
    {
        let base = self.guard.base();
        let next = f(&base)?;
        Ok(self.guard.publish(next))
    }

    /// Queue events for delivery, or hold them until the open batch on this
    /// thread commits.
    pub(crate) fn emit(&self, events: Vec<TableListenerEvent>) {
        if events.is_empty() {
            return;
        }
        if self.guard.staged() {
            self.table
                .inner
                .staged_events
                .lock()
                .expect("staged events lock poisoned")
                .extend(events);
        } else {
            self.table.inner.events.post(events);
        }
    }
}

/// Write access to two tables at once. Both locks are released before any
/// queued event is delivered.
pub(crate) struct TablePair<'a> {
    pub(crate) first: TableWrite<'a>,
    pub(crate) second: TableWrite<'a>,
    _flush: [Flush<'a>; 2],
}

/// Delivers a table's queued events when dropped.
struct Flush<'a>(&'a Table);

impl Drop for Flush<'_> {
    fn drop(&mut self) {
        self.0.inner.events.flush();
    }
}

/// Closes a batch exactly once, discarding it if the closure unwinds.
struct BatchGuard<'a> {
    table: &'a Table,
    outermost: bool,
    open: bool,
}

impl BatchGuard<'_> {
    fn commit(&mut self) -> TableResult<()> {
        self.open = false;
        let storage = &self.table.inner.storage;
        if !self.outermost {
            storage.commit_batch()?;
            return Ok(());
        }
        let table = self.table;
        let staged = table.take_staged_events();
        storage.commit_batch_then(|transition: &Transition| {
            let (base, head) = transition;
            let events = table.rebase(staged, base, head);
            debug!(table = %table, events = events.len(), version = head.version(), "batch published");
            table.inner.events.post(events);
        })?;
        table.inner.events.flush();
        Ok(())
    }

    fn discard(&mut self) -> TableResult<()> {
        self.open = false;
        if self.outermost {
            self.table.take_staged_events();
        }
        self.table.inner.storage.discard_batch()?;
        Ok(())
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.discard();
        }
    }
}

pub(crate) fn require_header(header: &Header) -> TableResult<()> {
    if header.is_empty() {
        return Err(TableError::InvalidColumn("empty header".to_string()));
    }
    Ok(())
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "<anonymous #{}>", self.id()),
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("version", &self.version())
            .finish()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Table {}

impl<'a> IntoIterator for &'a Table {
    type Item = Cell;
    type IntoIter = CellIter;

    fn into_iter(self) -> CellIter {
        self.iter()
    }
}

/// A table pinned at one version.
#[derive(Clone)]
pub struct TableSnapshot {
    table: Table,
    snapshot: Arc<TableRef>,
}

impl TableSnapshot {
    pub(crate) fn new(table: Table, snapshot: Arc<TableRef>) -> Self {
        Self { table, snapshot }
    }

    /// The live table this snapshot was taken from.
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn cell(&self, header: impl Into<Header>, index: Index) -> Cell {
        self.cell_at(header, IndexRelation::At, index)
    }

    pub fn cell_at(&self, header: impl Into<Header>, relation: IndexRelation, index: Index) -> Cell {
        Cell::resolve(self.table.clone(), self.snapshot.clone(), header.into(), index, relation)
    }

    pub fn get(&self, header: impl Into<Header>, index: Index) -> Value {
        self.snapshot.cell(&header.into(), index)
    }

    pub fn headers(&self) -> Vec<Header> {
        self.snapshot.headers()
    }

    pub fn indexes(&self) -> Vec<Index> {
        self.snapshot.indexes()
    }

    pub fn column_indexes(&self, header: impl Into<Header>) -> Vec<Index> {
        self.snapshot.column_indexes(&header.into())
    }

    pub fn contains(&self, header: impl Into<Header>) -> bool {
        self.snapshot.is_visible(&header.into())
    }

    /// Position of a column, if it exists in this version.
    pub fn column_order(&self, header: &Header) -> Option<i64> {
        self.snapshot.column_meta(header).map(|m| m.order)
    }

    pub fn iter(&self) -> CellIter {
        CellIter::populated(self.table.clone(), self.snapshot.clone())
    }

    pub(crate) fn raw(&self) -> &Arc<TableRef> {
        &self.snapshot
    }
}

impl fmt::Debug for TableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSnapshot")
            .field("table", &self.table.to_string())
            .field("version", &self.version())
            .finish()
    }
}
