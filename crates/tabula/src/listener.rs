use std::fmt;
use std::sync::Arc;

use tabula_events::{ListenerConfig, ListenerError, ListenerEvent, ListenerId, ListenerInfo};
use tabula_store::TableRef;
use tabula_types::{Header, Index, IndexRelation, Value};
use tracing::debug;

use crate::cell::Cell;
use crate::error::{TableError, TableResult};
use crate::range::{header_between, index_between};
use crate::table::Table;

/// One coordinate before and after a change.
///
/// Both cells share the coordinate. `old` is read from the snapshot before
/// the change and `new` from the snapshot after it; either side may be
/// empty.
#[derive(Clone)]
pub struct TableListenerEvent {
    old: Cell,
    new: Cell,
}

impl TableListenerEvent {
    pub(crate) fn new(old: Cell, new: Cell) -> Self {
        Self { old, new }
    }

    pub fn old(&self) -> &Cell {
        &self.old
    }

    pub fn new_cell(&self) -> &Cell {
        &self.new
    }

    pub fn old_value(&self) -> &Value {
        self.old.value()
    }

    pub fn new_value(&self) -> &Value {
        self.new.value()
    }

    pub fn header(&self) -> &Header {
        self.new.header()
    }

    pub fn index(&self) -> Index {
        self.new.index()
    }

    pub fn table(&self) -> &Table {
        self.new.table()
    }

    /// Whether the value at the coordinate actually changed.
    pub fn is_change(&self) -> bool {
        self.old.value() != self.new.value()
    }
}

impl ListenerEvent for TableListenerEvent {
    fn version(&self) -> u64 {
        self.new.version()
    }
}

impl fmt::Display for TableListenerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} -> {}",
            self.header(),
            self.index(),
            show(self.old_value()),
            show(self.new_value())
        )
    }
}

fn show(value: &Value) -> String {
    if value.is_empty() {
        "(empty)".to_string()
    } else {
        value.to_string()
    }
}

impl fmt::Debug for TableListenerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableListenerEvent")
            .field("header", self.header())
            .field("index", &self.index())
            .field("old", self.old_value())
            .field("new", self.new_value())
            .field("version", &self.version())
            .finish()
    }
}

/// The part of a table a listener watches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerScope {
    Table,
    Column(Header),
    Row(Index, IndexRelation),
    Cell(Header, Index),
    CellRange { start: (Header, Index), end: (Header, Index) },
    ColumnRange(Header, Header),
    RowRange(Index, Index),
    Any(Vec<ListenerScope>),
}

impl ListenerScope {
    /// Whether `(header, index)` lies in scope, judged against `snapshot`.
    pub(crate) fn covers(&self, snapshot: &TableRef, header: &Header, index: Index) -> bool {
        match self {
            Self::Table => true,
            Self::Column(h) => h == header,
            Self::Row(i, IndexRelation::At) => *i == index,
            Self::Row(i, relation) => snapshot
                .resolve(header, *i, *relation)
                .is_some_and(|(found, _)| found == index),
            Self::Cell(h, i) => h == header && *i == index,
            Self::CellRange { start, end } => {
                index_between(start.1, end.1, index) && header_between(snapshot, &start.0, &end.0, header)
            }
            Self::ColumnRange(start, end) => header_between(snapshot, start, end, header),
            Self::RowRange(start, end) => index_between(*start, *end, index),
            Self::Any(scopes) => scopes.iter().any(|s| s.covers(snapshot, header, index)),
        }
    }

    fn matches(&self, event: &TableListenerEvent) -> bool {
        let (header, index) = (event.header(), event.index());
        self.covers(event.old.raw_snapshot(), header, index) || self.covers(event.new.raw_snapshot(), header, index)
    }
}

/// Configures and registers a listener.
///
/// Obtained from `on()` on a table, column, row, cell, range or
/// [`Cells`](crate::Cells).
#[must_use = "a listener is only registered by `events`"]
pub struct ListenerBuilder {
    table: Table,
    scope: ListenerScope,
    config: ListenerConfig,
}

impl ListenerBuilder {
    pub(crate) fn new(table: Table, scope: ListenerScope) -> Self {
        Self { table, scope, config: ListenerConfig::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Listeners with a lower order run first.
    pub fn order(mut self, order: i64) -> Self {
        self.config.order = order;
        self
    }

    /// Also deliver batches caused by this listener's own writes.
    pub fn allow_loop(mut self) -> Self {
        self.config.allow_loop = true;
        self
    }

    /// Start with live events only, without the existing cells.
    pub fn skip_history(mut self) -> Self {
        self.config.skip_history = true;
        self
    }

    pub fn config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register `callback`.
    ///
    /// Unless history is skipped, the callback first receives one
    /// `(empty, current)` event per populated cell in scope, before this
    /// call returns.
    pub fn events<C>(self, callback: C) -> TableResult<ListenerReference>
    where
        C: Fn(&[TableListenerEvent]) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let Self { table, scope, config } = self;
        if table.is_closed() {
            return Err(TableError::InvalidTable(format!("{table} is deleted")));
        }
        let name = config.name.clone();
        let filter_scope = scope.clone();
        let filter = move |event: &TableListenerEvent| filter_scope.matches(event);
        let replay = || history(&table, &scope);
        let id = table.inner.events.subscribe(config, filter, callback, replay);
        debug!(table = %table, listener = %id, "listener attached");
        Ok(ListenerReference { table, id, name })
    }
}

/// `(empty, current)` pairs for every populated cell in scope.
fn history(table: &Table, scope: &ListenerScope) -> (u64, Vec<TableListenerEvent>) {
    let snapshot = table.current();
    let empty = Arc::new(TableRef::new());
    let events = snapshot
        .headers()
        .into_iter()
        .flat_map(|h| {
            let indexes = snapshot.column_indexes(&h);
            indexes.into_iter().map(move |i| (h.clone(), i))
        })
        .filter(|(h, i)| scope.covers(&snapshot, h, *i))
        .map(|(h, i)| {
            TableListenerEvent::new(
                Cell::read(table.clone(), empty.clone(), h.clone(), i),
                Cell::read(table.clone(), snapshot.clone(), h, i),
            )
        })
        .collect();
    (snapshot.version(), events)
}

/// Handle to a registered listener.
#[derive(Clone)]
pub struct ListenerReference {
    table: Table,
    id: ListenerId,
    name: Option<String>,
}

impl ListenerReference {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn is_active(&self) -> bool {
        self.table.inner.events.contains(self.id)
    }

    /// Stop the listener. Returns `false` if it was already stopped.
    pub fn off(&self) -> bool {
        self.table.inner.events.unsubscribe(self.id)
    }
}

impl fmt::Debug for ListenerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerReference")
            .field("table", &self.table.to_string())
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Table {
    /// Listen to every cell of the table.
    pub fn on(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.clone(), ListenerScope::Table)
    }

    /// Stop a listener registered on this table.
    ///
    /// Stopping a listener of a deleted table is a no-op.
    pub fn off(&self, reference: &ListenerReference) -> TableResult<()> {
        if !reference.table.same_as(self) {
            return Err(TableError::InvalidListener(format!(
                "{} belongs to {}, not {self}",
                reference.id, reference.table
            )));
        }
        if self.is_closed() {
            return Ok(());
        }
        self.inner.events.remove(reference.id)?;
        Ok(())
    }

    /// Registered listeners in delivery order.
    pub fn listeners(&self) -> Vec<ListenerInfo> {
        self.inner.events.listeners()
    }
}
