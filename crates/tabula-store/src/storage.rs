use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::snapshot::TableRef;

/// Edits staged by one thread, published together on commit.
struct Staging {
    owner: ThreadId,
    depth: usize,
    base: Arc<TableRef>,
    head: Arc<TableRef>,
}

struct State {
    current: Arc<TableRef>,
    staging: Option<Staging>,
}

/// The atomically swappable "current snapshot" of one table.
///
/// Writers serialize on an internal lock for the resolve, compute, publish
/// step; readers only clone an `Arc`. A thread may open a batch, after which
/// its writes go to a private head that the same thread reads back and other
/// threads do not see until [`SnapshotCell::commit_batch`]. Writers on other
/// threads wait for the batch to finish.
pub struct SnapshotCell {
    state: Mutex<State>,
    idle: Condvar,
    closed: AtomicBool,
}

/// The snapshots on either side of a publish.
pub type Transition = (Arc<TableRef>, Arc<TableRef>);

impl SnapshotCell {
    pub fn new(initial: TableRef) -> Self {
        Self {
            state: Mutex::new(State { current: Arc::new(initial), staging: None }),
            idle: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("snapshot lock poisoned")
    }

    /// Lock, waiting out any batch another thread has open.
    fn lock_for_write(&self) -> MutexGuard<'_, State> {
        let me = thread::current().id();
        let mut guard = self.lock();
        while guard.staging.as_ref().is_some_and(|s| s.owner != me) {
            guard = self.idle.wait(guard).expect("snapshot lock poisoned");
        }
        guard
    }

    /// The snapshot visible to the calling thread.
    pub fn current(&self) -> Arc<TableRef> {
        let me = thread::current().id();
        let guard = self.lock();
        match &guard.staging {
            Some(staging) if staging.owner == me => staging.head.clone(),
            _ => guard.current.clone(),
        }
    }

    /// The last published snapshot, ignoring any open batch.
    pub fn published(&self) -> Arc<TableRef> {
        self.lock().current.clone()
    }

    /// Take the write lock, waiting out any batch another thread has open.
    ///
    /// The guard publishes snapshots and keeps other writers out until it is
    /// dropped, so work done while holding it is ordered with the publish.
    pub fn write(&self) -> StoreResult<WriteGuard<'_>> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let state = self.lock_for_write();
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(WriteGuard { state })
    }

    /// Like [`SnapshotCell::write`], but `None` instead of waiting when
    /// another thread has a batch open.
    fn try_write(&self) -> StoreResult<Option<WriteGuard<'_>>> {
        let me = thread::current().id();
        let state = self.lock();
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        if state.staging.as_ref().is_some_and(|s| s.owner != me) {
            return Ok(None);
        }
        Ok(Some(WriteGuard { state }))
    }

    fn wait_idle(&self) {
        drop(self.lock_for_write());
    }

    /// Write locks on two distinct cells, taken in argument order.
    ///
    /// Callers must pass any two cells in one global order. A batch that
    /// another thread holds on `second` is waited out without keeping
    /// `first` locked.
    pub fn write_pair<'a>(
        first: &'a SnapshotCell,
        second: &'a SnapshotCell,
    ) -> StoreResult<(WriteGuard<'a>, WriteGuard<'a>)> {
        loop {
            let a = first.write()?;
            if let Some(b) = second.try_write()? {
                return Ok((a, b));
            }
            drop(a);
            second.wait_idle();
        }
    }

    /// Compute and publish the next snapshot.
    ///
    /// `f` receives the snapshot visible to this thread and returns its
    /// successor; the successor's version is set to one past its base. If `f`
    /// fails nothing is published.
    pub fn update<E, F>(&self, f: F) -> Result<Transition, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Arc<TableRef>) -> Result<TableRef, E>,
    {
        let mut guard = self.write()?;
        let base = guard.base();
        let next = f(&base)?;
        Ok(guard.publish(next))
    }

    /// Open a batch on the calling thread, or join the one already open.
    ///
    /// Returns `true` when this call opened the outermost batch.
    pub fn begin_batch(&self) -> StoreResult<bool> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let me = thread::current().id();
        let mut guard = self.lock_for_write();
        let state = &mut *guard;
        match state.staging.as_mut() {
            Some(staging) => {
                staging.depth += 1;
                Ok(false)
            }
            None => {
                let current = state.current.clone();
                state.staging = Some(Staging { owner: me, depth: 1, base: current.clone(), head: current });
                Ok(true)
            }
        }
    }

    /// Leave the batch. When the outermost level commits, the staged head is
    /// published and the `(before, after)` pair is returned.
    pub fn commit_batch(&self) -> StoreResult<Option<Transition>> {
        self.commit_batch_then(|_| {})
    }

    /// [`SnapshotCell::commit_batch`], running `then` on the published pair
    /// before any other writer can publish.
    pub fn commit_batch_then<F>(&self, then: F) -> StoreResult<Option<Transition>>
    where
        F: FnOnce(&Transition),
    {
        let mut guard = self.lock_own_batch()?;
        let done = match guard.staging.as_mut() {
            Some(staging) => {
                staging.depth -= 1;
                staging.depth == 0
            }
            None => return Err(StoreError::NoActiveBatch),
        };
        if !done {
            return Ok(None);
        }
        let staging = guard.staging.take().ok_or(StoreError::NoActiveBatch)?;
        if staging.head.version() != staging.base.version() {
            guard.current = staging.head.clone();
        }
        let transition = (staging.base, staging.head);
        then(&transition);
        drop(guard);
        self.idle.notify_all();
        debug!(from = transition.0.version(), to = transition.1.version(), "batch committed");
        Ok(Some(transition))
    }

    /// Leave the batch. When the outermost level is discarded every staged
    /// edit is dropped.
    pub fn discard_batch(&self) -> StoreResult<()> {
        let mut guard = self.lock_own_batch()?;
        let done = match guard.staging.as_mut() {
            Some(staging) => {
                staging.depth -= 1;
                staging.depth == 0
            }
            None => return Err(StoreError::NoActiveBatch),
        };
        if done {
            guard.staging = None;
            drop(guard);
            self.idle.notify_all();
            debug!("batch discarded");
        }
        Ok(())
    }

    fn lock_own_batch(&self) -> StoreResult<MutexGuard<'_, State>> {
        let me = thread::current().id();
        let guard = self.lock();
        match &guard.staging {
            Some(staging) if staging.owner == me => Ok(guard),
            _ => Err(StoreError::NoActiveBatch),
        }
    }

    /// Whether the calling thread has a batch open.
    pub fn in_batch(&self) -> bool {
        let me = thread::current().id();
        self.lock().staging.as_ref().is_some_and(|s| s.owner == me)
    }

    /// Refuse all further writes. Reads keep working. A write already
    /// holding the lock finishes first.
    pub fn close(&self) {
        let _state = self.lock();
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Exclusive write access to a [`SnapshotCell`], released on drop.
pub struct WriteGuard<'a> {
    state: MutexGuard<'a, State>,
}

impl WriteGuard<'_> {
    /// The snapshot the next publish builds on: the open batch's head on the
    /// owning thread, otherwise the published snapshot.
    pub fn base(&self) -> Arc<TableRef> {
        match &self.state.staging {
            Some(staging) => staging.head.clone(),
            None => self.state.current.clone(),
        }
    }

    /// Whether publishes land in an open batch rather than going public.
    pub fn staged(&self) -> bool {
        self.state.staging.is_some()
    }

    /// Publish `next` as the successor of [`WriteGuard::base`].
    pub fn publish(&mut self, next: TableRef) -> Transition {
        let base = self.base();
        let next = Arc::new(next.with_version(base.version() + 1));
        let state = &mut *self.state;
        match state.staging.as_mut() {
            Some(staging) => staging.head = next.clone(),
            None => state.current = next.clone(),
        }
        debug!(version = next.version(), "snapshot published");
        (base, next)
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new(TableRef::new())
    }
}

impl std::fmt::Debug for SnapshotCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("version", &self.published().version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_types::{Header, Value};

    fn write(cell: &SnapshotCell, label: &str, index: i64, value: &str) -> Transition {
        cell.update::<StoreError, _>(|t| Ok(t.with_cell(&Header::from(label), index, Value::from(value))))
            .unwrap()
    }

    // ---- Test 1: each update bumps the version ----
    #[test]
    fn update_publishes_successor() {
        let cell = SnapshotCell::default();
        let (old, new) = write(&cell, "A", 0, "x");
        assert_eq!(old.version(), 0);
        assert_eq!(new.version(), 1);
        assert_eq!(cell.current().cell(&Header::from("A"), 0), Value::from("x"));
        assert_eq!(old.cell(&Header::from("A"), 0), Value::Empty);
    }

    // ---- Test 2: failed updates publish nothing ----
    #[test]
    fn failed_update_is_not_published() {
        let cell = SnapshotCell::default();
        let r = cell.update::<StoreError, _>(|_| Err(StoreError::NoActiveBatch));
        assert!(r.is_err());
        assert_eq!(cell.current().version(), 0);
    }

    // ---- Test 3: closed cells refuse writes ----
    #[test]
    fn closed_cell_refuses_writes() {
        let cell = SnapshotCell::default();
        write(&cell, "A", 0, "x");
        cell.close();
        let r = cell.update::<StoreError, _>(|t| Ok((**t).clone()));
        assert_eq!(r.unwrap_err(), StoreError::Closed);
        assert_eq!(cell.current().cell(&Header::from("A"), 0), Value::from("x"));
    }

    // ---- Test 4: batches stage privately and publish once ----
    #[test]
    fn batch_commit_publishes_once() {
        let cell = Arc::new(SnapshotCell::default());
        assert!(cell.begin_batch().unwrap());
        write(&cell, "A", 0, "x");
        write(&cell, "A", 1, "y");
        assert_eq!(cell.current().cell(&Header::from("A"), 1), Value::from("y"));
        assert_eq!(cell.published().version(), 0);

        let other = cell.clone();
        let seen = std::thread::spawn(move || other.current().version()).join().unwrap();
        assert_eq!(seen, 0);

        let (base, head) = cell.commit_batch().unwrap().unwrap();
        assert_eq!(base.version(), 0);
        assert_eq!(head.version(), 2);
        assert_eq!(cell.published().version(), 2);
    }

    // ---- Test 5: nested batches join the outer one ----
    #[test]
    fn nested_batches_join() {
        let cell = SnapshotCell::default();
        assert!(cell.begin_batch().unwrap());
        assert!(!cell.begin_batch().unwrap());
        write(&cell, "A", 0, "x");
        assert!(cell.commit_batch().unwrap().is_none());
        assert_eq!(cell.published().version(), 0);
        assert!(cell.commit_batch().unwrap().is_some());
        assert_eq!(cell.published().version(), 1);
    }

    // ---- Test 6: discarded batches leave no trace ----
    #[test]
    fn discard_drops_staged_edits() {
        let cell = SnapshotCell::default();
        cell.begin_batch().unwrap();
        write(&cell, "A", 0, "x");
        cell.discard_batch().unwrap();
        assert!(!cell.in_batch());
        assert_eq!(cell.current().cell(&Header::from("A"), 0), Value::Empty);
        assert_eq!(cell.commit_batch().unwrap_err(), StoreError::NoActiveBatch);
    }

    // ---- Test 7: other writers wait for an open batch ----
    #[test]
    fn writers_wait_for_batch() {
        let cell = Arc::new(SnapshotCell::default());
        cell.begin_batch().unwrap();
        write(&cell, "A", 0, "batch");

        let other = cell.clone();
        let handle = std::thread::spawn(move || {
            let (old, _) = write(&other, "A", 0, "later");
            old.version()
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        cell.commit_batch().unwrap();
        // The waiting writer builds on the committed batch.
        assert_eq!(handle.join().unwrap(), 1);
        assert_eq!(cell.current().cell(&Header::from("A"), 0), Value::from("later"));
    }

    // ---- Test 8: a held guard keeps other writers out ----
    #[test]
    fn guard_orders_writers() {
        let cell = Arc::new(SnapshotCell::default());
        let mut guard = cell.write().unwrap();
        let (old, new) = guard.publish(guard.base().with_cell(&Header::from("A"), 0, Value::from("first")));
        assert_eq!((old.version(), new.version()), (0, 1));
        assert!(!guard.staged());

        let other = cell.clone();
        let handle = std::thread::spawn(move || write(&other, "A", 0, "second").0.version());
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(guard);
        // The other writer builds on what the guard published.
        assert_eq!(handle.join().unwrap(), 1);
        assert_eq!(cell.current().cell(&Header::from("A"), 0), Value::from("second"));
    }

    // ---- Test 9: pairs lock both cells and wait out foreign batches ----
    #[test]
    fn write_pair_waits_for_batch() {
        let a = Arc::new(SnapshotCell::default());
        let b = Arc::new(SnapshotCell::default());
        b.begin_batch().unwrap();
        write(&b, "B", 0, "batch");

        let (a2, b2) = (a.clone(), b.clone());
        let handle = std::thread::spawn(move || {
            let (mut ga, mut gb) = SnapshotCell::write_pair(&a2, &b2).unwrap();
            let base_b = gb.base();
            let from_b = base_b.cell(&Header::from("B"), 0);
            ga.publish(ga.base().with_cell(&Header::from("A"), 0, from_b));
            gb.publish(base_b.without_cell(&Header::from("B"), 0));
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        // The first cell is not held while the second has a batch open.
        write(&a, "A", 1, "free");
        b.commit_batch().unwrap();
        handle.join().unwrap();

        assert_eq!(a.current().cell(&Header::from("A"), 0), Value::from("batch"));
        assert_eq!(a.current().cell(&Header::from("A"), 1), Value::from("free"));
        assert_eq!(b.current().cell(&Header::from("B"), 0), Value::Empty);
    }

    // ---- Test 10: closing refuses the pair as a whole ----
    #[test]
    fn write_pair_on_closed_cell() {
        let a = SnapshotCell::default();
        let b = SnapshotCell::default();
        b.close();
        assert_eq!(SnapshotCell::write_pair(&a, &b).err(), Some(StoreError::Closed));
        // The first lock was released.
        write(&a, "A", 0, "x");
    }

    // ---- Test 11: the commit hook runs before the lock is released ----
    #[test]
    fn commit_hook_sees_transition() {
        let cell = SnapshotCell::default();
        cell.begin_batch().unwrap();
        write(&cell, "A", 0, "x");
        write(&cell, "A", 1, "y");
        let mut seen = None;
        let committed = cell
            .commit_batch_then(|(base, head)| seen = Some((base.version(), head.version())))
            .unwrap();
        assert_eq!(seen, Some((0, 2)));
        assert_eq!(committed.map(|(_, head)| head.version()), Some(2));
    }
}
