use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, ThreadId};

use tracing::{debug, info, warn};

use crate::error::{EventError, Result};
use crate::listener::{
    EventFilter, ListenerConfig, ListenerError, ListenerEvent, ListenerId, ListenerInfo,
};

thread_local! {
    /// Listeners whose callbacks are running on this thread, outermost first.
    static ACTIVE: RefCell<Vec<ListenerId>> = const { RefCell::new(Vec::new()) };
}

type Callback<E> = Box<dyn Fn(&[E]) -> std::result::Result<(), ListenerError> + Send + Sync>;

struct Listener<E> {
    id: ListenerId,
    config: ListenerConfig,
    filter: Box<dyn EventFilter<E>>,
    callback: Callback<E>,
    /// Events at or below this version were covered by the history delivery.
    since: u64,
    removed: AtomicBool,
}

impl<E> Listener<E> {
    fn label(&self) -> String {
        match &self.config.name {
            Some(name) => format!("{name} ({})", self.id),
            None => self.id.to_string(),
        }
    }
}

/// A batch waiting for delivery, with the listeners that caused it.
struct Pending<E> {
    events: Vec<E>,
    causes: Vec<ListenerId>,
}

struct Dispatch<E> {
    owner: Option<ThreadId>,
    queue: VecDeque<Pending<E>>,
}

/// Ordered, synchronous fan-out of event batches to filtered listeners.
///
/// Listeners run in `(order, id)` order on the publishing thread. A batch
/// published from inside a callback is queued and delivered once the current
/// batch has reached every listener, before the outermost publish returns.
/// Publishers on other threads wait until the running dispatch drains.
///
/// A callback that fails or panics is logged and skipped; the rest of the
/// listeners still receive the batch.
pub struct EventProcessor<E> {
    listeners: RwLock<BTreeMap<(i64, ListenerId), Arc<Listener<E>>>>,
    dispatch: Mutex<Dispatch<E>>,
    idle: Condvar,
}

impl<E: ListenerEvent> EventProcessor<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            dispatch: Mutex::new(Dispatch { owner: None, queue: VecDeque::new() }),
            idle: Condvar::new(),
        }
    }

    /// Register a listener.
    ///
    /// `history` is evaluated while registration holds the listener lock and
    /// returns the current version plus the events that describe the existing
    /// state. Unless `skip_history` is set those events are delivered to the
    /// new listener right away; afterwards it only receives events newer than
    /// that version.
    pub fn subscribe<F, C, H>(&self, config: ListenerConfig, filter: F, callback: C, history: H) -> ListenerId
    where
        F: EventFilter<E> + 'static,
        C: Fn(&[E]) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
        H: FnOnce() -> (u64, Vec<E>),
    {
        let id = ListenerId::next();
        let (listener, history) = {
            let mut listeners = self.listeners.write().expect("listener lock poisoned");
            let (since, history) = history();
            let listener = Arc::new(Listener {
                id,
                config,
                filter: Box::new(filter),
                callback: Box::new(callback),
                since,
                removed: AtomicBool::new(false),
            });
            listeners.insert((listener.config.order, id), listener.clone());
            (listener, history)
        };
        info!(listener = %listener.label(), order = listener.config.order, "listener subscribed");

        if !listener.config.skip_history {
            let events: Vec<E> = history.into_iter().filter(|e| listener.filter.matches(e)).collect();
            if !events.is_empty() {
                let causes = ACTIVE.with(|a| a.borrow().clone());
                self.invoke(&listener, &events, &causes);
            }
        }
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("listener lock poisoned");
        let key = listeners.iter().find(|(_, l)| l.id == id).map(|(k, _)| *k);
        match key.and_then(|k| listeners.remove(&k)) {
            Some(listener) => {
                listener.removed.store(true, Ordering::SeqCst);
                info!(listener = %listener.label(), "listener removed");
                true
            }
            None => false,
        }
    }

    /// Like [`EventProcessor::unsubscribe`], failing on an unknown id.
    pub fn remove(&self, id: ListenerId) -> Result<()> {
        if self.unsubscribe(id) {
            Ok(())
        } else {
            Err(EventError::UnknownListener(id))
        }
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let mut listeners = self.listeners.write().expect("listener lock poisoned");
        for listener in listeners.values() {
            listener.removed.store(true, Ordering::SeqCst);
        }
        listeners.clear();
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners
            .read()
            .expect("listener lock poisoned")
            .values()
            .any(|l| l.id == id)
    }

    /// Registered listeners in delivery order.
    pub fn listeners(&self) -> Vec<ListenerInfo> {
        self.listeners
            .read()
            .expect("listener lock poisoned")
            .values()
            .map(|l| ListenerInfo { id: l.id, name: l.config.name.clone(), order: l.config.order })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().expect("listener lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one batch to every interested listener.
    pub fn publish(&self, events: Vec<E>) {
        self.post(events);
        self.flush();
    }

    /// Queue a batch without delivering it. Batches are delivered in the
    /// order they were posted, by the next [`EventProcessor::flush`] on any
    /// thread.
    pub fn post(&self, events: Vec<E>) {
        if events.is_empty() {
            return;
        }
        let causes = ACTIVE.with(|a| a.borrow().clone());
        self.dispatch
            .lock()
            .expect("dispatch lock poisoned")
            .queue
            .push_back(Pending { events, causes });
    }

    /// Deliver everything queued.
    ///
    /// Inside a callback this returns at once and the running dispatch picks
    /// the queue up. If another thread is dispatching, waits until it has
    /// drained the queue, batches this thread posted included.
    pub fn flush(&self) {
        let me = thread::current().id();
        let mut dispatch = self.dispatch.lock().expect("dispatch lock poisoned");
        if dispatch.owner == Some(me) {
            return;
        }
        while dispatch.owner.is_some() {
            dispatch = self.idle.wait(dispatch).expect("dispatch lock poisoned");
        }
        if dispatch.queue.is_empty() {
            return;
        }
        dispatch.owner = Some(me);

        while let Some(pending) = dispatch.queue.pop_front() {
            drop(dispatch);
            self.deliver(&pending);
            dispatch = self.dispatch.lock().expect("dispatch lock poisoned");
        }
        dispatch.owner = None;
        drop(dispatch);
        self.idle.notify_all();
    }

    fn deliver(&self, pending: &Pending<E>) {
        let listeners: Vec<Arc<Listener<E>>> = self
            .listeners
            .read()
            .expect("listener lock poisoned")
            .values()
            .cloned()
            .collect();
        debug!(events = pending.events.len(), listeners = listeners.len(), "dispatching batch");

        for listener in listeners {
            if listener.removed.load(Ordering::SeqCst) {
                continue;
            }
            let events: Vec<E> = pending
                .events
                .iter()
                .filter(|e| e.version() > listener.since && listener.filter.matches(e))
                .cloned()
                .collect();
            if events.is_empty() {
                continue;
            }
            if !listener.config.allow_loop && pending.causes.contains(&listener.id) {
                warn!(listener = %listener.label(), events = events.len(), "listener loop detected, batch not delivered");
                continue;
            }
            self.invoke(&listener, &events, &pending.causes);
        }
    }

    fn invoke(&self, listener: &Listener<E>, events: &[E], causes: &[ListenerId]) {
        let mut chain = causes.to_vec();
        chain.push(listener.id);
        let previous = ACTIVE.with(|a| std::mem::replace(&mut *a.borrow_mut(), chain));
        let outcome = catch_unwind(AssertUnwindSafe(|| (listener.callback)(events)));
        ACTIVE.with(|a| *a.borrow_mut() = previous);

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(listener = %listener.label(), error = %error, "listener failed");
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(listener = %listener.label(), panic = %message, "listener panicked");
            }
        }
    }
}

impl<E: ListenerEvent> Default for EventProcessor<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventProcessor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.listeners.read().map(|l| l.len()).unwrap_or_default();
        f.debug_struct("EventProcessor").field("listeners", &count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Debug, PartialEq)]
    struct Ev {
        version: u64,
        key: &'static str,
    }

    impl ListenerEvent for Ev {
        fn version(&self) -> u64 {
            self.version
        }
    }

    fn ev(version: u64, key: &'static str) -> Ev {
        Ev { version, key }
    }

    type Log = Arc<StdMutex<Vec<String>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl Fn(&[Ev]) -> std::result::Result<(), ListenerError> + Send + Sync {
        let log = log.clone();
        move |events: &[Ev]| {
            for e in events {
                log.lock().unwrap().push(format!("{tag}:{}", e.key));
            }
            Ok(())
        }
    }

    fn no_history() -> (u64, Vec<Ev>) {
        (0, Vec::new())
    }

    // ---- Test 1: listeners run by order, then registration ----
    #[test]
    fn delivery_follows_order() {
        let p = EventProcessor::<Ev>::new();
        let log: Log = Arc::default();
        let late = ListenerConfig { order: 10, ..Default::default() };
        p.subscribe(late, |_: &Ev| true, recorder(&log, "late"), no_history);
        p.subscribe(ListenerConfig::default(), |_: &Ev| true, recorder(&log, "first"), no_history);
        p.subscribe(ListenerConfig::default(), |_: &Ev| true, recorder(&log, "second"), no_history);
        p.publish(vec![ev(1, "a")]);
        assert_eq!(*log.lock().unwrap(), vec!["first:a", "second:a", "late:a"]);
    }

    // ---- Test 2: filters drop whole batches ----
    #[test]
    fn filtered_out_batches_are_not_delivered() {
        let p = EventProcessor::<Ev>::new();
        let calls = Arc::new(StdMutex::new(0));
        let c = calls.clone();
        p.subscribe(
            ListenerConfig::default(),
            |e: &Ev| e.key == "x",
            move |_: &[Ev]| {
                *c.lock().unwrap() += 1;
                Ok(())
            },
            no_history,
        );
        p.publish(vec![ev(1, "a"), ev(1, "b")]);
        p.publish(vec![ev(2, "a"), ev(2, "x")]);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    // ---- Test 3: a failing listener does not block the others ----
    #[test]
    fn failures_are_isolated() {
        let p = EventProcessor::<Ev>::new();
        let log: Log = Arc::default();
        p.subscribe(ListenerConfig::named("erroring"), |_: &Ev| true, |_: &[Ev]| Err("boom".into()), no_history);
        p.subscribe(
            ListenerConfig::named("panicking"),
            |_: &Ev| true,
            |_: &[Ev]| -> std::result::Result<(), ListenerError> { panic!("listener bug") },
            no_history,
        );
        p.subscribe(ListenerConfig::default(), |_: &Ev| true, recorder(&log, "ok"), no_history);
        p.publish(vec![ev(1, "a")]);
        p.publish(vec![ev(2, "b")]);
        assert_eq!(*log.lock().unwrap(), vec!["ok:a", "ok:b"]);
    }

    // ---- Test 4: history is delivered, older events are skipped ----
    #[test]
    fn history_then_newer_events_only() {
        let p = EventProcessor::<Ev>::new();
        let log: Log = Arc::default();
        p.subscribe(ListenerConfig::default(), |_: &Ev| true, recorder(&log, "h"), || (5, vec![ev(5, "old")]));
        p.publish(vec![ev(4, "stale")]);
        p.publish(vec![ev(6, "new")]);
        assert_eq!(*log.lock().unwrap(), vec!["h:old", "h:new"]);

        let skipped: Log = Arc::default();
        let config = ListenerConfig { skip_history: true, ..Default::default() };
        p.subscribe(config, |_: &Ev| true, recorder(&skipped, "s"), || (6, vec![ev(6, "old")]));
        assert!(skipped.lock().unwrap().is_empty());
    }

    // ---- Test 5: nested publishes are queued breadth-first ----
    #[test]
    fn nested_publish_is_queued() {
        let p = Arc::new(EventProcessor::<Ev>::new());
        let log: Log = Arc::default();
        let inner = p.clone();
        let config = ListenerConfig { order: 0, allow_loop: true, ..Default::default() };
        p.subscribe(
            config,
            |_: &Ev| true,
            {
                let log = log.clone();
                move |events: &[Ev]| {
                    log.lock().unwrap().push(format!("writer:{}", events[0].key));
                    if events[0].key == "a" {
                        inner.publish(vec![ev(2, "b")]);
                    }
                    Ok(())
                }
            },
            no_history,
        );
        p.subscribe(ListenerConfig { order: 1, ..Default::default() }, |_: &Ev| true, recorder(&log, "reader"), no_history);
        p.publish(vec![ev(1, "a")]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["writer:a", "reader:a", "writer:b", "reader:b"]
        );
    }

    // ---- Test 6: a listener does not see its own writes unless allowed ----
    #[test]
    fn loops_are_detected() {
        let p = Arc::new(EventProcessor::<Ev>::new());
        let count = Arc::new(StdMutex::new(0));
        let inner = p.clone();
        let c = count.clone();
        p.subscribe(
            ListenerConfig::named("echo"),
            |_: &Ev| true,
            move |events: &[Ev]| {
                *c.lock().unwrap() += 1;
                inner.publish(vec![ev(events[0].version + 1, "echo")]);
                Ok(())
            },
            no_history,
        );
        p.publish(vec![ev(1, "a")]);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    // ---- Test 7: unsubscribe stops delivery ----
    #[test]
    fn unsubscribe_stops_delivery() {
        let p = EventProcessor::<Ev>::new();
        let log: Log = Arc::default();
        let id = p.subscribe(ListenerConfig::default(), |_: &Ev| true, recorder(&log, "x"), no_history);
        assert!(p.contains(id));
        assert!(p.unsubscribe(id));
        assert!(!p.unsubscribe(id));
        assert_eq!(p.remove(id), Err(EventError::UnknownListener(id)));
        p.publish(vec![ev(1, "a")]);
        assert!(log.lock().unwrap().is_empty());
        assert!(p.is_empty());
    }

    // ---- Test 8: posted batches wait for a flush and keep their order ----
    #[test]
    fn posts_flush_in_order() {
        let p = Arc::new(EventProcessor::<Ev>::new());
        let log: Log = Arc::default();
        p.subscribe(ListenerConfig::default(), |_: &Ev| true, recorder(&log, "x"), no_history);
        p.post(vec![ev(1, "a")]);
        p.post(vec![ev(2, "b")]);
        assert!(log.lock().unwrap().is_empty());

        // Any thread's flush drains the whole queue.
        let other = p.clone();
        std::thread::spawn(move || other.flush()).join().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["x:a", "x:b"]);

        p.flush();
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
