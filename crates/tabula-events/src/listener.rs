use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique listener identifier. Ids increase in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Options for a listener subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Label used in logs.
    pub name: Option<String>,
    /// Listeners run in ascending order; ties run in registration order.
    pub order: i64,
    /// Deliver events caused by this listener's own writes back to it.
    pub allow_loop: bool,
    /// Skip the initial delivery of the existing state.
    pub skip_history: bool,
}

impl ListenerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }
}

/// An event carrying the version of the snapshot it produced.
pub trait ListenerEvent: Clone + Send + Sync + 'static {
    fn version(&self) -> u64;
}

/// Decides which events a listener receives.
pub trait EventFilter<E>: Send + Sync {
    fn matches(&self, event: &E) -> bool;
}

impl<E, F> EventFilter<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn matches(&self, event: &E) -> bool {
        self(event)
    }
}

/// Error a listener callback may return. It is logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Summary of a registered listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerInfo {
    pub id: ListenerId,
    pub name: Option<String>,
    pub order: i64,
}
