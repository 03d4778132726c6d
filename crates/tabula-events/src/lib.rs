//! Listener dispatch for Tabula.
//!
//! An [`EventProcessor`] fans batches of events out to filtered listeners,
//! synchronously and in a fixed order. It knows nothing about tables; the
//! event type only has to report the version it belongs to.
//!
//! # Delivery Rules
//!
//! 1. Listeners run in ascending `order`, ties in registration order.
//! 2. A listener receives the part of a batch its filter accepts, and nothing
//!    when that part is empty.
//! 3. Batches published from inside a callback run after the current batch.
//! 4. Failing or panicking callbacks are logged and skipped.
//! 5. A listener is not fed batches caused by its own writes unless it opts in.

pub mod error;
pub mod listener;
pub mod processor;

pub use error::{EventError, Result};
pub use listener::{EventFilter, ListenerConfig, ListenerError, ListenerEvent, ListenerId, ListenerInfo};
pub use processor::EventProcessor;
