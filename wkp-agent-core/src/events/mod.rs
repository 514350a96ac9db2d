//! Event types for the telemetry pipeline.
//!
//! # Event Flow
//!
//! 1. An `Informer` observes object changes and hands them to its `Notifier`
//! 2. The `Notifier` enqueues a `ChangeEvent` on the watcher's `WorkQueue`
//! 3. `Watcher` workers drain the queue into a `ChangeHandler`
//! 4. Handlers and `Poller`s publish `EventEnvelope`s through an `EventSender`
//!
//! Watchers and pollers share nothing but the sender; each owns its queue
//! or schedule.

pub mod types;

pub use types::{ChangeEvent, ChangeType, ItemId};
