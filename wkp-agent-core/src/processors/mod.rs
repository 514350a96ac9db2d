//! Processors of the telemetry pipeline.
//!
//! - `Watcher`: drains an informer's notifications into a `ChangeHandler`
//! - `Poller`: runs a `Collector` on a fixed schedule
//! - `EventSender`: wraps payloads into envelopes and hands them to a transport
//! - `EventNotifier`: the `ChangeHandler` forwarding Kubernetes events

pub mod notifier;
pub mod poller;
pub mod sender;
pub mod watcher;

pub use notifier::EventNotifier;
pub use poller::{Collector, CollectFn, PollError, Poller, PollerStats, PollerStatsSnapshot, collect_fn};
pub use sender::{EventSender, SendError};
pub use watcher::{
    ChangeHandler, ErrorReporter, ProcessFn, TracingErrorReporter, Watcher, WatcherError,
    process_fn,
};

use tokio::sync::watch;

/// Resolve once shutdown has been signalled or the sender is gone.
pub async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
}
