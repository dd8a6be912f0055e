// SPDX-License-Identifier: MIT
//
// Lifecycle event bus.
//
// Replaces the per-platform notification singletons with a single broadcast
// channel: the update manager and bridge functions publish, the host shell
// subscribes. Delivery is best-effort — events published with no subscribers
// are dropped, which matches launch-time orderings where the webview is not
// ready yet.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

/// Events the host shell reacts to.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A new bundle was installed in place; the running session may offer a
    /// one-time reload banner.
    UpdateInstalled {
        version: String,
        at: DateTime<Utc>,
    },
    /// The webview should reload its current page.
    ReloadRequested,
    /// A redirect left the pseudo-origin; the webview must navigate
    /// externally instead of re-invoking the engine.
    NavigateExternal { url: String },
}

/// Cheaply cloneable broadcast bus for [`LifecycleEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: LifecycleEvent) -> usize {
        debug!(?event, "lifecycle event");
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}
