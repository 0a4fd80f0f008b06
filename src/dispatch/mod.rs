//! Event dispatcher
//!
//! Fans status and message events out to whoever is currently listening.
//! Delivery is at-most-once and best-effort: no durability, no replay, and
//! an observer that registers after an event fired never sees it. The only
//! way to learn the current state after the fact is an explicit status
//! request through the lifecycle controller.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

mod alert;

pub use alert::{Alert, AlertPresenter, LogAlertPresenter};

/// Externally observable connection-state notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub connected: bool,
    pub error: Option<String>,
}

impl StatusEvent {
    pub fn connected() -> Self {
        Self {
            connected: true,
            error: None,
        }
    }

    pub fn disconnected(error: Option<String>) -> Self {
        Self {
            connected: false,
            error,
        }
    }
}

/// A message delivered by the broker. Transient: consumed by observers and
/// the alert presenter, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub arrived_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: String, payload: Bytes) -> Self {
        Self {
            topic,
            payload,
            arrived_at: Utc::now(),
        }
    }
}

/// Event stream delivered to registered observers.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    Status(StatusEvent),
    Message(InboundMessage),
}

/// Handle identifying a registered observer.
pub type ObserverId = u64;

struct Observer {
    id: ObserverId,
    sender: mpsc::UnboundedSender<WatcherEvent>,
}

pub struct EventDispatcher {
    observers: Mutex<Vec<Observer>>,
    next_id: AtomicU64,
    presenter: Arc<dyn AlertPresenter>,
}

impl EventDispatcher {
    pub fn new(presenter: Arc<dyn AlertPresenter>) -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            presenter,
        }
    }

    /// Register an observer; events published from now on are delivered to
    /// the returned receiver. Dropping the receiver deregisters implicitly.
    pub fn register(&self) -> (ObserverId, mpsc::UnboundedReceiver<WatcherEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_observers().push(Observer { id, sender });
        (id, receiver)
    }

    /// Remove an observer. Events already in its channel remain readable.
    pub fn deregister(&self, id: ObserverId) {
        self.lock_observers().retain(|obs| obs.id != id);
    }

    pub fn observer_count(&self) -> usize {
        self.lock_observers().len()
    }

    /// Deliver a status event to all current observers, in publish order.
    pub fn publish_status(&self, event: StatusEvent) {
        debug!(connected = event.connected, error = ?event.error, "publishing status event");
        self.fan_out(WatcherEvent::Status(event));
    }

    /// Deliver a message to all current observers and raise one alert for
    /// it. Alerts are fire-and-forget: not deduplicated, not rate-limited.
    pub async fn publish_message(&self, message: InboundMessage) {
        self.fan_out(WatcherEvent::Message(message.clone()));
        self.presenter.present(Alert::new(message)).await;
    }

    fn fan_out(&self, event: WatcherEvent) {
        // Observers whose receiver is gone are pruned as a side effect.
        self.lock_observers()
            .retain(|obs| obs.sender.send(event.clone()).is_ok());
    }

    fn lock_observers(&self) -> MutexGuard<'_, Vec<Observer>> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
