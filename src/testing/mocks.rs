//! Mock transport for testing
//!
//! Records every call, can be scripted to fail, and exposes the event
//! sender the manager wired in so tests can inject broker events.

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scripted failure behavior for one mock operation.
#[derive(Debug, Clone, Default)]
pub enum FailureScript {
    #[default]
    None,
    /// Fail the next call with this message, then succeed.
    Once(String),
    /// Fail every call with this message.
    Always(String),
}

impl FailureScript {
    /// Pop the failure for the next call, advancing `Once` to `None`.
    fn next(&mut self) -> Option<String> {
        match self {
            FailureScript::None => None,
            FailureScript::Once(msg) => {
                let msg = msg.clone();
                *self = FailureScript::None;
                Some(msg)
            }
            FailureScript::Always(msg) => Some(msg.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
    close_calls: AtomicU32,
    subscribe_calls: Mutex<Vec<(String, u8)>>,
    connect_failure: Mutex<FailureScript>,
    subscribe_failure: Mutex<FailureScript>,
    disconnect_failure: Mutex<FailureScript>,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

/// Mock transport for testing. Clones share one set of recorded calls, so
/// a test can keep a handle after moving the mock into the watcher.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self, script: FailureScript) {
        *lock(&self.inner.connect_failure) = script;
    }

    pub fn fail_subscribe(&self, script: FailureScript) {
        *lock(&self.inner.subscribe_failure) = script;
    }

    pub fn fail_disconnect(&self, script: FailureScript) {
        *lock(&self.inner.disconnect_failure) = script;
    }

    pub fn connect_calls(&self) -> u32 {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.inner.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> Vec<(String, u8)> {
        lock(&self.inner.subscribe_calls).clone()
    }

    /// Inject a broker event as if it came off the wire. Panics if the
    /// transport was never wired to a manager.
    pub fn emit(&self, event: TransportEvent) {
        let guard = lock(&self.inner.events);
        let sender = guard.as_ref().expect("event sender not wired");
        sender.send(event).expect("manager channel closed");
    }

    pub fn has_event_sender(&self) -> bool {
        lock(&self.inner.events).is_some()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = lock(&self.inner.connect_failure).next() {
            return Err(TransportError::Connect(msg));
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransportError> {
        lock(&self.inner.subscribe_calls).push((topic.to_string(), qos));
        if let Some(msg) = lock(&self.inner.subscribe_failure).next() {
            return Err(TransportError::Subscribe(msg));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.inner.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = lock(&self.inner.disconnect_failure).next() {
            return Err(TransportError::Disconnect(msg));
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<TransportEvent>) {
        *lock(&self.inner.events) = Some(sender);
    }
}
