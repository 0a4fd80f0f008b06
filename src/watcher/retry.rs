//! Retry scheduling with cancellation
//!
//! A retry is a timer that posts a `RetryFired` event back into the
//! manager's channel. Cancellation is explicit (a signal aborts the wait)
//! and additionally guarded on arrival: every firing carries the epoch it
//! was scheduled under, and the manager drops firings from a previous
//! epoch. Scheduling a retry of a kind that already has one outstanding
//! cancels the older timer first.

use super::manager::ManagerEvent;
use super::state::RetryKind;
use crate::config::RetrySection;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Fixed-delay retry policy. No backoff growth; attempts are unbounded
/// unless a cap is configured.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

/// Decision for one more retry attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Proceed,
    GiveUp,
}

impl RetryPolicy {
    pub fn from_config(config: &RetrySection) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Decide whether attempt number `attempt` (1-based) may proceed.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        match self.max_attempts {
            Some(max) if attempt > max => RetryDecision::GiveUp,
            _ => RetryDecision::Proceed,
        }
    }
}

struct PendingRetry {
    cancel: watch::Sender<bool>,
}

/// Schedules cancellable retry timers feeding the manager channel.
pub struct RetryScheduler {
    events: mpsc::UnboundedSender<ManagerEvent>,
    pending: HashMap<RetryKind, PendingRetry>,
}

impl RetryScheduler {
    pub fn new(events: mpsc::UnboundedSender<ManagerEvent>) -> Self {
        Self {
            events,
            pending: HashMap::new(),
        }
    }

    /// Arm a timer for `kind`, replacing any outstanding one of the same
    /// kind. When it fires it posts `RetryFired { kind, epoch }`.
    pub fn schedule(&mut self, kind: RetryKind, delay: Duration, epoch: u64) {
        self.cancel(kind);

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx.changed() => {
                    debug!(?kind, "retry cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    let _ = events.send(ManagerEvent::RetryFired { kind, epoch });
                }
            }
        });

        self.pending.insert(kind, PendingRetry { cancel: cancel_tx });
    }

    /// Cancel the outstanding retry of this kind, if any.
    pub fn cancel(&mut self, kind: RetryKind) {
        if let Some(pending) = self.pending.remove(&kind) {
            let _ = pending.cancel.send(true);
        }
    }

    /// Cancel everything; used when a disconnect preempts the retry loop.
    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.cancel.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn scheduler() -> (RetryScheduler, mpsc::UnboundedReceiver<ManagerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RetryScheduler::new(tx), rx)
    }

    #[tokio::test]
    async fn test_scheduled_retry_fires_with_epoch() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.schedule(RetryKind::Connect, Duration::from_millis(5), 7);

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("retry should fire")
            .unwrap();
        assert_eq!(
            event,
            ManagerEvent::RetryFired {
                kind: RetryKind::Connect,
                epoch: 7
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_retry_never_fires() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.schedule(RetryKind::Connect, Duration::from_millis(20), 0);
        scheduler.cancel(RetryKind::Connect);

        let result = timeout(Duration::from_millis(80), rx.recv()).await;
        assert!(result.is_err(), "cancelled retry must not fire");
    }

    #[tokio::test]
    async fn test_rescheduling_replaces_outstanding_timer() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.schedule(RetryKind::Connect, Duration::from_millis(10), 1);
        scheduler.schedule(RetryKind::Connect, Duration::from_millis(10), 2);

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("replacement retry should fire")
            .unwrap();
        assert_eq!(
            event,
            ManagerEvent::RetryFired {
                kind: RetryKind::Connect,
                epoch: 2
            }
        );

        // The first timer was cancelled, so nothing else arrives.
        let extra = timeout(Duration::from_millis(60), rx.recv()).await;
        assert!(extra.is_err(), "only one retry of a kind may be outstanding");
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.schedule(RetryKind::Connect, Duration::from_millis(5), 0);
        scheduler.schedule(RetryKind::Subscribe, Duration::from_millis(5), 0);

        let mut kinds = Vec::new();
        for _ in 0..2 {
            if let ManagerEvent::RetryFired { kind, .. } = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("both retries should fire")
                .unwrap()
            {
                kinds.push(kind);
            }
        }
        assert!(kinds.contains(&RetryKind::Connect));
        assert!(kinds.contains(&RetryKind::Subscribe));
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.schedule(RetryKind::Connect, Duration::from_millis(10), 0);
        scheduler.schedule(RetryKind::Subscribe, Duration::from_millis(10), 0);
        scheduler.cancel_all();

        let result = timeout(Duration::from_millis(60), rx.recv()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_unbounded_by_default() {
        let policy = RetryPolicy::from_config(&RetrySection::default());
        assert_eq!(policy.delay, Duration::from_millis(5000));
        assert_eq!(policy.decide(1), RetryDecision::Proceed);
        assert_eq!(policy.decide(1_000_000), RetryDecision::Proceed);
    }

    #[test]
    fn test_policy_with_cap() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(10),
            max_attempts: Some(2),
        };
        assert_eq!(policy.decide(1), RetryDecision::Proceed);
        assert_eq!(policy.decide(2), RetryDecision::Proceed);
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
    }
}
