//! User-facing alert side effect for delivered messages.

use super::InboundMessage;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// One alert per delivered message, each with a freshly generated id.
#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Uuid,
    pub message: InboundMessage,
}

impl Alert {
    pub fn new(message: InboundMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
        }
    }

    /// Short lossy rendering of the payload for display and logging.
    pub fn preview(&self) -> String {
        let text = String::from_utf8_lossy(&self.message.payload);
        if text.chars().count() > 120 {
            let truncated: String = text.chars().take(120).collect();
            format!("{truncated}…")
        } else {
            text.to_string()
        }
    }
}

/// Presents alerts to the user. Fire-and-forget: no acknowledgment channel
/// flows back to the watcher core.
#[async_trait]
pub trait AlertPresenter: Send + Sync {
    async fn present(&self, alert: Alert);
}

/// Default presenter that writes alerts to the log. Hosts with a system
/// notification channel supply their own implementation instead.
pub struct LogAlertPresenter;

#[async_trait]
impl AlertPresenter for LogAlertPresenter {
    async fn present(&self, alert: Alert) {
        info!(
            alert_id = %alert.id,
            topic = %alert.message.topic,
            preview = %alert.preview(),
            "alert"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_preview_short_payload() {
        let alert = Alert::new(InboundMessage::new(
            "a/b".to_string(),
            Bytes::from_static(b"hello"),
        ));
        assert_eq!(alert.preview(), "hello");
    }

    #[test]
    fn test_preview_truncates_long_payload() {
        let long = "x".repeat(500);
        let alert = Alert::new(InboundMessage::new(
            "a/b".to_string(),
            Bytes::from(long),
        ));
        let preview = alert.preview();
        assert!(preview.chars().count() <= 121);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_preview_is_lossy_on_invalid_utf8() {
        let alert = Alert::new(InboundMessage::new(
            "a/b".to_string(),
            Bytes::from_static(&[0xff, 0xfe, b'o', b'k']),
        ));
        assert!(alert.preview().contains("ok"));
    }
}
