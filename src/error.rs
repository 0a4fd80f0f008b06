//! Error types for the watcher
//!
//! Transport failures never cross the connection manager boundary as raised
//! errors; they are converted into state transitions and status events. The
//! types here cover the paths that do return `Result` to a caller:
//! configuration loading and direct transport invocations.

use thiserror::Error;

/// Errors raised by a transport implementation on a direct call.
///
/// Asynchronous failures (connection lost, broker disconnect) are delivered
/// as [`TransportEvent`](crate::transport::TransportEvent)s instead.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("disconnect failed: {0}")]
    Disconnect(String),
    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

impl TransportError {
    /// The underlying failure message, without the operation prefix.
    ///
    /// Used where a synchronous error must surface exactly like the cause
    /// string of an asynchronous failure event.
    pub fn into_cause(self) -> String {
        match self {
            TransportError::Connect(cause)
            | TransportError::Subscribe(cause)
            | TransportError::Disconnect(cause) => cause,
            TransportError::InvalidBrokerUrl(url) => format!("invalid broker URL: {url}"),
        }
    }
}

/// Top-level error type for the watcher binary.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Strip credential-looking patterns from an error string before it is
/// surfaced through a status event or a log line.
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = regex::Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+")
        .unwrap()
        .replace_all(message, "${1}=***")
        .to_string();

    regex::Regex::new(r"(?i)(user(name)?)[=:]\s*\S+")
        .unwrap()
        .replace_all(&sanitized, "${1}=***")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_redacts_password() {
        let msg = "broker refused: password=hunter2 for client";
        let clean = sanitize_error_message(msg);
        assert!(!clean.contains("hunter2"));
        assert!(clean.contains("password=***"));
    }

    #[test]
    fn test_sanitize_redacts_username() {
        let msg = "auth rejected username: boyang";
        let clean = sanitize_error_message(msg);
        assert!(!clean.contains("boyang"));
    }

    #[test]
    fn test_sanitize_leaves_plain_messages_alone() {
        let msg = "Connection refused (os error 111)";
        assert_eq!(sanitize_error_message(msg), msg);
    }

    #[test]
    fn test_into_cause_strips_operation_prefix() {
        let error = TransportError::Connect("no route to host".to_string());
        assert!(error.to_string().starts_with("connect failed: "));
        assert_eq!(error.into_cause(), "no route to host");

        let error = TransportError::Subscribe("not authorized".to_string());
        assert_eq!(error.into_cause(), "not authorized");
    }

    #[test]
    fn test_error_display_is_not_empty() {
        let errors = vec![
            TransportError::Connect("refused".to_string()),
            TransportError::Subscribe("no auth".to_string()),
            TransportError::Disconnect("timeout".to_string()),
            TransportError::InvalidBrokerUrl("not-a-url".to_string()),
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
