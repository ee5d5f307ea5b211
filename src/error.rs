//! Error types for the streaming session engine.
//!
//! All errors implement the `std::error::Error` trait and carry enough context
//! to decide whether the caller should retry.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: connection refused, timeouts, malformed responses
//! - **Protocol Errors**: the service answered with `success=false`
//! - **Decode Errors**: undersized or malformed payloads (absorbed locally)
//! - **Duplicate Operations**: start while running, stop while idle
//! - **Configuration Errors**: invalid values in the loaded configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use camstream::StreamError;
//!
//! let error = StreamError::transport("connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for streaming operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Malformed response to {operation}: {details}")]
    MalformedResponse { operation: String, details: String },

    #[error("Service rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    #[error("Control channel protocol error: {details}")]
    Protocol { details: String },

    #[error("Decode error: {details}")]
    Decode { details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("A session is already starting or active")]
    AlreadyRunning,

    #[error("No active session")]
    NotActive,

    #[error("Session controller has shut down")]
    ControllerClosed,
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Transport { .. } => true,
            StreamError::Timeout { .. } => true,
            StreamError::MalformedResponse { .. } => false,
            StreamError::Rejected { .. } => true,
            StreamError::Protocol { .. } => true,
            StreamError::Decode { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::AlreadyRunning => false,
            StreamError::NotActive => false,
            StreamError::ControllerClosed => false,
        }
    }

    /// Returns whether this error should reach the host's error callback.
    ///
    /// Decode failures and duplicate operations are absorbed locally.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            StreamError::Transport { .. }
                | StreamError::Timeout { .. }
                | StreamError::MalformedResponse { .. }
                | StreamError::Rejected { .. }
                | StreamError::Protocol { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Transport { .. } => vec![
                "Check that the processing service is reachable",
                "Verify the configured host, port and scheme",
                "Start a new session once the network recovers",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase the network timeouts",
                "Check the service load and network latency",
            ],
            StreamError::MalformedResponse { .. } => vec![
                "Verify the service version matches this client",
                "Check for proxies rewriting the response body",
            ],
            StreamError::Rejected { .. } => vec![
                "Inspect the service message for the rejection reason",
                "Start a new session if the previous one expired",
            ],
            StreamError::Protocol { .. } => vec![
                "Verify the control channel speaks Engine.IO v4",
                "Reconnect to reset the control channel",
            ],
            StreamError::Decode { .. } => vec![
                "Check that the negotiated geometry matches the service output",
                "Inspect the payload through the fallback waveform",
            ],
            StreamError::Config { .. } => vec![
                "Fix the reported configuration value",
                "Remove the key to fall back to its default",
            ],
            StreamError::AlreadyRunning => vec!["Stop the running session before starting another"],
            StreamError::NotActive => vec!["Start a session before streaming or stopping"],
            StreamError::ControllerClosed => vec!["Spawn a new session controller"],
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        StreamError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for responses that could not be understood.
    pub fn malformed(operation: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::MalformedResponse { operation: operation.into(), details: details.into() }
    }

    /// Helper constructor for `success=false` responses.
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        StreamError::Rejected { operation: operation.into(), message: message.into() }
    }

    /// Helper constructor for control channel protocol errors.
    pub fn protocol(details: impl Into<String>) -> Self {
        StreamError::Protocol { details: details.into() }
    }

    /// Helper constructor for decode errors.
    pub fn decode(details: impl Into<String>) -> Self {
        StreamError::Decode { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::transport_with_source("I/O failure", Box::new(err))
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return StreamError::transport_with_source("request timed out", Box::new(err));
        }
        if err.is_decode() {
            return StreamError::malformed("HTTP request", err.to_string());
        }
        StreamError::transport_with_source("HTTP request failed", Box::new(err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::transport_with_source("WebSocket failure", Box::new(err))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::protocol(format!("invalid JSON: {}", err))
    }
}

impl From<base64::DecodeError> for StreamError {
    fn from(err: base64::DecodeError) -> Self {
        StreamError::decode(format!("invalid base64 payload: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn messages_carry_their_context(
                reason in ".*",
                operation in "\\w+",
                message in ".*",
            ) {
                let transport = StreamError::transport(reason.clone());
                prop_assert!(transport.to_string().contains(&reason));

                let rejected = StreamError::rejected(operation.clone(), message.clone());
                let text = rejected.to_string();
                prop_assert!(text.contains(&operation));
                prop_assert!(text.contains(&message));
            }
        }
    }

    #[test]
    fn source_chain_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: StreamError = io.into();
        let source = std::error::Error::source(&err).expect("source kept");
        assert_eq!(source.to_string(), "refused");
    }

    #[test]
    fn only_transport_and_protocol_errors_are_reportable() {
        assert!(StreamError::transport("down").is_reportable());
        assert!(StreamError::rejected("start", "no capacity").is_reportable());
        assert!(!StreamError::decode("short").is_reportable());
        assert!(!StreamError::AlreadyRunning.is_reportable());
        assert!(!StreamError::NotActive.is_reportable());
    }

    #[test]
    fn recovery_suggestions_are_never_empty() {
        let errors = [
            StreamError::transport("x"),
            StreamError::Timeout { duration: Duration::from_secs(1) },
            StreamError::malformed("start", "eof"),
            StreamError::rejected("stop", "gone"),
            StreamError::protocol("bad packet"),
            StreamError::decode("short"),
            StreamError::config("port"),
            StreamError::AlreadyRunning,
            StreamError::NotActive,
            StreamError::ControllerClosed,
        ];
        for error in &errors {
            assert!(!error.recovery_suggestions().is_empty(), "{error:?}");
        }
    }

    #[test]
    fn error_is_send_sync_static() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<StreamError>();
    }
}
