//! Error types for the client.

use camlink_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Boxed error returned by a failing binding callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection-level failure. Transient; the session reconnects.
    #[error("network error: {0}")]
    Network(String),

    /// A bulk request returned a non-success status.
    #[error("request failed with status {status}: {status_text}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status.
        status_text: String,
    },

    /// A channel message was not a valid envelope.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A response body was not valid JSON (or not the expected shape).
    #[error("decode error: {0}")]
    Decode(String),

    /// `send` was called while the channel was not open.
    #[error("channel is not open")]
    ChannelClosed,

    /// A binding callback failed. Recoverable; delivery continues.
    #[error("binding callback for {property} failed: {message}")]
    BindingCallback {
        /// Property whose callback failed.
        property: String,
        /// Error or panic message.
        message: String,
    },

    /// The session driver has exited.
    #[error("session has shut down")]
    Shutdown,

    /// The configured base URL cannot be used.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A bounded wait elapsed.
    #[error("operation timed out")]
    Timeout,
}

impl ClientError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Timeout)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::Network("connection refused".into()).is_retryable());
        assert!(ClientError::Timeout.is_retryable());
        assert!(!ClientError::ChannelClosed.is_retryable());
        assert!(!ClientError::Transport {
            status: 404,
            status_text: "Not Found".into()
        }
        .is_retryable());
        assert!(!ClientError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ClientError::Transport {
            status: 503,
            status_text: "Service Unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 503: Service Unavailable"
        );

        let err: ClientError = ProtocolError::missing_field("type").into();
        assert!(err.to_string().contains("type"));
    }
}
