//! Error types for the emulator.

use camlink_protocol::ProtocolError;
use thiserror::Error;

/// Result type for emulator operations.
pub type EmulatorResult<T> = Result<T, EmulatorError>;

/// Errors that can occur in the emulator.
#[derive(Error, Debug)]
pub enum EmulatorError {
    /// Malformed or unsupported request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Property the device does not expose.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// Message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error (bind, accept).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmulatorError {
    /// Returns true if the caller sent something wrong.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EmulatorError::InvalidRequest(_)
                | EmulatorError::UnknownProperty(_)
                | EmulatorError::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(EmulatorError::UnknownProperty("/x".into()).is_client_error());
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        assert!(!EmulatorError::from(io).is_client_error());
    }

    #[test]
    fn error_display() {
        let err = EmulatorError::UnknownProperty("/video/iris".into());
        assert!(err.to_string().contains("/video/iris"));
    }
}
