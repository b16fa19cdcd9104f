//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while translating between wire text and envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message is not valid JSON.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Parser error description.
        message: String,
    },

    /// The message is JSON but not shaped like an envelope.
    #[error("invalid envelope structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A field required by the envelope variant is absent.
    #[error("missing required field `{field}`")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The `type` tag is not one of `request`, `response`, `event`.
    #[error("unknown envelope type: {type_name}")]
    UnknownType {
        /// The tag that was received.
        type_name: String,
    },

    /// Arguments used a field name the envelope reserves for itself.
    #[error("argument name `{field}` is reserved")]
    ReservedField {
        /// The reserved name.
        field: String,
    },

    /// The envelope carries a different action than the caller expected.
    #[error("unexpected action: expected {expected}, got {actual}")]
    UnexpectedAction {
        /// Action the caller asked for.
        expected: &'static str,
        /// Action found in the envelope.
        actual: String,
    },

    /// A property value does not match the requested typed view.
    #[error("invalid property value: {message}")]
    InvalidValue {
        /// Deserializer error description.
        message: String,
    },
}

impl ProtocolError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create a missing field error.
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
        }
    }
}
