//! Error types for schema resolution and the dynamic message codec.

use mjsoul_protocol::ProtocolError;

/// Errors raised while resolving names or converting values against a
/// schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// No declared service has a method with this short name.
    #[error("no method named '{0}' in any service")]
    MethodNotFound(String),

    /// The catalog has no message with this name.
    #[error("no message named '{0}'")]
    MessageNotFound(String),

    /// A value supplied a key the message does not declare.
    #[error("message {message} has no field '{field}'")]
    UnknownField { message: String, field: String },

    /// A value has the wrong shape for its field.
    #[error("field {field}: expected {expected}")]
    InvalidValue {
        field: String,
        expected: &'static str,
    },

    /// Messages nested deeper than the codec allows.
    #[error("message nesting exceeds {0} levels")]
    RecursionLimit(usize),

    /// The catalog description itself is inconsistent.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The descriptor document is not valid JSON.
    #[error("descriptor JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The message bytes could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SchemaError {
    pub(crate) fn invalid(field: &str, expected: &'static str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            expected,
        }
    }
}
