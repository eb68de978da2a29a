//! Client error type and the application-error translator.

use std::time::Duration;

use mjsoul_catalog::SchemaError;
use mjsoul_protocol::ProtocolError;
use mjsoul_transport::TransportError;
use serde_json::Value;

/// Every way a client operation can fail.
///
/// Errors from the lower crates convert with `?` through the `#[from]`
/// variants, so callers deal with this one type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The socket failed to connect, send or receive.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame or message could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Name resolution or value conversion failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No response arrived within the configured timeout.
    #[error("response not received within {0:?}")]
    ResponseTimeout(Duration),

    /// The server answered with a non-zero `error.code`.
    #[error("error code {code}: {message}")]
    GeneralProtocolError { code: u32, message: String },

    /// The connection went away while the call was pending, or the
    /// client was already closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Every sequence index is held by an outstanding call.
    #[error("all {} request indices are in use", mjsoul_protocol::INDEX_SPACE)]
    TooManyPending,
}

/// Fails if a decoded response carries an application error.
///
/// Looks at `error.code`; zero or absent means success. The message is
/// the first non-empty of `error.message`, `error.json_param` and the
/// joined `error.str_params`, falling back to `"error"`.
pub fn check_response(response: &Value) -> Result<(), ClientError> {
    let Some(error) = response.get("error") else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_u64).unwrap_or(0);
    if code == 0 {
        return Ok(());
    }
    Err(ClientError::GeneralProtocolError {
        code: u32::try_from(code).unwrap_or(u32::MAX),
        message: error_message(error),
    })
}

fn error_message(error: &Value) -> String {
    let text = |key: &str| {
        error
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(message) = text("message").or_else(|| text("json_param")) {
        return message;
    }

    let params: Vec<&str> = error
        .get("str_params")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if params.is_empty() {
        "error".to_string()
    } else {
        params.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn translate(value: Value) -> Option<(u32, String)> {
        match check_response(&value) {
            Ok(()) => None,
            Err(ClientError::GeneralProtocolError { code, message }) => {
                Some((code, message))
            }
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_success_shapes() {
        assert_eq!(translate(json!({})), None);
        assert_eq!(translate(json!({"error": {}})), None);
        assert_eq!(translate(json!({"error": {"code": 0}})), None);
    }

    #[test]
    fn test_message_preferred() {
        let value = json!({"error": {"code": 5, "message": "bad state", "json_param": "{}"}});
        assert_eq!(translate(value), Some((5, "bad state".into())));
    }

    #[test]
    fn test_json_param_then_str_params() {
        assert_eq!(
            translate(json!({"error": {"code": 7, "json_param": "{\"k\":1}"}})),
            Some((7, "{\"k\":1}".into()))
        );
        assert_eq!(
            translate(json!({"error": {"code": 7, "str_params": ["a", "b"]}})),
            Some((7, "a, b".into()))
        );
    }

    #[test]
    fn test_fallback_message() {
        assert_eq!(
            translate(json!({"error": {"code": 1002, "message": ""}})),
            Some((1002, "error".into()))
        );
    }

    #[test]
    fn test_display() {
        let err = ClientError::GeneralProtocolError {
            code: 5,
            message: "bad state".into(),
        };
        assert_eq!(err.to_string(), "error code 5: bad state");
    }

    #[test]
    fn test_from_lower_errors() {
        let err: ClientError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.to_string().contains("gone"));

        let err: ClientError = SchemaError::MethodNotFound("x".into()).into();
        assert!(matches!(err, ClientError::Schema(SchemaError::MethodNotFound(_))));

        let err: ClientError = ProtocolError::UnknownMessageType(9).into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
