//! Unwrapping of the server's JSON response envelope.
//!
//! Frappe answers almost every call with an object carrying at most three
//! keys: `exc` (a server-side traceback), `message` (the RPC return value)
//! and `data` (the resource payload). A truthy `exc` always wins, then
//! `message`, then `data`; anything else unwraps to `null`.

use serde_json::Value;

use crate::error::{FrappeError, Result};

/// Parse a response body and unwrap its envelope.
///
/// A body that is not JSON is logged verbatim before the parse error is
/// returned, since it usually is an HTML error page worth reading.
pub fn unwrap_body(body: &[u8]) -> Result<Value> {
    let json: Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(source) => {
            let body = String::from_utf8_lossy(body).into_owned();
            log::warn!("non-JSON response body: {body}");
            return Err(FrappeError::Json { source, body });
        }
    };
    unwrap_envelope(json)
}

/// Unwrap an already parsed envelope.
pub fn unwrap_envelope(json: Value) -> Result<Value> {
    let mut envelope = match json {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    if let Some(exc) = envelope.get("exc").filter(|exc| is_truthy(exc)) {
        let detail = match exc {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(FrappeError::Server { detail });
    }

    if let Some(message) = envelope.remove("message") {
        return Ok(message);
    }
    Ok(envelope.remove("data").unwrap_or(Value::Null))
}

/// Truthiness of a JSON value as the server's own language defines it.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_wins_over_data() {
        let value = unwrap_envelope(json!({"message": "M", "data": "D"})).unwrap();
        assert_eq!(value, "M");
    }

    #[test]
    fn data_used_when_message_absent() {
        assert_eq!(unwrap_envelope(json!({"data": "D"})).unwrap(), "D");
    }

    #[test]
    fn empty_envelope_is_null() {
        assert_eq!(unwrap_envelope(json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn explicit_null_message_is_returned_as_null() {
        let value = unwrap_envelope(json!({"message": null, "data": "D"})).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn exc_beats_message() {
        let err = unwrap_envelope(json!({"exc": "Traceback...", "message": "ignored"})).unwrap_err();
        match err {
            FrappeError::Server { detail } => assert_eq!(detail, "Traceback..."),
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[test]
    fn falsy_exc_is_ignored() {
        assert_eq!(unwrap_envelope(json!({"exc": "", "message": 1})).unwrap(), 1);
        assert_eq!(unwrap_envelope(json!({"exc": null, "data": [1]})).unwrap(), json!([1]));
    }

    #[test]
    fn non_string_exc_is_rendered_as_json() {
        let err = unwrap_envelope(json!({"exc": ["line 1", "line 2"]})).unwrap_err();
        assert!(matches!(err, FrappeError::Server { detail } if detail == r#"["line 1","line 2"]"#));
    }

    #[test]
    fn non_object_body_passes_through() {
        assert_eq!(unwrap_envelope(json!([1, 2])).unwrap(), json!([1, 2]));
    }

    #[test]
    fn bad_json_keeps_raw_body() {
        let err = unwrap_body(b"<html>502 Bad Gateway</html>").unwrap_err();
        match err {
            FrappeError::Json { body, .. } => assert_eq!(body, "<html>502 Bad Gateway</html>"),
            other => panic!("expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn truthiness_follows_server_semantics() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!({})));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(0.5)));
        assert!(is_truthy(&json!([0])));
    }
}
