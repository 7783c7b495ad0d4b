//! WebSocket Message Types
//!
//! Wire shapes for requests and responses exchanged over a connection.
//!
//! Request: `{id?: scalar, route: string, event: string, data?: object|array}`
//! Response: the request shape plus `error: string|null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::error::DispatchError;

/// Caller-opaque correlation id, echoed verbatim in the response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Int(i64),
    /// Integers above `i64::MAX`
    UInt(u64),
    Str(String),
}

impl MessageId {
    /// Recover an id from an arbitrary JSON value, if it is a valid scalar
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(MessageId::Str(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(MessageId::Int)
                .or_else(|| n.as_u64().map(MessageId::UInt)),
            _ => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Int(n) => write!(f, "{}", n),
            MessageId::UInt(n) => write!(f, "{}", n),
            MessageId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        MessageId::Int(id)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        i64::try_from(id).map_or(MessageId::UInt(id), MessageId::Int)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId::Str(id.to_string())
    }
}

fn empty_data() -> Option<Value> {
    Some(Value::Object(Map::new()))
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A message sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Optional correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Selects the handler within a route
    pub event: String,
    /// Selects the handler group
    pub route: String,
    /// Payload; an empty object when absent, `None` when explicitly null
    #[serde(default = "empty_data")]
    pub data: Option<Value>,
}

impl Request {
    /// Create a request with an empty payload
    pub fn new(route: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            id: None,
            event: event.into(),
            route: route.into(),
            data: empty_data(),
        }
    }

    /// Set the correlation id
    pub fn id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the payload
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Decode a raw text or binary frame into a request.
    ///
    /// When the frame is valid JSON but not a valid request, the error carries
    /// whatever `id`/`route`/`event` could be recovered so the caller can still
    /// answer with an error response.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(frame).map_err(|e| DecodeError {
            message: e.to_string(),
            partial: None,
        })?;

        let partial = Self::recover(&value);

        if let Some(id) = value.get("id").filter(|id| !id.is_null()) {
            if MessageId::from_value(id).is_none() {
                return Err(DecodeError {
                    message: format!(
                        "id must be a string or an integer, got {}",
                        json_type_name(id)
                    ),
                    partial,
                });
            }
        }

        let request: Request = serde_json::from_value(value).map_err(|e| DecodeError {
            message: e.to_string(),
            partial: partial.clone(),
        })?;

        match &request.data {
            None | Some(Value::Object(_)) | Some(Value::Array(_)) => Ok(request),
            Some(other) => Err(DecodeError {
                message: format!(
                    "data must be an object or a list, got {}",
                    json_type_name(other)
                ),
                partial,
            }),
        }
    }

    /// Best-effort extraction of the routing envelope from a JSON value
    fn recover(value: &Value) -> Option<Request> {
        let object = value.as_object()?;
        let route = object.get("route")?.as_str()?;
        let event = object.get("event")?.as_str()?;

        Some(Request {
            id: object.get("id").and_then(MessageId::from_value),
            event: event.to_string(),
            route: route.to_string(),
            data: None,
        })
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A message sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echo of the request id (`null` when the request had none)
    #[serde(default)]
    pub id: Option<MessageId>,
    /// Echo of the request event
    pub event: String,
    /// Echo of the request route
    pub route: String,
    /// Response payload
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Error description, `null` on success
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    /// Build a successful response echoing the request envelope
    pub fn success(request: &Request, data: Value) -> Self {
        Self {
            id: request.id.clone(),
            event: request.event.clone(),
            route: request.route.clone(),
            data,
            error: None,
        }
    }

    /// Build an error response echoing the request envelope
    pub fn error(request: &Request, message: impl Into<String>) -> Self {
        Self {
            id: request.id.clone(),
            event: request.event.clone(),
            route: request.route.clone(),
            data: empty_object(),
            error: Some(message.into()),
        }
    }

    /// Whether this response reports a failure
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a JSON frame into a response
    pub fn decode(frame: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(frame)
    }
}

/// A frame that could not be decoded into a request
#[derive(Debug, Clone, Error)]
#[error("Invalid message format: {message}")]
pub struct DecodeError {
    /// Decoder error description
    pub message: String,
    /// Envelope recovered from the frame, if `route` and `event` were readable
    pub partial: Option<Request>,
}

impl DecodeError {
    /// Whether the connection can answer with an error response
    pub fn is_recoverable(&self) -> bool {
        self.partial.is_some()
    }
}

impl From<DecodeError> for DispatchError {
    fn from(err: DecodeError) -> Self {
        DispatchError::Decode {
            recoverable: err.is_recoverable(),
            message: err.message,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_minimal_request() {
        let request =
            Request::decode(br#"{"id": "x1", "route": "echo", "event": "ping"}"#).unwrap();
        assert_eq!(request.id, Some(MessageId::Str("x1".into())));
        assert_eq!(request.route, "echo");
        assert_eq!(request.event, "ping");
        assert_eq!(request.data, Some(json!({})));
    }

    #[test]
    fn test_decode_integer_id_and_list_data() {
        let request =
            Request::decode(br#"{"id": 7, "route": "r", "event": "e", "data": [1, 2]}"#).unwrap();
        assert_eq!(request.id, Some(MessageId::Int(7)));
        assert_eq!(request.data, Some(json!([1, 2])));
    }

    #[test]
    fn test_decode_explicit_null_data() {
        let request = Request::decode(br#"{"route": "r", "event": "e", "data": null}"#).unwrap();
        assert_eq!(request.id, None);
        assert_eq!(request.data, None);
    }

    #[test]
    fn test_decode_not_json_is_fatal() {
        let err = Request::decode(b"not json").unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_decode_missing_event_is_fatal() {
        let err = Request::decode(br#"{"id": 1, "route": "echo"}"#).unwrap_err();
        assert!(err.partial.is_none());
    }

    #[test]
    fn test_decode_scalar_data_is_recoverable() {
        let err = Request::decode(br#"{"id": 3, "route": "echo", "event": "ping", "data": "hi"}"#)
            .unwrap_err();
        let partial = err.partial.clone().unwrap();
        assert_eq!(partial.id, Some(MessageId::Int(3)));
        assert_eq!(partial.route, "echo");
        assert_eq!(partial.event, "ping");
        assert!(err.message.contains("a string"));
    }

    #[test]
    fn test_decode_bad_id_keeps_envelope() {
        let err =
            Request::decode(br#"{"id": true, "route": "echo", "event": "ping"}"#).unwrap_err();
        let partial = err.partial.unwrap();
        assert_eq!(partial.id, None);
        assert_eq!(partial.event, "ping");
    }

    #[test]
    fn test_decode_id_above_i64_range() {
        let request =
            Request::decode(br#"{"id": 18446744073709551615, "route": "echo", "event": "ping"}"#)
                .unwrap();
        assert_eq!(request.id, Some(MessageId::UInt(u64::MAX)));
        assert_eq!(request.id, Some(MessageId::from(u64::MAX)));

        let response = Response::success(&request, json!({}));
        let value: Value = serde_json::from_str(&response.encode().unwrap()).unwrap();
        assert_eq!(value["id"], json!(18446744073709551615_u64));
    }

    #[test]
    fn test_small_unsigned_id_is_int() {
        assert_eq!(MessageId::from(7_u64), MessageId::Int(7));
        assert_eq!(MessageId::from(u64::MAX).to_string(), "18446744073709551615");
    }

    #[test]
    fn test_decode_fractional_id_names_the_field() {
        let err =
            Request::decode(br#"{"id": 1.5, "route": "echo", "event": "ping"}"#).unwrap_err();
        assert!(err.message.starts_with("id must be a string or an integer"));
        assert!(err.message.contains("a number"));
        assert_eq!(err.partial.unwrap().id, None);
    }

    #[test]
    fn test_request_round_trip() {
        let request = Request::new("echo", "user")
            .id(12341234_i64)
            .data(json!({"user_id": 113}));
        let encoded = request.encode().unwrap();
        assert_eq!(Request::decode(encoded.as_bytes()).unwrap(), request);
    }

    #[test]
    fn test_response_round_trip() {
        let request = Request::new("echo", "ping").id("05.08.2024");
        let response = Response::error(&request, "boom");
        let encoded = response.encode().unwrap();
        assert!(response.is_error());
        assert_eq!(Response::decode(encoded.as_bytes()).unwrap(), response);
    }

    #[test]
    fn test_response_serializes_null_error() {
        let request = Request::new("echo", "ping").id("x1");
        let response = Response::success(&request, json!({"data": "Pong"}));
        let value: Value = serde_json::from_str(&response.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "x1",
                "event": "ping",
                "route": "echo",
                "data": {"data": "Pong"},
                "error": null
            })
        );
    }

    #[test]
    fn test_response_without_id_serializes_null() {
        let response = Response::success(&Request::new("echo", "ping"), json!({}));
        let json = response.encode().unwrap();
        assert!(json.starts_with(r#"{"id":null,"event":"ping""#));
    }
}
