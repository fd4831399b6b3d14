//! Line protocol envelopes.
//!
//! Every message is one JSON object on one line:
//!
//! ```text
//! -> {"id": 1, "method": "list-chats", "params": {"filter": "groups"}}
//! <- {"id": 1, "result": [...]}
//! <- {"id": 1, "error": {"code": "not-found", "message": "..."}}
//! ```
//!
//! A reply holds exactly one of `result` and `error`. [`ToolReply`] encodes that in its type,
//! and decoding rejects objects that carry both or neither.

use std::fmt;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::ToolError;

/// Correlation token chosen by the caller and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

/// A decoded request line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub id: RequestId,
    pub method: String,
    #[serde(default, deserialize_with = "params_object")]
    pub params: Map<String, Value>,
}

fn params_object<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(D::Error::custom(format!(
            "params must be an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A request line that could not be decoded. `id` is set when one could still be read from
/// the line, in which case the caller gets a `malformed-request` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub id: Option<RequestId>,
    pub message: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DecodeError {}

pub fn decode_request(line: &str) -> Result<ToolCall, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError {
        id: None,
        message: format!("invalid JSON: {e}"),
    })?;
    let Value::Object(object) = &value else {
        return Err(DecodeError {
            id: None,
            message: format!("request must be an object, got {}", json_kind(&value)),
        });
    };
    let id = object
        .get("id")
        .and_then(|raw| RequestId::deserialize(raw).ok());

    let call: ToolCall = serde_json::from_value(value).map_err(|e| DecodeError {
        id: id.clone(),
        message: format!("invalid request: {e}"),
    })?;
    if call.method.trim().is_empty() {
        return Err(DecodeError {
            id,
            message: "method must not be empty".to_string(),
        });
    }
    Ok(call)
}

/// What a tool call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(ToolError),
}

/// A reply line.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    pub id: RequestId,
    pub outcome: Outcome,
}

impl ToolReply {
    pub fn result(id: RequestId, value: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(value),
        }
    }

    pub fn error(id: RequestId, error: ToolError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn from_result(id: RequestId, result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(value) => Self::result(id, value),
            Err(error) => Self::error(id, error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

impl Serialize for ToolReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("id", &self.id)?;
        match &self.outcome {
            Outcome::Result(value) => map.serialize_entry("result", value)?,
            Outcome::Error(error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReply {
    id: RequestId,
    // A present `null` result is a valid result, so it must stay distinguishable from a
    // missing one.
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ToolError>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl<'de> Deserialize<'de> for ToolReply {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawReply::deserialize(deserializer)?;
        let outcome = match (raw.result, raw.error) {
            (Some(value), None) => Outcome::Result(value),
            (None, Some(error)) => Outcome::Error(error),
            (Some(_), Some(_)) => {
                return Err(D::Error::custom("reply carries both result and error"))
            }
            (None, None) => return Err(D::Error::custom("reply carries neither result nor error")),
        };
        Ok(ToolReply {
            id: raw.id,
            outcome,
        })
    }
}

pub fn encode_reply(reply: &ToolReply) -> Result<String, serde_json::Error> {
    serde_json::to_string(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_decode_request() {
        let call =
            decode_request(r#"{"id":"1","method":"list-chats","params":{"filter":"groups"}}"#)
                .unwrap();
        assert_eq!(call.id, RequestId::from("1"));
        assert_eq!(call.method, "list-chats");
        assert_eq!(call.params.get("filter"), Some(&json!("groups")));
    }

    #[test]
    fn test_decode_numeric_id_and_missing_params() {
        let call = decode_request(r#"{"id":7,"method":"status"}"#).unwrap();
        assert_eq!(call.id, RequestId::Number(7));
        assert!(call.params.is_empty());

        let call = decode_request(r#"{"id":8,"method":"status","params":null}"#).unwrap();
        assert!(call.params.is_empty());
    }

    #[test]
    fn test_decode_failure_without_id() {
        let err = decode_request("not json").unwrap_err();
        assert_eq!(err.id, None);

        let err = decode_request("[1,2]").unwrap_err();
        assert_eq!(err.id, None);

        let err = decode_request(r#"{"method":"status"}"#).unwrap_err();
        assert_eq!(err.id, None);
    }

    #[test]
    fn test_decode_failure_keeps_id() {
        let err = decode_request(r#"{"id":"9","params":{}}"#).unwrap_err();
        assert_eq!(err.id, Some(RequestId::from("9")));

        let err = decode_request(r#"{"id":3,"method":"search","params":"deploy"}"#).unwrap_err();
        assert_eq!(err.id, Some(RequestId::Number(3)));
        assert!(err.message.contains("params must be an object"));

        let err = decode_request(r#"{"id":4,"method":"  "}"#).unwrap_err();
        assert_eq!(err.id, Some(RequestId::Number(4)));
    }

    #[test]
    fn test_reply_wire_shape() {
        let ok = ToolReply::result(RequestId::from("1"), json!([{"name": "Team"}]));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": "1", "result": [{"name": "Team"}]})
        );

        let err = ToolReply::error(RequestId::Number(2), ToolError::not_found("no such chat"));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"id": 2, "error": {"code": "not-found", "message": "no such chat"}})
        );
    }

    #[test]
    fn test_reply_round_trip_with_null_result() {
        let reply = ToolReply::result(RequestId::from("x"), Value::Null);
        let line = encode_reply(&reply).unwrap();
        assert_eq!(line, r#"{"id":"x","result":null}"#);
        assert_eq!(serde_json::from_str::<ToolReply>(&line).unwrap(), reply);
    }

    #[test]
    fn test_reply_requires_exactly_one_outcome() {
        let both = r#"{"id":1,"result":true,"error":{"code":"not-found","message":"m"}}"#;
        assert!(serde_json::from_str::<ToolReply>(both).is_err());

        let neither = r#"{"id":1}"#;
        assert!(serde_json::from_str::<ToolReply>(neither).is_err());

        let error = r#"{"id":1,"error":{"code":"unknown-tool","message":"m"}}"#;
        let reply: ToolReply = serde_json::from_str(error).unwrap();
        assert!(reply.is_error());
        assert!(matches!(
            reply.outcome,
            Outcome::Error(ToolError {
                code: ErrorCode::UnknownTool,
                ..
            })
        ));
    }
}
