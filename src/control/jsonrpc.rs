//! JSON-RPC 2.0 message types
//!
//! Only the subset the control channel needs: requests in, one response out
//! per request line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes used on the control channel
pub mod codes {
    /// Line is not valid JSON
    pub const PARSE_ERROR: i64 = -32700;
    /// JSON is not a request object
    pub const INVALID_REQUEST: i64 = -32600;
    /// No such method
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Params could not be decoded, or configuration is invalid
    pub const INVALID_PARAMS: i64 = -32602;
    /// Anything else
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Requested camera is unknown
    pub const NOT_FOUND: i64 = -32001;
}

/// Request id, echoed back verbatim
///
/// Numbers keep their JSON form, so `1.5` or values past `i64::MAX` survive
/// the round trip. Anything else lands in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(serde_json::Number),
    String(String),
    #[default]
    Null,
    Other(Value),
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n.into())
    }
}

/// Request object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_owned()
}

impl Request {
    /// Build a call
    pub fn call(id: Id, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Id to echo back; null when absent
    pub fn response_id(&self) -> Id {
        self.id.clone().unwrap_or_default()
    }
}

/// Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response object; exactly one of `result` or `error` is present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Successful result
    pub fn success(id: Id, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error result
    pub fn fail(id: Id, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Error result from a crate error, without collaborator detail
    pub fn from_error(id: Id, err: &Error) -> Self {
        Self::fail(id, err.rpc_code(), err.public_message())
    }

    /// `-32700` with a null id
    pub fn parse_error() -> Self {
        Self::fail(Id::Null, codes::PARSE_ERROR, "Parse error")
    }

    /// Serialize as one line, newline included
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            // Only reachable with non-string map keys inside `result`.
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                format!(
                    "{{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{{\"code\":{},\"message\":\"Internal error\"}}}}\n",
                    codes::INTERNAL_ERROR
                )
            }
        }
    }
}

/// Outcome of decoding one line
#[derive(Debug)]
pub enum Incoming {
    /// A well-formed request
    Request(Request),
    /// Valid JSON that is not a request; carries the id if one was found
    Invalid(Id),
    /// Not JSON
    Malformed,
}

/// Decode one control line
pub fn decode(line: &str) -> Incoming {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Incoming::Malformed,
    };

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<Id>(id.clone()).ok())
        .unwrap_or_default();

    match serde_json::from_value::<Request>(value) {
        Ok(request) if request.jsonrpc == JSONRPC_VERSION => Incoming::Request(request),
        _ => Incoming::Invalid(id),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_request() {
        let incoming = decode(r#"{"jsonrpc":"2.0","id":7,"method":"health"}"#);

        match incoming {
            Incoming::Request(req) => {
                assert_eq!(req.method, "health");
                assert_eq!(req.id, Some(Id::from(7)));
                assert!(req.params.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_version_defaults() {
        assert!(matches!(
            decode(r#"{"id":"a","method":"health"}"#),
            Incoming::Request(_)
        ));
    }

    #[test]
    fn test_decode_invalid_request_keeps_id() {
        match decode(r#"{"jsonrpc":"2.0","id":"abc","params":{}}"#) {
            Incoming::Invalid(id) => assert_eq!(id, Id::String("abc".into())),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(decode("[1,2,3]"), Incoming::Invalid(Id::Null)));
        assert!(matches!(
            decode(r#"{"jsonrpc":"1.0","id":1,"method":"health"}"#),
            Incoming::Invalid(Id::Number(n)) if n.as_i64() == Some(1)
        ));
    }

    #[test]
    fn test_any_id_is_echoed() {
        for raw in ["1.5", "18446744073709551615", "-0.25e3", "{\"k\":[1]}", "true"] {
            let line = format!(r#"{{"jsonrpc":"2.0","id":{},"method":"health"}}"#, raw);
            let request = match decode(&line) {
                Incoming::Request(request) => request,
                other => panic!("{} not accepted: {:?}", raw, other),
            };

            let echoed: Value =
                serde_json::from_str(&Response::success(request.response_id(), json!([])).to_line())
                    .unwrap();
            let sent: Value = serde_json::from_str(raw).unwrap();
            assert_eq!(echoed["id"], sent);
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("{not json"), Incoming::Malformed));
        assert!(matches!(decode(""), Incoming::Malformed));
    }

    #[test]
    fn test_parse_error_line() {
        assert_eq!(
            Response::parse_error().to_line(),
            "{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{\"code\":-32700,\"message\":\"Parse error\"}}\n"
        );
    }

    #[test]
    fn test_success_shape() {
        let line = Response::success(Id::from(1), json!({"status": "ok"})).to_line();
        let value: Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["status"], "ok");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_from_error_hides_detail() {
        let err = Error::collaborator(
            crate::error::Component::Native,
            "IOTC_Initialize2 returned -3 at /opt/lib.amd64",
        );
        let response = Response::from_error(Id::from(2), &err);
        let error = response.error.unwrap();

        assert_eq!(error.code, codes::INTERNAL_ERROR);
        assert!(!error.message.contains("IOTC"));
    }
}
