//! Protocol messages.
//!
//! The handshake frames carry a `type` tag; everything after the handshake is
//! a request/response pair correlated by an integer `id`.

use crate::{Capabilities, RemoteError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First (and only legal unauthenticated) frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HelloRequest {
    Hello { token: String },
}

impl HelloRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self::Hello {
            token: token.into(),
        }
    }
}

/// Handshake outcome sent by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerHello {
    /// The token matched; requests may follow.
    HelloOk { capabilities: Capabilities },
    /// The handshake was refused; the editor closes the connection.
    HelloError { error: String },
}

/// An application request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// Reply to exactly one [`Request`].
///
/// On the wire this is either `{"id","ok":true,"result"}` or
/// `{"id","ok":false,"error":{"message","details"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: RemoteError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }

    /// Build a response from a handler outcome.
    pub fn from_outcome(id: u64, outcome: Result<Value, RemoteError>) -> Self {
        match outcome {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(id, error),
        }
    }

    /// Collapse into the handler outcome it was built from.
    ///
    /// A failure without an error payload still comes back as an error so a
    /// misbehaving peer cannot make a failure look like success.
    pub fn into_result(self) -> Result<Value, RemoteError> {
        if self.ok {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| RemoteError::failed("response reported failure without an error")))
        }
    }
}

/// Any frame the editor may send to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Hello(ServerHello),
    Response(Response),
}

/// Any frame the client may send to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Hello(HelloRequest),
    Request(Request),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hello_wire_shape() {
        let hello = serde_json::to_value(HelloRequest::new("s3cret")).unwrap();
        assert_eq!(hello, json!({"type": "hello", "token": "s3cret"}));

        let refused: ServerHello =
            serde_json::from_value(json!({"type": "hello_error", "error": "bad token"})).unwrap();
        assert_eq!(
            refused,
            ServerHello::HelloError {
                error: "bad token".into()
            }
        );
    }

    #[test]
    fn response_wire_shapes() {
        let ok = serde_json::to_value(Response::success(3, json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"id": 3, "ok": true, "result": {"a": 1}}));

        let err = serde_json::to_value(Response::failure(4, RemoteError::unknown_method("nope")))
            .unwrap();
        assert_eq!(err["ok"], json!(false));
        assert_eq!(err["error"]["details"]["kind"], json!("unknown_method"));
        assert!(err.get("result").is_none());
    }

    #[test]
    fn null_result_is_still_success() {
        let resp: Response = serde_json::from_value(json!({"id": 1, "ok": true, "result": null}))
            .unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn failure_without_payload_is_an_error() {
        let resp: Response = serde_json::from_value(json!({"id": 1, "ok": false})).unwrap();
        assert!(resp.into_result().is_err());
    }

    #[test]
    fn server_frames_are_distinguished() {
        let hello: ServerFrame = serde_json::from_value(json!({
            "type": "hello_ok",
            "capabilities": {"protocol": "1", "plugin_version": "0.1.0", "methods": []}
        }))
        .unwrap();
        assert!(matches!(hello, ServerFrame::Hello(ServerHello::HelloOk { .. })));

        let resp: ServerFrame =
            serde_json::from_value(json!({"id": 9, "ok": true, "result": 1})).unwrap();
        assert!(matches!(resp, ServerFrame::Response(Response { id: 9, .. })));
    }

    #[test]
    fn request_params_default_to_object() {
        let frame: ClientFrame = serde_json::from_value(json!({"id": 1, "method": "ping"})).unwrap();
        match frame {
            ClientFrame::Request(req) => assert!(req.params.is_object()),
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
