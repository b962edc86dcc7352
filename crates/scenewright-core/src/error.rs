//! Structured error payload carried by failed responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// Error category, stored under `details.kind` so callers can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required parameter was absent.
    MissingParam,
    /// A parameter was present but malformed.
    InvalidParam,
    /// No handler is registered for the method name.
    UnknownMethod,
    /// The addressed node, resource, singleton or file does not exist.
    NotFound,
    /// A policy guard refused the operation.
    Blocked,
    /// The operation is illegal in the current state (e.g. nested batches).
    InvalidState,
    /// The operation ran and failed.
    Failed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MissingParam => "missing_param",
            ErrorKind::InvalidParam => "invalid_param",
            ErrorKind::UnknownMethod => "unknown_method",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Blocked => "blocked",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Failed => "failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ message, details }` as sent in a failed [`Response`](crate::Response).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl RemoteError {
    /// Create an error of `kind` with additional detail fields.
    ///
    /// `extra` must be a JSON object; anything else is ignored.
    pub fn new(kind: ErrorKind, message: impl Into<String>, extra: Value) -> Self {
        let mut details = Map::new();
        details.insert("kind".into(), json!(kind));
        if let Value::Object(extra) = extra {
            details.extend(extra);
        }
        Self {
            message: message.into(),
            details,
        }
    }

    pub fn missing_param(name: &str) -> Self {
        Self::new(
            ErrorKind::MissingParam,
            format!("missing required parameter '{name}'"),
            json!({ "param": name }),
        )
    }

    pub fn invalid_param(name: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidParam,
            format!("invalid parameter '{name}': {reason}"),
            json!({ "param": name }),
        )
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(
            ErrorKind::UnknownMethod,
            format!("unknown method '{method}'"),
            json!({ "method": method }),
        )
    }

    /// `what` names the kind of thing ("node", "singleton", ...); `identifier`
    /// is whatever the caller used to address it.
    pub fn not_found(what: &str, identifier: impl Into<Value>) -> Self {
        let identifier = identifier.into();
        let shown = match &identifier {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::new(
            ErrorKind::NotFound,
            format!("{what} not found: {shown}"),
            json!({ "target": what, "identifier": identifier }),
        )
    }

    /// A policy refusal naming the guard that tripped.
    pub fn blocked(subject: &str, guard: &str) -> Self {
        Self::new(
            ErrorKind::Blocked,
            format!("'{subject}' is blocked; enable {guard} to allow it"),
            json!({ "subject": subject, "guard": guard }),
        )
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message, Value::Null)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failed, message, Value::Null)
    }

    /// Attach one more detail field.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// The category recorded in `details.kind`, if it is a known one.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.details
            .get("kind")
            .and_then(|k| serde_json::from_value(k.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_distinct() {
        let errors = [
            RemoteError::missing_param("path"),
            RemoteError::unknown_method("frobnicate"),
            RemoteError::not_found("node", "Player/Gun"),
            RemoteError::blocked("OS", "unsafe_mode"),
        ];
        let kinds: Vec<_> = errors.iter().map(|e| e.kind().unwrap()).collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::MissingParam,
                ErrorKind::UnknownMethod,
                ErrorKind::NotFound,
                ErrorKind::Blocked
            ]
        );
    }

    #[test]
    fn not_found_carries_identifier() {
        let err = RemoteError::not_found("node", 42u64);
        assert_eq!(err.details["identifier"], json!(42));
        assert_eq!(err.message, "node not found: 42");
    }

    #[test]
    fn blocked_names_the_guard() {
        let err = RemoteError::blocked("FileAccess", "unsafe_mode");
        assert_eq!(err.details["guard"], json!("unsafe_mode"));
    }

    #[test]
    fn unknown_kind_is_none() {
        let err: RemoteError =
            serde_json::from_value(json!({"message": "x", "details": {"kind": "weird"}})).unwrap();
        assert_eq!(err.kind(), None);
    }
}
