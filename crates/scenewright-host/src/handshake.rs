//! First-message authentication.

use scenewright_core::HelloRequest;
use serde_json::Value;

/// Checks the first frame of a connection against the configured token.
#[derive(Debug, Clone)]
pub struct HandshakeGate {
    token: String,
}

impl HandshakeGate {
    /// An empty token accepts any `hello`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.token.is_empty()
    }

    /// `Err` carries the reason sent back in `hello_error`.
    pub fn check(&self, first: &Value) -> Result<(), String> {
        if first.get("type").and_then(Value::as_str) != Some("hello") {
            return Err("expected hello as the first message".into());
        }
        let HelloRequest::Hello { token } = serde_json::from_value(first.clone())
            .map_err(|_| "hello requires a string token".to_string())?;
        if self.is_open() || tokens_match(&self.token, &token) {
            Ok(())
        } else {
            Err("invalid token".into())
        }
    }
}

/// Comparison time depends only on the lengths.
fn tokens_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_must_match() {
        let gate = HandshakeGate::new("s3cret");
        assert!(gate.check(&json!({"type": "hello", "token": "s3cret"})).is_ok());
        assert_eq!(
            gate.check(&json!({"type": "hello", "token": "guess"})),
            Err("invalid token".into())
        );
        assert!(gate.check(&json!({"type": "hello"})).is_err());
    }

    #[test]
    fn non_hello_first_message_is_rejected() {
        let gate = HandshakeGate::new("");
        assert!(gate.check(&json!({"id": 1, "method": "ping", "params": {}})).is_err());
        assert!(gate.check(&json!({"type": "hello", "token": "anything"})).is_ok());
    }
}
