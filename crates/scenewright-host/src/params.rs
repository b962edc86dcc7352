//! Typed access to request parameters.

use crate::objects::Target;
use scenewright_core::{ProjectPath, RemoteError, Variant};
use serde_json::{Map, Value};

/// Borrowed view of a request's `params` object.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    /// `null` is treated as an empty object.
    pub fn new(value: &'a Value) -> Result<Self, RemoteError> {
        static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
        match value {
            Value::Object(map) => Ok(Self { map }),
            Value::Null => Ok(Self {
                map: EMPTY.get_or_init(Map::new),
            }),
            _ => Err(RemoteError::invalid_param("params", "expected an object")),
        }
    }

    pub fn opt_value(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    pub fn value(&self, name: &str) -> Result<&'a Value, RemoteError> {
        self.opt_value(name)
            .ok_or_else(|| RemoteError::missing_param(name))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&'a str>, RemoteError> {
        match self.opt_value(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(RemoteError::invalid_param(name, "expected a string")),
        }
    }

    pub fn str(&self, name: &str) -> Result<&'a str, RemoteError> {
        self.opt_str(name)?
            .ok_or_else(|| RemoteError::missing_param(name))
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, RemoteError> {
        match self.opt_value(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(RemoteError::invalid_param(name, "expected a boolean")),
        }
    }

    pub fn opt_path(&self, name: &str) -> Result<Option<ProjectPath>, RemoteError> {
        self.opt_str(name)?
            .map(|raw| {
                raw.parse::<ProjectPath>()
                    .map_err(|e| RemoteError::invalid_param(name, e))
            })
            .transpose()
    }

    pub fn path(&self, name: &str) -> Result<ProjectPath, RemoteError> {
        self.opt_path(name)?
            .ok_or_else(|| RemoteError::missing_param(name))
    }

    /// A runtime value. An explicit `null` is [`Variant::Nil`]; only absence
    /// is missing.
    pub fn variant(&self, name: &str) -> Result<Variant, RemoteError> {
        self.map
            .get(name)
            .map(Variant::from_json)
            .ok_or_else(|| RemoteError::missing_param(name))
    }

    pub fn target(&self) -> Result<Target, RemoteError> {
        Target::from_json(self.value("target")?)
    }

    /// Positional call arguments; absent means none.
    pub fn args(&self) -> Result<Vec<Variant>, RemoteError> {
        match self.opt_value("args") {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.iter().map(Variant::from_json).collect()),
            Some(_) => Err(RemoteError::invalid_param("args", "expected an array")),
        }
    }

    /// Property map for new nodes.
    pub fn properties(&self) -> Result<Vec<(String, Variant)>, RemoteError> {
        match self.opt_value("properties") {
            None => Ok(Vec::new()),
            Some(Value::Object(map)) => Ok(map
                .iter()
                .map(|(k, v)| (k.clone(), Variant::from_json(v)))
                .collect()),
            Some(_) => Err(RemoteError::invalid_param("properties", "expected an object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenewright_core::ErrorKind;
    use serde_json::json;

    #[test]
    fn missing_and_invalid_are_distinct() {
        let raw = json!({"name": 3, "flag": true});
        let params = Params::new(&raw).unwrap();
        assert_eq!(
            params.str("absent").unwrap_err().kind(),
            Some(ErrorKind::MissingParam)
        );
        assert_eq!(
            params.str("name").unwrap_err().kind(),
            Some(ErrorKind::InvalidParam)
        );
        assert!(params.bool_or("flag", false).unwrap());
        assert!(!params.bool_or("other", false).unwrap());
    }

    #[test]
    fn paths_are_confined_to_the_project() {
        let raw = json!({"good": "res://a/b.txt", "bad": "../etc/passwd"});
        let params = Params::new(&raw).unwrap();
        assert_eq!(params.path("good").unwrap().relative(), "a/b.txt");
        assert_eq!(
            params.path("bad").unwrap_err().kind(),
            Some(ErrorKind::InvalidParam)
        );
    }

    #[test]
    fn explicit_null_is_nil_but_absence_is_missing() {
        let raw = json!({"value": null});
        let params = Params::new(&raw).unwrap();
        assert_eq!(params.variant("value").unwrap(), Variant::Nil);
        assert_eq!(
            params.variant("other").unwrap_err().kind(),
            Some(ErrorKind::MissingParam)
        );
    }

    #[test]
    fn null_params_are_empty() {
        let params = Params::new(&Value::Null).unwrap();
        assert!(params.args().unwrap().is_empty());
        assert!(Params::new(&json!([1])).is_err());
    }
}
