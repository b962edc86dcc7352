//! Runtime values held by the editor host.
//!
//! [`Variant::to_json`] is the total, lossy conversion used for responses: it
//! never fails, and anything without a natural JSON shape falls back to its
//! textual form. [`Variant::to_tagged_json`] / [`Variant::from_json`] are the
//! lossless pair used when values are stored in scene documents or supplied as
//! request parameters.

use serde_json::{Map, Number, Value, json};
use std::fmt;

const TYPE_KEY: &str = "@type";

/// Reference to a live host object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub class: String,
    pub id: u64,
}

/// A dynamically typed host value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    NodePath(String),
    Vector2(f64, f64),
    Vector3(f64, f64, f64),
    Color(f64, f64, f64, f64),
    Bytes(Vec<u8>),
    Array(Vec<Variant>),
    /// Insertion-ordered; keys need not be strings.
    Dictionary(Vec<(Variant, Variant)>),
    Object(ObjectRef),
}

impl Variant {
    /// Type name as reported by `inspect_*`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Nil => "Nil",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Float(_) => "float",
            Variant::String(_) => "String",
            Variant::NodePath(_) => "NodePath",
            Variant::Vector2(..) => "Vector2",
            Variant::Vector3(..) => "Vector3",
            Variant::Color(..) => "Color",
            Variant::Bytes(_) => "PackedByteArray",
            Variant::Array(_) => "Array",
            Variant::Dictionary(_) => "Dictionary",
            Variant::Object(_) => "Object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) | Variant::NodePath(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON-safe rendering for responses. Never fails.
    pub fn to_json(&self) -> Value {
        match self {
            Variant::Nil => Value::Null,
            Variant::Bool(b) => Value::Bool(*b),
            Variant::Int(i) => Value::from(*i),
            Variant::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(self.to_string())),
            Variant::String(s) | Variant::NodePath(s) => Value::String(s.clone()),
            Variant::Array(items) => Value::Array(items.iter().map(Variant::to_json).collect()),
            Variant::Dictionary(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = match key {
                        Variant::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    map.insert(key, value.to_json());
                }
                Value::Object(map)
            }
            Variant::Vector2(..)
            | Variant::Vector3(..)
            | Variant::Color(..)
            | Variant::Bytes(_)
            | Variant::Object(_) => Value::String(self.to_string()),
        }
    }

    /// Lossless rendering; typed values become `{"@type": ..}` objects.
    pub fn to_tagged_json(&self) -> Value {
        match self {
            Variant::Float(f) if !f.is_finite() => {
                json!({ TYPE_KEY: "float", "repr": self.to_string() })
            }
            Variant::NodePath(p) => json!({ TYPE_KEY: "NodePath", "path": p }),
            Variant::Vector2(x, y) => json!({ TYPE_KEY: "Vector2", "x": x, "y": y }),
            Variant::Vector3(x, y, z) => json!({ TYPE_KEY: "Vector3", "x": x, "y": y, "z": z }),
            Variant::Color(r, g, b, a) => {
                json!({ TYPE_KEY: "Color", "r": r, "g": g, "b": b, "a": a })
            }
            Variant::Bytes(data) => json!({ TYPE_KEY: "PackedByteArray", "data": data }),
            Variant::Object(obj) => json!({ TYPE_KEY: "Object", "class": obj.class, "id": obj.id }),
            Variant::Array(items) => {
                Value::Array(items.iter().map(Variant::to_tagged_json).collect())
            }
            Variant::Dictionary(entries) => {
                if entries.iter().all(|(k, _)| matches!(k, Variant::String(_))) {
                    let map = entries
                        .iter()
                        .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v.to_tagged_json())))
                        .collect();
                    Value::Object(map)
                } else {
                    let pairs: Vec<Value> = entries
                        .iter()
                        .map(|(k, v)| json!([k.to_tagged_json(), v.to_tagged_json()]))
                        .collect();
                    json!({ TYPE_KEY: "Dictionary", "entries": pairs })
                }
            }
            other => other.to_json(),
        }
    }

    /// Inverse of [`Variant::to_tagged_json`]; plain JSON maps onto the
    /// obvious variants.
    pub fn from_json(value: &Value) -> Variant {
        match value {
            Value::Null => Variant::Nil,
            Value::Bool(b) => Variant::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Variant::Int(i),
                None => Variant::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Variant::String(s.clone()),
            Value::Array(items) => Variant::Array(items.iter().map(Variant::from_json).collect()),
            Value::Object(map) => match map.get(TYPE_KEY).and_then(Value::as_str) {
                Some(tag) => from_tagged(tag, map).unwrap_or_else(|| plain_dictionary(map)),
                None => plain_dictionary(map),
            },
        }
    }
}

fn plain_dictionary(map: &Map<String, Value>) -> Variant {
    Variant::Dictionary(
        map.iter()
            .map(|(k, v)| (Variant::String(k.clone()), Variant::from_json(v)))
            .collect(),
    )
}

fn from_tagged(tag: &str, map: &Map<String, Value>) -> Option<Variant> {
    let num = |key: &str| map.get(key).and_then(Value::as_f64);
    let variant = match tag {
        "float" => Variant::Float(map.get("repr")?.as_str()?.parse().ok()?),
        "NodePath" => Variant::NodePath(map.get("path")?.as_str()?.to_string()),
        "Vector2" => Variant::Vector2(num("x")?, num("y")?),
        "Vector3" => Variant::Vector3(num("x")?, num("y")?, num("z")?),
        "Color" => Variant::Color(num("r")?, num("g")?, num("b")?, num("a").unwrap_or(1.0)),
        "PackedByteArray" => Variant::Bytes(
            map.get("data")?
                .as_array()?
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()?,
        ),
        "Object" => Variant::Object(ObjectRef {
            class: map.get("class")?.as_str()?.to_string(),
            id: map.get("id")?.as_u64()?,
        }),
        "Dictionary" => Variant::Dictionary(
            map.get("entries")?
                .as_array()?
                .iter()
                .map(|pair| {
                    let pair = pair.as_array()?;
                    match pair.as_slice() {
                        [k, v] => Some((Variant::from_json(k), Variant::from_json(v))),
                        _ => None,
                    }
                })
                .collect::<Option<Vec<_>>>()?,
        ),
        _ => return None,
    };
    Some(variant)
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => f.write_str("null"),
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Int(i) => write!(f, "{i}"),
            Variant::Float(x) => write!(f, "{x}"),
            Variant::String(s) | Variant::NodePath(s) => f.write_str(s),
            Variant::Vector2(x, y) => write!(f, "({x}, {y})"),
            Variant::Vector3(x, y, z) => write!(f, "({x}, {y}, {z})"),
            Variant::Color(r, g, b, a) => write!(f, "({r}, {g}, {b}, {a})"),
            Variant::Bytes(data) => write!(f, "PackedByteArray({} bytes)", data.len()),
            Variant::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Variant::Dictionary(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Variant::Object(obj) => write!(f, "<{}#{}>", obj.class, obj.id),
        }
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl From<i64> for Variant {
    fn from(i: i64) -> Self {
        Variant::Int(i)
    }
}

impl From<f64> for Variant {
    fn from(x: f64) -> Self {
        Variant::Float(x)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::String(s.to_string())
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::String(s)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(items: Vec<Variant>) -> Self {
        Variant::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_map_directly() {
        assert_eq!(Variant::Nil.to_json(), Value::Null);
        assert_eq!(Variant::Int(-3).to_json(), json!(-3));
        assert_eq!(Variant::Float(0.5).to_json(), json!(0.5));
        assert_eq!(Variant::from("hi").to_json(), json!("hi"));
    }

    #[test]
    fn unsafe_values_fall_back_to_text() {
        assert_eq!(Variant::Float(f64::NAN).to_json(), json!("NaN"));
        assert_eq!(Variant::Float(f64::INFINITY).to_json(), json!("inf"));
        assert_eq!(Variant::Vector2(1.0, 2.5).to_json(), json!("(1, 2.5)"));
        let obj = Variant::Object(ObjectRef {
            class: "Node2D".into(),
            id: 7,
        });
        assert_eq!(obj.to_json(), json!("<Node2D#7>"));
    }

    #[test]
    fn dictionary_keys_are_stringified() {
        let dict = Variant::Dictionary(vec![
            (Variant::Int(1), Variant::from("one")),
            (Variant::from("nested"), Variant::Array(vec![Variant::Bool(true)])),
        ]);
        assert_eq!(dict.to_json(), json!({"1": "one", "nested": [true]}));
    }

    #[test]
    fn tagged_form_is_lossless() {
        let values = [
            Variant::Vector3(1.0, 2.0, 3.0),
            Variant::Color(1.0, 0.5, 0.0, 1.0),
            Variant::NodePath("Player/Sprite".into()),
            Variant::Bytes(vec![0, 255]),
            Variant::Float(f64::NEG_INFINITY),
            Variant::Dictionary(vec![(Variant::Int(2), Variant::Vector2(0.0, 1.0))]),
        ];
        for value in values {
            assert_eq!(Variant::from_json(&value.to_tagged_json()), value);
        }
    }

    #[test]
    fn unknown_tag_stays_a_dictionary() {
        let v = Variant::from_json(&json!({"@type": "Quaternion", "w": 1}));
        assert!(matches!(v, Variant::Dictionary(ref e) if e.len() == 2));
    }
}
