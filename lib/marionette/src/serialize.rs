//! Maps engine-native values to JSON-safe values and back.
//!
//! The JSON shapes are part of the wire contract: vectors become fixed-length
//! arrays, colors become `{r,g,b,a}`, byte arrays become base64 strings, and
//! resources travel as their resource path. Decoding is directed by the
//! receiving property's declared [`ValueKind`]; without one, JSON maps onto
//! the natural scalar/list/dict variants.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::{json, Map, Number, Value as Json};
use strand::value::{Value, ValueKind};

/// Serializes an engine value into its JSON wire form. Total: every variant
/// has a representation, with the string form as the documented fallback.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Bool(v) => Json::Bool(*v),
        Value::Int(v) => Json::from(*v),
        Value::Float(v) => float_json(*v),
        Value::Str(v) => Json::String(v.clone()),
        Value::Vector2(v) => json!([v[0], v[1]]),
        Value::Vector3(v) => json!([v[0], v[1], v[2]]),
        Value::Vector4(v) => json!([v[0], v[1], v[2], v[3]]),
        Value::Color { r, g, b, a } => json!({"r": r, "g": g, "b": b, "a": a}),
        Value::Rect2 { position, size } => json!({
            "position": [position[0], position[1]],
            "size": [size[0], size[1]],
        }),
        Value::Transform2D { origin, rotation } => json!({
            "origin": [origin[0], origin[1]],
            "rotation": rotation,
        }),
        Value::Basis(rows) => json!([
            [rows[0][0], rows[0][1], rows[0][2]],
            [rows[1][0], rows[1][1], rows[1][2]],
            [rows[2][0], rows[2][1], rows[2][2]],
        ]),
        Value::Quat(v) => json!([v[0], v[1], v[2], v[3]]),
        Value::Aabb { position, size } => json!({
            "position": [position[0], position[1], position[2]],
            "size": [size[0], size[1], size[2]],
        }),
        Value::NodePath(v) | Value::StringName(v) | Value::Resource(v) => Json::String(v.clone()),
        Value::Bytes(v) => Json::String(BASE64.encode(v)),
        Value::IntArray(v) => Json::Array(v.iter().map(|item| Json::from(*item)).collect()),
        Value::FloatArray(v) => Json::Array(v.iter().map(|item| float_json(*item)).collect()),
        Value::StrArray(v) => Json::Array(v.iter().map(|item| Json::String(item.clone())).collect()),
        Value::List(v) => Json::Array(v.iter().map(to_json).collect()),
        Value::Dict(v) => {
            let mut map = Map::new();
            for (key, item) in v {
                map.insert(key.clone(), to_json(item));
            }
            Json::Object(map)
        }
    }
}

/// Non-finite floats have no JSON representation; fall back to the string
/// form rather than dropping the field.
fn float_json(value: f64) -> Json {
    match Number::from_f64(value) {
        Some(number) => Json::Number(number),
        None => Json::String(value.to_string()),
    }
}

/// Decodes JSON into the engine value the target expects. `kind` comes from
/// the receiving property's type metadata; pass `None` to use the natural
/// mapping.
pub fn from_json(json: &Json, kind: Option<ValueKind>) -> Result<Value, String> {
    let kind = match kind {
        Some(kind) => kind,
        None => return Ok(natural(json)),
    };

    let fail = |json: &Json| Err(format!("Cannot decode {} as {}", json, kind.name()));

    match kind {
        ValueKind::Nil => Ok(Value::Nil),
        ValueKind::Bool => match json {
            Json::Bool(v) => Ok(Value::Bool(*v)),
            _ => fail(json),
        },
        ValueKind::Int => match json.as_i64() {
            Some(v) => Ok(Value::Int(v)),
            None => match json.as_f64() {
                Some(v) if v.fract() == 0.0 => Ok(Value::Int(v as i64)),
                _ => fail(json),
            },
        },
        ValueKind::Float => match json.as_f64() {
            Some(v) => Ok(Value::Float(v)),
            None => fail(json),
        },
        ValueKind::Str => match json {
            Json::String(v) => Ok(Value::Str(v.clone())),
            _ => fail(json),
        },
        ValueKind::Vector2 => Ok(Value::Vector2(floats::<2>(json).ok_or_else(|| bad(json, kind))?)),
        ValueKind::Vector3 => Ok(Value::Vector3(floats::<3>(json).ok_or_else(|| bad(json, kind))?)),
        ValueKind::Vector4 => Ok(Value::Vector4(floats::<4>(json).ok_or_else(|| bad(json, kind))?)),
        ValueKind::Quat => Ok(Value::Quat(floats::<4>(json).ok_or_else(|| bad(json, kind))?)),
        ValueKind::Color => {
            let obj = json.as_object().ok_or_else(|| bad(json, kind))?;
            Ok(Value::Color {
                r: field_f32(obj, "r").ok_or_else(|| bad(json, kind))?,
                g: field_f32(obj, "g").ok_or_else(|| bad(json, kind))?,
                b: field_f32(obj, "b").ok_or_else(|| bad(json, kind))?,
                a: field_f32(obj, "a").unwrap_or(1.0),
            })
        }
        ValueKind::Rect2 => {
            let obj = json.as_object().ok_or_else(|| bad(json, kind))?;
            Ok(Value::Rect2 {
                position: floats::<2>(obj.get("position").ok_or_else(|| bad(json, kind))?)
                    .ok_or_else(|| bad(json, kind))?,
                size: floats::<2>(obj.get("size").ok_or_else(|| bad(json, kind))?)
                    .ok_or_else(|| bad(json, kind))?,
            })
        }
        ValueKind::Transform2D => {
            let obj = json.as_object().ok_or_else(|| bad(json, kind))?;
            Ok(Value::Transform2D {
                origin: floats::<2>(obj.get("origin").ok_or_else(|| bad(json, kind))?)
                    .ok_or_else(|| bad(json, kind))?,
                rotation: obj.get("rotation").and_then(Json::as_f64).ok_or_else(|| bad(json, kind))? as f32,
            })
        }
        ValueKind::Basis => {
            let rows = json.as_array().filter(|rows| rows.len() == 3).ok_or_else(|| bad(json, kind))?;
            let mut basis = [[0.0f32; 3]; 3];
            for (index, row) in rows.iter().enumerate() {
                basis[index] = floats::<3>(row).ok_or_else(|| bad(json, kind))?;
            }
            Ok(Value::Basis(basis))
        }
        ValueKind::Aabb => {
            let obj = json.as_object().ok_or_else(|| bad(json, kind))?;
            Ok(Value::Aabb {
                position: floats::<3>(obj.get("position").ok_or_else(|| bad(json, kind))?)
                    .ok_or_else(|| bad(json, kind))?,
                size: floats::<3>(obj.get("size").ok_or_else(|| bad(json, kind))?)
                    .ok_or_else(|| bad(json, kind))?,
            })
        }
        ValueKind::NodePath => match json {
            Json::String(v) => Ok(Value::NodePath(v.clone())),
            _ => fail(json),
        },
        ValueKind::StringName => match json {
            Json::String(v) => Ok(Value::StringName(v.clone())),
            _ => fail(json),
        },
        ValueKind::Resource => match json {
            Json::String(v) => Ok(Value::Resource(v.clone())),
            _ => fail(json),
        },
        ValueKind::Bytes => match json {
            Json::String(v) => BASE64
                .decode(v)
                .map(Value::Bytes)
                .map_err(|_| format!("Invalid base64 payload for Bytes: {}", v)),
            _ => fail(json),
        },
        ValueKind::IntArray => {
            let items = json.as_array().ok_or_else(|| bad(json, kind))?;
            let mut array = Vec::with_capacity(items.len());
            for item in items {
                array.push(item.as_i64().ok_or_else(|| bad(json, kind))?);
            }
            Ok(Value::IntArray(array))
        }
        ValueKind::FloatArray => {
            let items = json.as_array().ok_or_else(|| bad(json, kind))?;
            let mut array = Vec::with_capacity(items.len());
            for item in items {
                array.push(item.as_f64().ok_or_else(|| bad(json, kind))?);
            }
            Ok(Value::FloatArray(array))
        }
        ValueKind::StrArray => {
            let items = json.as_array().ok_or_else(|| bad(json, kind))?;
            let mut array = Vec::with_capacity(items.len());
            for item in items {
                array.push(item.as_str().ok_or_else(|| bad(json, kind))?.to_string());
            }
            Ok(Value::StrArray(array))
        }
        ValueKind::List => {
            let items = json.as_array().ok_or_else(|| bad(json, kind))?;
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(natural(item));
            }
            Ok(Value::List(list))
        }
        ValueKind::Dict => {
            let obj = json.as_object().ok_or_else(|| bad(json, kind))?;
            let mut dict = IndexMap::new();
            for (key, item) in obj {
                dict.insert(key.clone(), natural(item));
            }
            Ok(Value::Dict(dict))
        }
    }
}

fn bad(json: &Json, kind: ValueKind) -> String {
    format!("Cannot decode {} as {}", json, kind.name())
}

/// The kind-free mapping used for method arguments and untyped properties.
pub fn natural(json: &Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(v) => Value::Bool(*v),
        Json::Number(v) => match v.as_i64() {
            Some(int) => Value::Int(int),
            None => Value::Float(v.as_f64().unwrap_or(0.0)),
        },
        Json::String(v) => Value::Str(v.clone()),
        Json::Array(items) => Value::List(items.iter().map(natural).collect()),
        Json::Object(obj) => {
            let mut dict = IndexMap::new();
            for (key, item) in obj {
                dict.insert(key.clone(), natural(item));
            }
            Value::Dict(dict)
        }
    }
}

fn floats<const N: usize>(json: &Json) -> Option<[f32; N]> {
    let items = json.as_array()?;
    if items.len() != N {
        return None;
    }

    let mut out = [0.0f32; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}

fn field_f32(obj: &Map<String, Json>, key: &str) -> Option<f32> {
    obj.get(key).and_then(Json::as_f64).map(|v| v as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let encoded = to_json(&value);
        let decoded = from_json(&encoded, Some(value.kind())).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_roundtrip_scalars() {
        roundtrip(Value::Nil);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Int(-7));
        roundtrip(Value::Float(2.5));
        roundtrip(Value::Str("Player".into()));
    }

    #[test]
    fn test_roundtrip_geometry() {
        roundtrip(Value::Vector2([400.0, 100.0]));
        roundtrip(Value::Vector3([1.0, 2.0, 3.0]));
        roundtrip(Value::Vector4([1.0, 2.0, 3.0, 4.0]));
        roundtrip(Value::Quat([0.0, 0.0, 0.0, 1.0]));
        roundtrip(Value::Rect2 {
            position: [10.0, 20.0],
            size: [64.0, 32.0],
        });
        roundtrip(Value::Transform2D {
            origin: [5.0, 6.0],
            rotation: 0.5,
        });
        roundtrip(Value::Basis([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]));
        roundtrip(Value::Aabb {
            position: [0.0, 0.0, 0.0],
            size: [2.0, 2.0, 2.0],
        });
    }

    #[test]
    fn test_roundtrip_arrays() {
        roundtrip(Value::Bytes(vec![0, 1, 2, 255]));
        roundtrip(Value::IntArray(vec![1, 2, 3]));
        roundtrip(Value::FloatArray(vec![0.5, -1.5]));
        roundtrip(Value::StrArray(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_color_shape() {
        let encoded = to_json(&Value::Color {
            r: 1.0,
            g: 0.5,
            b: 0.0,
            a: 1.0,
        });
        assert_eq!(encoded, json!({"r": 1.0, "g": 0.5, "b": 0.0, "a": 1.0}));
    }

    #[test]
    fn test_color_alpha_defaults() {
        let decoded = from_json(&json!({"r": 1.0, "g": 1.0, "b": 1.0}), Some(ValueKind::Color)).unwrap();
        match decoded {
            Value::Color { a, .. } => assert_eq!(a, 1.0),
            other => panic!("Unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_resource_serializes_to_path() {
        let encoded = to_json(&Value::Resource("res://sprites/player.png".into()));
        assert_eq!(encoded, json!("res://sprites/player.png"));
    }

    #[test]
    fn test_kind_directed_int_from_float() {
        assert_eq!(from_json(&json!(3.0), Some(ValueKind::Int)).unwrap(), Value::Int(3));
        assert!(from_json(&json!(3.5), Some(ValueKind::Int)).is_err());
    }

    #[test]
    fn test_natural_mapping() {
        assert_eq!(natural(&json!(null)), Value::Nil);
        assert_eq!(natural(&json!([1, "x"])), Value::List(vec![Value::Int(1), Value::Str("x".into())]));
        match natural(&json!({"a": 1})) {
            Value::Dict(dict) => assert_eq!(dict["a"], Value::Int(1)),
            other => panic!("Unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_vector_arity_mismatch() {
        assert!(from_json(&json!([1.0, 2.0, 3.0]), Some(ValueKind::Vector2)).is_err());
    }

    #[test]
    fn test_bad_base64() {
        assert!(from_json(&json!("!!"), Some(ValueKind::Bytes)).is_err());
    }
}
