use indexmap::IndexMap;
use std::fmt;

/// Engine-native value. Everything a node property, method argument or method
/// return can carry crosses the bridge as one of these variants.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Vector4([f32; 4]),
    Color { r: f32, g: f32, b: f32, a: f32 },
    Rect2 { position: [f32; 2], size: [f32; 2] },
    Transform2D { origin: [f32; 2], rotation: f32 },
    Basis([[f32; 3]; 3]),
    Quat([f32; 4]),
    Aabb { position: [f32; 3], size: [f32; 3] },
    NodePath(String),
    StringName(String),
    Bytes(Vec<u8>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StrArray(Vec<String>),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    /// Resources are referenced by their resource path only.
    Resource(String),
}

/// Type tag mirroring the [`Value`] discriminants. The engine reports one of
/// these as the declared type of a property so incoming JSON can be decoded
/// into the correct variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ValueKind {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Rect2,
    Transform2D,
    Basis,
    Quat,
    Aabb,
    NodePath,
    StringName,
    Bytes,
    IntArray,
    FloatArray,
    StrArray,
    List,
    Dict,
    Resource,
}

impl Value {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Vector2(_) => ValueKind::Vector2,
            Value::Vector3(_) => ValueKind::Vector3,
            Value::Vector4(_) => ValueKind::Vector4,
            Value::Color { .. } => ValueKind::Color,
            Value::Rect2 { .. } => ValueKind::Rect2,
            Value::Transform2D { .. } => ValueKind::Transform2D,
            Value::Basis(_) => ValueKind::Basis,
            Value::Quat(_) => ValueKind::Quat,
            Value::Aabb { .. } => ValueKind::Aabb,
            Value::NodePath(_) => ValueKind::NodePath,
            Value::StringName(_) => ValueKind::StringName,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::IntArray(_) => ValueKind::IntArray,
            Value::FloatArray(_) => ValueKind::FloatArray,
            Value::StrArray(_) => ValueKind::StrArray,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::Resource(_) => ValueKind::Resource,
        }
    }

    /// Numeric view of the value, for ordered comparisons.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64 as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) | Value::NodePath(v) | Value::StringName(v) | Value::Resource(v) => Some(v),
            _ => None,
        }
    }
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Nil => "Nil",
            ValueKind::Bool => "Bool",
            ValueKind::Int => "Int",
            ValueKind::Float => "Float",
            ValueKind::Str => "String",
            ValueKind::Vector2 => "Vector2",
            ValueKind::Vector3 => "Vector3",
            ValueKind::Vector4 => "Vector4",
            ValueKind::Color => "Color",
            ValueKind::Rect2 => "Rect2",
            ValueKind::Transform2D => "Transform2D",
            ValueKind::Basis => "Basis",
            ValueKind::Quat => "Quat",
            ValueKind::Aabb => "Aabb",
            ValueKind::NodePath => "NodePath",
            ValueKind::StringName => "StringName",
            ValueKind::Bytes => "Bytes",
            ValueKind::IntArray => "IntArray",
            ValueKind::FloatArray => "FloatArray",
            ValueKind::StrArray => "StringArray",
            ValueKind::List => "List",
            ValueKind::Dict => "Dict",
            ValueKind::Resource => "Resource",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(Value::Int(3).kind(), ValueKind::Int);
        assert_eq!(Value::Vector2([1.0, 2.0]).kind(), ValueKind::Vector2);
        assert_eq!(Value::Dict(IndexMap::new()).kind(), ValueKind::Dict);
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Value::Int(4).as_number(), Some(4.0));
        assert_eq!(Value::Float(1.5).as_number(), Some(1.5));
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert_eq!(Value::Str("x".into()).as_number(), None);
    }
}
