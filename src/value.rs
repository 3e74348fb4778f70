// src/value.rs
//! Typed property values.
//!
//! Every field in the material catalog holds one [`PropertyValue`]. Writes are
//! checked against the field's [`ValueKind`] before anything else happens.
//! Enum-valued fields are stored as `Int` holding the variant index.

use std::fmt;

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Opaque reference to a texture owned by the host (or created through the
/// render backend, e.g. the region blend map).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureRef(pub u64);

impl fmt::Display for TextureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

/// The type of a property, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    /// RGBA, linear 0..1 components.
    Color,
    Texture,
    IntArray,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Vec2 => "vec2",
            ValueKind::Vec3 => "vec3",
            ValueKind::Color => "color",
            ValueKind::Texture => "texture",
            ValueKind::IntArray => "int[]",
        };
        f.write_str(name)
    }
}

/// A property or uniform value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Color(Vec4),
    Texture(Option<TextureRef>),
    IntArray(Vec<i32>),
}

impl PropertyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::Int(_) => ValueKind::Int,
            PropertyValue::Float(_) => ValueKind::Float,
            PropertyValue::Vec2(_) => ValueKind::Vec2,
            PropertyValue::Vec3(_) => ValueKind::Vec3,
            PropertyValue::Color(_) => ValueKind::Color,
            PropertyValue::Texture(_) => ValueKind::Texture,
            PropertyValue::IntArray(_) => ValueKind::IntArray,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            PropertyValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Vec2(v) => write!(f, "({}, {})", v.x, v.y),
            PropertyValue::Vec3(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            PropertyValue::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.x, c.y, c.z, c.w),
            PropertyValue::Texture(Some(t)) => write!(f, "{t}"),
            PropertyValue::Texture(None) => f.write_str("<none>"),
            PropertyValue::IntArray(v) => write!(f, "int[{}]", v.len()),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<Vec2> for PropertyValue {
    fn from(v: Vec2) -> Self {
        PropertyValue::Vec2(v)
    }
}

impl From<Vec3> for PropertyValue {
    fn from(v: Vec3) -> Self {
        PropertyValue::Vec3(v)
    }
}

impl From<Vec4> for PropertyValue {
    fn from(v: Vec4) -> Self {
        PropertyValue::Color(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_conversions() {
        assert_eq!(PropertyValue::from(0.8f32).kind(), ValueKind::Float);
        assert_eq!(PropertyValue::from(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::from(3).as_float(), None);
        assert_eq!(PropertyValue::Texture(None).kind(), ValueKind::Texture);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&PropertyValue::Float(1.5)).unwrap();
        assert_eq!(json, r#"{"type":"float","value":1.5}"#);
        let back: PropertyValue =
            serde_json::from_str(r#"{"type":"texture","value":7}"#).unwrap();
        assert_eq!(back, PropertyValue::Texture(Some(TextureRef(7))));
    }
}
