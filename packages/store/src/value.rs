//! The Value type - the tree-shaped data model of the substrate.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::Binary;

/// An ordered key-value mapping with string keys.
///
/// Insertion order is preserved, which matters for index listings and for
/// configuration documents whose key order carries meaning to humans.
pub type Dict = IndexMap<String, Value>;

/// A live object held by the substrate (e.g. a plug-in instance).
///
/// Stored objects are reference-counted and addressed by path; the substrate
/// never serializes them. Equality between `Value::Object`s is pointer
/// identity.
pub trait StorableObject: fmt::Debug + Send + Sync {
    /// Short type tag for metadata reporting, e.g. `"plugin"`.
    fn type_name(&self) -> &str;
}

/// A tagged value that can be read from or written to a store.
///
/// This is the universal data representation of the substrate. Structured
/// documents (JSON, YAML, properties) parse into it; binaries stay addressable
/// byte blobs behind [`Binary`].
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Absence of a value. Distinct from "path doesn't exist".
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// An addressable byte blob.
    Binary(Binary),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Ordered key-value map with string keys.
    Dict(Dict),
    /// A live object (plug-in instance or similar).
    Object(Arc<dyn StorableObject>),
}

impl Value {
    /// Create an empty dict value.
    pub fn dict() -> Self {
        Value::Dict(Dict::new())
    }

    /// Create an empty array value.
    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a dict.
    pub fn is_dict(&self) -> bool {
        matches!(self, Value::Dict(_))
    }

    /// Check if this value is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Check if this value is a binary blob.
    pub fn is_binary(&self) -> bool {
        matches!(self, Value::Binary(_))
    }

    /// Get the boolean content, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the integer content, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the floating point content, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get the string content, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the binary content, if any.
    pub fn as_binary(&self) -> Option<&Binary> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get the array content, if any.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get the dict content, if any.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Get the dict content mutably, if any.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Get the stored object, if any.
    pub fn as_object(&self) -> Option<&Arc<dyn StorableObject>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Name of this value's variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Object(_) => "object",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Value::Dict(v)
    }
}

impl From<Binary> for Value {
    fn from(v: Binary) -> Self {
        Value::Binary(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestObject;

    impl StorableObject for TestObject {
        fn type_name(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn value_constructors() {
        assert!(Value::Null.is_null());
        assert!(Value::dict().is_dict());
        assert!(Value::array().is_array());
        assert!(Value::default().is_null());
    }

    #[test]
    fn typed_accessors() {
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(42i64).as_int(), Some(42));
        assert_eq!(Value::from(2.5f64).as_float(), Some(2.5));
        assert_eq!(Value::from(42i64).as_float(), Some(42.0));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from("hi").as_int(), None);
        assert_eq!(Value::Null.as_str(), None);
    }

    #[test]
    fn dict_preserves_insertion_order() {
        let mut d = Dict::new();
        d.insert("zeta".to_string(), Value::from(1i64));
        d.insert("alpha".to_string(), Value::from(2i64));
        d.insert("mid".to_string(), Value::from(3i64));
        let keys: Vec<&str> = d.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn dict_equality_ignores_order() {
        let mut a = Dict::new();
        a.insert("x".to_string(), Value::from(1i64));
        a.insert("y".to_string(), Value::from(2i64));
        let mut b = Dict::new();
        b.insert("y".to_string(), Value::from(2i64));
        b.insert("x".to_string(), Value::from(1i64));
        assert_eq!(Value::Dict(a), Value::Dict(b));
    }

    #[test]
    fn object_equality_is_identity() {
        let a: Arc<dyn StorableObject> = Arc::new(TestObject);
        let b: Arc<dyn StorableObject> = Arc::new(TestObject);
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn from_vec_values() {
        let value = Value::from(vec![1i64, 2, 3]);
        assert_eq!(value.as_array().map(<[Value]>::len), Some(3));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::dict().type_name(), "dict");
        assert_eq!(Value::from("x").type_name(), "string");
    }
}
