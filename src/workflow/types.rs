//! CWL type values and the compatibility rule used when wiring steps.
//!
//! Types are kept close to how they were written: a plain name (`File`,
//! `string?`, `File[]`), an explicit array (`{type: array, items: ...}`), or
//! anything else (unions, records, enums), kept verbatim.
//!
//! Compatibility is deliberately shallow. Two types are compared only when
//! both reduce to a plain type string; the nullable `?` suffix is ignored.
//! Everything else is accepted.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_yaml::{Mapping, Value};

const NULLABLE_SUFFIX: char = '?';
const ARRAY_SUFFIX: &str = "[]";

#[derive(Debug, Clone, PartialEq)]
pub enum CwlType {
    /// A type written as a string, e.g. `File`, `string?`, `int[]`.
    Named(String),
    /// `{type: array, items: <inner>}`
    Array(Box<CwlType>),
    /// Unions, records, enums and other shapes, kept as written.
    Complex(Value),
}

impl CwlType {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Reads a type from its document form.
    ///
    /// Returns `None` for shapes that cannot be a type (numbers, booleans,
    /// null).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(Self::Named(name.clone())),
            Value::Mapping(map) => {
                let is_array = map.get("type").and_then(Value::as_str) == Some("array");
                match (is_array, map.get("items")) {
                    (true, Some(items)) => {
                        let inner = Self::from_value(items).unwrap_or_else(|| Self::Complex(items.clone()));
                        Some(Self::Array(Box::new(inner)))
                    }
                    _ => Some(Self::Complex(value.clone())),
                }
            }
            Value::Sequence(_) => Some(Self::Complex(value.clone())),
            Value::Tagged(tagged) => Self::from_value(&tagged.value),
            Value::Null | Value::Bool(_) | Value::Number(_) => None,
        }
    }

    /// Document form of the type.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Named(name) => Value::String(name.clone()),
            Self::Array(inner) => {
                let mut map = Mapping::new();
                map.insert("type".into(), "array".into());
                map.insert("items".into(), inner.to_value());
                Value::Mapping(map)
            }
            Self::Complex(value) => value.clone(),
        }
    }

    /// Wraps the type into an array, as scattering does to every output.
    pub fn array_of(self) -> Self {
        Self::Array(Box::new(self))
    }

    /// The type a scattered input expects from its source.
    pub fn scattered(&self) -> Self {
        match self {
            Self::Named(name) => Self::Named(format!("{}{}", name, ARRAY_SUFFIX)),
            other => other.clone().array_of(),
        }
    }

    /// True for `T?` and for unions containing `null`.
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Named(name) => name.ends_with(NULLABLE_SUFFIX),
            Self::Complex(Value::Sequence(members)) => {
                members.iter().any(|m| m.as_str() == Some("null"))
            }
            _ => false,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex(_))
    }

    /// Element type of an array type.
    pub fn items(&self) -> Option<CwlType> {
        match self {
            Self::Array(inner) => Some((**inner).clone()),
            Self::Named(name) => name
                .trim_end_matches(NULLABLE_SUFFIX)
                .strip_suffix(ARRAY_SUFFIX)
                .map(|inner| Self::Named(inner.to_string())),
            Self::Complex(_) => None,
        }
    }

    /// Plain type string with the nullable marker removed, if the type has one.
    fn canonical(&self) -> Option<String> {
        match self {
            Self::Named(name) => Some(name.trim_end_matches(NULLABLE_SUFFIX).to_string()),
            Self::Array(inner) => inner.canonical().map(|s| format!("{}{}", s, ARRAY_SUFFIX)),
            Self::Complex(_) => None,
        }
    }

    /// Returns false only when both types are plain and differ.
    pub fn compatible_with(&self, other: &CwlType) -> bool {
        match (self.canonical(), other.canonical()) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
    }
}

impl From<&str> for CwlType {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for CwlType {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl fmt::Display for CwlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::Array(inner) => write!(f, "{}{}", inner, ARRAY_SUFFIX),
            Self::Complex(value) => match serde_json::to_string(value) {
                Ok(json) => write!(f, "{}", json),
                Err(_) => write!(f, "{:?}", value),
            },
        }
    }
}

impl Serialize for CwlType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
