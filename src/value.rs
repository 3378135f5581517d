//! Transport-safe value model.
//!
//! Everything that crosses the engine boundary (arguments, keyword arguments,
//! return values) is a [`TransportValue`]. The same JSON shape is used on the
//! caller-facing side and on the worker wire protocol; the assembler renders
//! the identical model as source literals.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value representable as null, boolean, number, string, list or
/// string-keyed map.
///
/// `Float` must be finite to be embeddable; the assembler rejects NaN and the
/// infinities. Deserializing an integer outside the i64 range is an error
/// rather than a rounded float.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransportValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<TransportValue>),
    Map(BTreeMap<String, TransportValue>),
}

impl TransportValue {
    /// Short name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Nesting depth: scalars are 0, `[]` is 1, `[[1]]` is 2
    pub fn depth(&self) -> usize {
        match self {
            Self::List(items) => 1 + items.iter().map(Self::depth).max().unwrap_or(0),
            Self::Map(entries) => 1 + entries.values().map(Self::depth).max().unwrap_or(0),
            _ => 0,
        }
    }
}

impl fmt::Display for TransportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "<{}>", self.kind()),
        }
    }
}

impl<'de> Deserialize<'de> for TransportValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TransportValueVisitor)
    }
}

struct TransportValueVisitor;

impl<'de> Visitor<'de> for TransportValueVisitor {
    type Value = TransportValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, a boolean, a number, a string, a list or a string-keyed map")
    }

    fn visit_unit<E: de::Error>(self) -> Result<TransportValue, E> {
        Ok(TransportValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<TransportValue, E> {
        Ok(TransportValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<TransportValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        TransportValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<TransportValue, E> {
        Ok(TransportValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<TransportValue, E> {
        Ok(TransportValue::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<TransportValue, E> {
        i64::try_from(value)
            .map(TransportValue::Integer)
            .map_err(|_| E::custom(format!("integer {} is outside the 64-bit signed range", value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<TransportValue, E> {
        Ok(TransportValue::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<TransportValue, E> {
        Ok(TransportValue::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<TransportValue, E> {
        Ok(TransportValue::String(value))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<TransportValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(TransportValue::List(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<TransportValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, TransportValue>()? {
            entries.insert(key, value);
        }
        Ok(TransportValue::Map(entries))
    }
}

impl From<bool> for TransportValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for TransportValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for TransportValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for TransportValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TransportValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<TransportValue>> From<Vec<T>> for TransportValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}
