use crate::error::Error;
use indexmap::IndexMap;
use itertools::Itertools;
use regex::Regex;
use std::{
    any::Any,
    cmp::Ordering,
    fmt::{Debug, Display, Formatter},
    sync::Arc,
};

/// A dynamically-typed value: the shape of both records and queries.
///
/// Maps preserve insertion order. The `External` variant carries an opaque
/// host value; it only becomes matchable once the installed
/// [`crate::ValueConverter`] turns it into one of the other variants.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Regex(Arc<Regex>),
    External(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Compile `pattern` into a regex value usable as a `$regex` condition.
    pub fn regex(pattern: &str) -> Result<Self, Error> {
        Regex::new(pattern)
            .map(|compiled| Self::Regex(Arc::new(compiled)))
            .map_err(|error| Error::InvalidArgument(format!("regex does not compile: {error}")))
    }

    /// Wrap an opaque host value.
    pub fn external<T: Any + Send + Sync>(value: T) -> Self {
        Self::External(Arc::new(value))
    }

    /// Parse a JSON document into a [`Value`], preserving key order.
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        serde_json::from_str::<serde_json::Value>(text)
            .map(Into::into)
            .map_err(|error| Error::Parse(error.to_string()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
            Self::Regex(_) => "Regex",
            Self::External(_) => "External",
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

/// Comparison semantics: Int and Double compare numerically, strings
/// lexicographically, booleans as `false < true`, arrays by size then
/// elementwise with `Null` ordered below non-null. Maps compare equal or not
/// at all. Every other cross-type pairing is incomparable (`None`), as is
/// a `Double` NaN.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Double(b)) => (*a as f64).partial_cmp(b),
            (Self::Double(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Array(a), Self::Array(b)) => compare_arrays(a, b),
            (Self::Map(a), Self::Map(b)) => maps_equal(a, b).then_some(Ordering::Equal),
            (Self::Regex(a), Self::Regex(b)) => {
                (a.as_str() == b.as_str()).then_some(Ordering::Equal)
            }
            (Self::External(a), Self::External(b)) => {
                Arc::ptr_eq(a, b).then_some(Ordering::Equal)
            }
            _ => None,
        }
    }
}

fn compare_arrays(a: &[Value], b: &[Value]) -> Option<Ordering> {
    if a.len() != b.len() {
        return Some(a.len().cmp(&b.len()));
    }
    for (x, y) in a.iter().zip(b) {
        let ordering = match (x, y) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => x.partial_cmp(y)?,
        };
        if ordering != Ordering::Equal {
            return Some(ordering);
        }
    }
    Some(Ordering::Equal)
}

fn maps_equal(a: &IndexMap<String, Value>, b: &IndexMap<String, Value>) -> bool {
    a.len() == b.len() && a.iter().all(|(key, value)| b.get(key) == Some(value))
}

impl Display for Value {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(formatter, "null"),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Double(value) => write!(formatter, "{value}"),
            Self::String(value) => write!(formatter, "{value:?}"),
            Self::Array(items) => write!(formatter, "[{}]", items.iter().format(", ")),
            Self::Map(entries) => write!(
                formatter,
                "{{{}}}",
                entries
                    .iter()
                    .format_with(", ", |(key, value), f| f(&format_args!("{key:?}: {value}")))
            ),
            Self::Regex(pattern) => write!(formatter, "/{}/", pattern.as_str()),
            Self::External(_) => write!(formatter, "External"),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, formatter)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Regex> for Value {
    fn from(value: Regex) -> Self {
        Self::Regex(Arc::new(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Self::Array(items.into_iter().collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Self::Int(value),
                None => Self::Double(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(value) => Self::String(value),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}
