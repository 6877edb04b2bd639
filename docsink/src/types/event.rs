use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the field holding a document's primary key.
pub const ID_FIELD: &str = "id";

/// A document: a mapping from string keys to arbitrary JSON values.
pub type Document = Map<String, Value>;

/// Kind of mutation carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => f.write_str("insert"),
            Operation::Update => f.write_str("update"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// One unit of the incoming operation stream.
///
/// The payload is kept as an arbitrary [`Value`] because upstream sources do not guarantee it is
/// a document. Validation happens when the event is applied, so that a malformed event can be
/// reported with its original payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub op: Operation,
    pub data: Value,
}

impl ChangeEvent {
    pub fn new(op: Operation, data: Value) -> Self {
        Self { op, data }
    }

    pub fn insert(data: Value) -> Self {
        Self::new(Operation::Insert, data)
    }

    pub fn update(data: Value) -> Self {
        Self::new(Operation::Update, data)
    }

    pub fn delete(data: Value) -> Self {
        Self::new(Operation::Delete, data)
    }

    /// Returns the payload as a document, or [`None`] if it is a scalar or an array.
    pub fn document(&self) -> Option<&Document> {
        self.data.as_object()
    }

    /// Returns the primary key addressed by the payload's `id` field.
    ///
    /// Returns [`None`] when the payload is not a document, has no `id` field, or the field is
    /// neither a string nor a number.
    pub fn primary_key(&self) -> Option<PrimaryKey> {
        self.document()
            .and_then(|document| document.get(ID_FIELD))
            .and_then(PrimaryKey::from_value)
    }
}

/// Primary key of a stored document.
///
/// Only strings and numbers are valid keys. The key keeps the JSON rendering of the value, so
/// `7` and `"7"` address different documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimaryKey(String);

impl PrimaryKey {
    /// Builds the key of an `id` value, or [`None`] for `null`, booleans, arrays and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) | Value::Number(_) => Some(Self(value.to_string())),
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Builds the key of a string `id`.
    pub fn from_string(id: &str) -> Self {
        Self(Value::String(id.to_owned()).to_string())
    }

    /// Returns the JSON rendering of the key, e.g. `7` or `"7"`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
