use serde_json::Value;

use crate::types::{ChangeEvent, Document};

/// Converts a JSON object literal into a [`Document`].
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(document) => document,
        other => panic!("expected a json object, got {other}"),
    }
}

pub fn insert_event(data: Value) -> ChangeEvent {
    ChangeEvent::insert(data)
}

pub fn update_event(data: Value) -> ChangeEvent {
    ChangeEvent::update(data)
}

pub fn delete_event(data: Value) -> ChangeEvent {
    ChangeEvent::delete(data)
}
