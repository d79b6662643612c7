//! The standard action set: topics, structures, events, and the
//! typeahead helper.
//!
//! Naming convention (the subscription matcher depends on it): `-load` is
//! a single-entity fetch, `-list` a filtered collection fetch. Mutating
//! actions queue exactly one broadcast, on `<entity>-list`, whose payload
//! is the partial item with its identity and filterable fields.

mod events;
mod structures;
mod topics;

use crate::error::ActionError;
use crate::registry::{ActionRegistry, RegistryError};
use daybook_types::Object;
use serde_json::Value;

/// Registers every standard action. Called once at startup.
pub fn register_all(registry: &mut ActionRegistry) -> Result<(), RegistryError> {
    topics::register(registry)?;
    structures::register(registry)?;
    events::register(registry)?;
    Ok(())
}

fn require_str<'v>(input: &'v Value, field: &str) -> Result<&'v str, ActionError> {
    input
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ActionError::validation(format!("'{field}' must be a non-empty string")))
}

fn require_i64(input: &Value, field: &str) -> Result<i64, ActionError> {
    input
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| ActionError::validation(format!("'{field}' must be an integer")))
}

fn require_id(input: &Value) -> Result<i64, ActionError> {
    require_i64(input, "id")
}

/// Copies an integer-or-null field into `fields` if the input carries it.
fn take_int_field(input: &Value, field: &str, fields: &mut Object) -> Result<(), ActionError> {
    match input.get(field) {
        None => Ok(()),
        Some(value) if value.is_null() || value.is_i64() => {
            fields.insert(field.to_string(), value.clone());
            Ok(())
        }
        Some(_) => Err(ActionError::validation(format!(
            "'{field}' must be an integer or null"
        ))),
    }
}

/// Copies a string field into `fields` if the input carries it.
fn take_str_field(input: &Value, field: &str, fields: &mut Object) -> Result<(), ActionError> {
    match input.get(field) {
        None => Ok(()),
        Some(Value::String(s)) => {
            fields.insert(field.to_string(), Value::String(s.clone()));
            Ok(())
        }
        Some(_) => Err(ActionError::validation(format!(
            "'{field}' must be a string"
        ))),
    }
}

/// Extracts the `where` clause of a list action, defaulting to "match
/// everything". Column validity is checked by the store.
fn where_clause(input: &Value) -> Result<Object, ActionError> {
    match input.get("where") {
        None | Some(Value::Null) => Ok(Object::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(ActionError::validation("'where' must be an object")),
    }
}

fn str_key(row: &Object, field: &str) -> String {
    row.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn id_of(row: &Object) -> Result<i64, ActionError> {
    row.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ActionError::validation("stored row is missing its id"))
}
