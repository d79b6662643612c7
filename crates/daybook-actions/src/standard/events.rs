//! Event actions: the log entries themselves, plus the typeahead helper.

use super::{
    id_of, require_i64, require_id, require_str, str_key, take_int_field, take_str_field,
    where_clause,
};
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{ActionRegistry, RegistryError};
use chrono::NaiveDate;
use daybook_db::StoreError;
use daybook_types::Object;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub(crate) fn register(registry: &mut ActionRegistry) -> Result<(), RegistryError> {
    registry.register("event-upsert", upsert)?;
    registry.register("event-load", load)?;
    registry.register("event-list", list)?;
    registry.register("event-delete", delete)?;
    registry.register("value-typeahead", typeahead)?;
    Ok(())
}

fn upsert(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let date = require_str(input, "date")?;
    if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return Err(ActionError::validation(format!(
            "'date' must be a YYYY-MM-DD date, got '{date}'"
        )));
    }
    let title = require_str(input, "title")?;

    let mut fields = Object::new();
    if let Some(id) = input.get("id") {
        fields.insert("id".to_string(), id.clone());
    }
    fields.insert("date".to_string(), json!(date));
    fields.insert("title".to_string(), json!(title));
    take_str_field(input, "details", &mut fields)?;
    take_int_field(input, "structure_id", &mut fields)?;

    let row = ctx.store().create_or_update("event", &fields)?;
    let event_id = id_of(&row)?;
    let structure_id = row.get("structure_id").and_then(Value::as_i64);

    match input.get("values") {
        None | Some(Value::Null) => {}
        Some(Value::Array(values)) => {
            let desired = desired_value_edges(ctx, structure_id, values)?;
            ctx.store()
                .set_edges("event_to_value", event_id, &desired)?;
        }
        Some(_) => return Err(ActionError::validation("'values' must be an array")),
    }

    ctx.broadcast(
        "event-list",
        json!({
            "id": event_id,
            "date": row["date"],
            "structure_id": row["structure_id"],
        }),
    );
    with_values(ctx, row)
}

fn load(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let id = require_id(input)?;
    let row = find_event(ctx, id)?;
    with_values(ctx, row)
}

fn list(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let where_ = where_clause(input)?;
    let mut rows = ctx.store().find_all("event", &where_)?;
    rows.sort_by(|a, b| {
        str_key(a, "date").cmp(&str_key(b, "date")).then_with(|| {
            let left = a.get("id").and_then(Value::as_i64).unwrap_or(0);
            let right = b.get("id").and_then(Value::as_i64).unwrap_or(0);
            left.cmp(&right)
        })
    });
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(with_values(ctx, row)?);
    }
    Ok(Value::Array(out))
}

fn delete(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let id = require_id(input)?;
    let row = find_event(ctx, id)?;
    // The value edges cascade with the event; the shared value rows stay.
    ctx.store().delete("event", id)?;
    ctx.broadcast(
        "event-list",
        json!({
            "id": id,
            "date": row["date"],
            "structure_id": row["structure_id"],
        }),
    );
    Ok(Value::Null)
}

/// Most-frequent-first completion of stored values for one structure key.
///
/// A read-only composite: it reuses `event-list` through the context, so
/// it runs on the same transaction as any caller.
fn typeahead(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let structure_id = require_i64(input, "structure_id")?;
    let key_id = require_i64(input, "key_id")?;
    let prefix = input.get("prefix").and_then(Value::as_str).unwrap_or("");

    let events = ctx.invoke(
        "event-list",
        &json!({"where": {"structure_id": structure_id}}),
    )?;

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in events.as_array().map(Vec::as_slice).unwrap_or_default() {
        let values = event.get("values").and_then(Value::as_array);
        for value in values.map(Vec::as_slice).unwrap_or_default() {
            if value.get("key_id").and_then(Value::as_i64) != Some(key_id) {
                continue;
            }
            if let Some(data) = value.get("data").and_then(Value::as_str) {
                if data.starts_with(prefix) {
                    *counts.entry(data.to_string()).or_insert(0) += 1;
                }
            }
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(Value::Array(
        ranked
            .into_iter()
            .map(|(data, _)| Value::String(data))
            .collect(),
    ))
}

/// Resolves the requested value list into (value id → ordering attributes),
/// validating each entry against the attached structure's key set.
fn desired_value_edges(
    ctx: &ActionContext<'_>,
    structure_id: Option<i64>,
    values: &[Value],
) -> Result<BTreeMap<i64, Object>, ActionError> {
    if values.is_empty() {
        return Ok(BTreeMap::new());
    }
    let structure_id = structure_id
        .ok_or_else(|| ActionError::validation("'values' require an attached structure"))?;
    let key_types = structure_key_types(ctx, structure_id)?;

    let mut desired = BTreeMap::new();
    for (index, value) in values.iter().enumerate() {
        let key_id = require_i64(value, "key_id")?;
        let data = require_str(value, "data")?;

        let value_type = key_types.get(&key_id).ok_or_else(|| {
            ActionError::validation(format!(
                "key {key_id} is not part of structure {structure_id}"
            ))
        })?;
        if value_type == "integer" && data.parse::<i64>().is_err() {
            return Err(ActionError::validation(format!(
                "value '{data}' for key {key_id} must be an integer"
            )));
        }

        let mut where_ = Object::new();
        where_.insert("key_id".to_string(), json!(key_id));
        where_.insert("data".to_string(), json!(data));
        let value_row = ctx
            .store()
            .create_or_find("event_value", &where_, &Object::new())?;

        let mut attrs = Object::new();
        attrs.insert("ordering_index".to_string(), json!(index as i64));
        desired.insert(id_of(&value_row)?, attrs);
    }
    Ok(desired)
}

/// Maps a structure's key ids to their value types.
fn structure_key_types(
    ctx: &ActionContext<'_>,
    structure_id: i64,
) -> Result<BTreeMap<i64, String>, ActionError> {
    let edges = ctx.store().get_edges("structure_to_key", structure_id)?;
    let mut types = BTreeMap::new();
    for edge in edges {
        let mut where_ = Object::new();
        where_.insert("id".to_string(), json!(edge.right_id));
        let key = ctx
            .store()
            .find("structure_key", &where_)?
            .ok_or(StoreError::NotFound {
                entity: "structure_key",
                id: edge.right_id,
            })?;
        types.insert(edge.right_id, str_key(&key, "value_type"));
    }
    Ok(types)
}

/// Attaches the ordered value rows under `"values"`.
fn with_values(ctx: &ActionContext<'_>, mut event: Object) -> Result<Value, ActionError> {
    let event_id = id_of(&event)?;
    let edges = ctx.store().get_edges("event_to_value", event_id)?;

    let mut ordered: Vec<(i64, i64)> = edges
        .iter()
        .map(|edge| {
            let index = edge
                .attributes
                .get("ordering_index")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            (index, edge.right_id)
        })
        .collect();
    ordered.sort_unstable();

    let mut values = Vec::with_capacity(ordered.len());
    for (_, value_id) in ordered {
        let mut where_ = Object::new();
        where_.insert("id".to_string(), json!(value_id));
        let value = ctx
            .store()
            .find("event_value", &where_)?
            .ok_or(StoreError::NotFound {
                entity: "event_value",
                id: value_id,
            })?;
        values.push(Value::Object(value));
    }
    event.insert("values".to_string(), Value::Array(values));
    Ok(Value::Object(event))
}

fn find_event(ctx: &ActionContext<'_>, id: i64) -> Result<Object, ActionError> {
    let mut where_ = Object::new();
    where_.insert("id".to_string(), json!(id));
    ctx.store()
        .find("event", &where_)?
        .ok_or_else(|| StoreError::NotFound { entity: "event", id }.into())
}
