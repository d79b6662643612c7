//! Structure actions: typed log structures and their ordered key sets.

use super::{id_of, require_id, require_str, str_key, take_int_field, where_clause};
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{ActionRegistry, RegistryError};
use daybook_db::StoreError;
use daybook_types::Object;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const VALUE_TYPES: &[&str] = &["string", "integer"];

pub(crate) fn register(registry: &mut ActionRegistry) -> Result<(), RegistryError> {
    registry.register("structure-upsert", upsert)?;
    registry.register("structure-load", load)?;
    registry.register("structure-list", list)?;
    registry.register("structure-delete", delete)?;
    Ok(())
}

fn upsert(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let name = require_str(input, "name")?;

    let mut fields = Object::new();
    if let Some(id) = input.get("id") {
        fields.insert("id".to_string(), id.clone());
    }
    fields.insert("name".to_string(), json!(name));
    take_int_field(input, "topic_id", &mut fields)?;

    let row = ctx.store().create_or_update("structure", &fields)?;
    let structure_id = id_of(&row)?;

    // An absent `keys` leaves the key set untouched; a present (possibly
    // empty) array is authoritative and reconciled against it.
    match input.get("keys") {
        None | Some(Value::Null) => {}
        Some(Value::Array(keys)) => {
            let desired = desired_key_edges(ctx, keys)?;
            ctx.store()
                .set_edges("structure_to_key", structure_id, &desired)?;
        }
        Some(_) => return Err(ActionError::validation("'keys' must be an array")),
    }

    ctx.broadcast(
        "structure-list",
        json!({"id": structure_id, "topic_id": row["topic_id"]}),
    );
    with_keys(ctx, row)
}

fn load(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let id = require_id(input)?;
    let row = find_structure(ctx, id)?;
    with_keys(ctx, row)
}

fn list(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let where_ = where_clause(input)?;
    let mut rows = ctx.store().find_all("structure", &where_)?;
    rows.sort_by_key(|row| str_key(row, "name"));
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(with_keys(ctx, row)?);
    }
    Ok(Value::Array(out))
}

fn delete(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let id = require_id(input)?;
    let row = find_structure(ctx, id)?;
    // The key edges cascade with the structure; the key rows survive.
    ctx.store().delete("structure", id)?;
    ctx.broadcast(
        "structure-list",
        json!({"id": id, "topic_id": row["topic_id"]}),
    );
    Ok(Value::Null)
}

/// Resolves the requested key list into (key id → ordering attributes).
///
/// Keys are matched by name: re-using a name shares the existing key row
/// and leaves its value type unchanged.
fn desired_key_edges(
    ctx: &ActionContext<'_>,
    keys: &[Value],
) -> Result<BTreeMap<i64, Object>, ActionError> {
    let mut desired = BTreeMap::new();
    for (index, key) in keys.iter().enumerate() {
        let key_name = require_str(key, "name")?;
        let value_type = require_str(key, "value_type")?;
        if !VALUE_TYPES.contains(&value_type) {
            return Err(ActionError::validation(format!(
                "unknown value_type '{value_type}' for key '{key_name}'"
            )));
        }

        let mut where_ = Object::new();
        where_.insert("name".to_string(), json!(key_name));
        let mut extra = Object::new();
        extra.insert("value_type".to_string(), json!(value_type));
        let key_row = ctx.store().create_or_find("structure_key", &where_, &extra)?;

        let mut attrs = Object::new();
        attrs.insert("ordering_index".to_string(), json!(index as i64));
        desired.insert(id_of(&key_row)?, attrs);
    }
    Ok(desired)
}

/// Attaches the ordered key rows under `"keys"`.
fn with_keys(ctx: &ActionContext<'_>, mut structure: Object) -> Result<Value, ActionError> {
    let structure_id = id_of(&structure)?;
    let edges = ctx.store().get_edges("structure_to_key", structure_id)?;

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

    let mut keys = Vec::with_capacity(ordered.len());
    for (_, key_id) in ordered {
        let mut where_ = Object::new();
        where_.insert("id".to_string(), json!(key_id));
        let key = ctx
            .store()
            .find("structure_key", &where_)?
            .ok_or(StoreError::NotFound {
                entity: "structure_key",
                id: key_id,
            })?;
        keys.push(Value::Object(key));
    }
    structure.insert("keys".to_string(), Value::Array(keys));
    Ok(Value::Object(structure))
}

fn find_structure(ctx: &ActionContext<'_>, id: i64) -> Result<Object, ActionError> {
    let mut where_ = Object::new();
    where_.insert("id".to_string(), json!(id));
    ctx.store().find("structure", &where_)?.ok_or_else(|| {
        StoreError::NotFound {
            entity: "structure",
            id,
        }
        .into()
    })
}
