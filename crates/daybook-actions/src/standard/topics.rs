//! Topic actions: the hierarchical organization layer.

use super::{require_id, require_str, str_key, take_int_field, take_str_field, where_clause};
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{ActionRegistry, RegistryError};
use daybook_db::StoreError;
use daybook_types::Object;
use serde_json::{json, Value};

pub(crate) fn register(registry: &mut ActionRegistry) -> Result<(), RegistryError> {
    registry.register("topic-upsert", upsert)?;
    registry.register("topic-load", load)?;
    registry.register("topic-list", list)?;
    registry.register("topic-delete", delete)?;
    Ok(())
}

fn upsert(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let name = require_str(input, "name")?;

    let mut fields = Object::new();
    if let Some(id) = input.get("id") {
        fields.insert("id".to_string(), id.clone());
    }
    fields.insert("name".to_string(), json!(name));
    take_int_field(input, "parent_id", &mut fields)?;
    take_str_field(input, "details", &mut fields)?;

    let row = ctx.store().create_or_update("topic", &fields)?;
    ctx.broadcast(
        "topic-list",
        json!({"id": row["id"], "parent_id": row["parent_id"]}),
    );
    Ok(Value::Object(row))
}

fn load(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let id = require_id(input)?;
    let row = find_topic(ctx, id)?;
    Ok(Value::Object(row))
}

fn list(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let where_ = where_clause(input)?;
    let mut rows = ctx.store().find_all("topic", &where_)?;
    rows.sort_by_key(|row| str_key(row, "name"));
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}

fn delete(ctx: &ActionContext<'_>, input: &Value) -> Result<Value, ActionError> {
    let id = require_id(input)?;
    let row = find_topic(ctx, id)?;
    ctx.store().delete("topic", id)?;
    ctx.broadcast(
        "topic-list",
        json!({"id": id, "parent_id": row["parent_id"]}),
    );
    Ok(Value::Null)
}

fn find_topic(ctx: &ActionContext<'_>, id: i64) -> Result<Object, ActionError> {
    let mut where_ = Object::new();
    where_.insert("id".to_string(), json!(id));
    ctx.store()
        .find("topic", &where_)?
        .ok_or_else(|| StoreError::NotFound { entity: "topic", id }.into())
}
