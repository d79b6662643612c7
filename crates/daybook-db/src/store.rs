//! Transaction-scoped relational store adapter.
//!
//! All operations are generic over the logical entity names registered in
//! [`crate::schema`] and exchange rows as JSON objects, which is the shape
//! action inputs and outputs already have. Every method takes effect inside
//! the ambient transaction — the store never commits or rolls back itself.

use crate::edges::{self, Edge};
use crate::schema::{self, EntityDef, RelationDef};
use daybook_types::{is_real_id, Object};
use rusqlite::types::ValueRef;
use rusqlite::{OptionalExtension, Row, Transaction};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any SQLite failure other than a constraint violation.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// A constraint (foreign key, uniqueness, check) was violated.
    ///
    /// Surfaced as its own variant because the action layer maps it to a
    /// user-visible conflict rather than an internal failure.
    #[error("constraint violated: {0}")]
    Constraint(rusqlite::Error),

    /// The row addressed by id does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// The logical entity name is not registered.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// The logical relation name is not registered.
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    /// A field or where-clause key does not name a column of the entity.
    #[error("unknown column '{column}' for {entity}")]
    UnknownColumn {
        entity: &'static str,
        column: String,
    },

    /// A field value has no SQL representation (nested array/object).
    #[error("unsupported value for column '{column}'")]
    UnsupportedValue { column: String },

    /// `update` was called without a usable id.
    #[error("missing id for {entity} update")]
    MissingId { entity: &'static str },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(e)
            }
            _ => Self::Database(e),
        }
    }
}

impl StoreError {
    /// True for constraint violations (restrict'd deletes, duplicate names).
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    /// True when the addressed row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// The store adapter, bound to one transaction.
pub struct Store<'a> {
    tx: &'a Transaction<'a>,
}

impl<'a> Store<'a> {
    pub fn new(tx: &'a Transaction<'a>) -> Self {
        Self { tx }
    }

    fn def(entity: &str) -> Result<&'static EntityDef, StoreError> {
        schema::entity(entity).ok_or_else(|| StoreError::UnknownEntity(entity.to_string()))
    }

    fn rel(relation: &str) -> Result<&'static RelationDef, StoreError> {
        schema::relation(relation).ok_or_else(|| StoreError::UnknownRelation(relation.to_string()))
    }

    /// Inserts a row, ignoring any incoming `id`, and returns the stored
    /// row including the assigned id.
    pub fn create(&self, entity: &str, fields: &Object) -> Result<Object, StoreError> {
        let def = Self::def(entity)?;
        let mut cols: Vec<&str> = Vec::new();
        let mut vals: Vec<rusqlite::types::Value> = Vec::new();
        for (column, value) in fields {
            if column == "id" {
                continue;
            }
            check_column(def, column)?;
            cols.push(column.as_str());
            vals.push(to_sql(column, value)?);
        }

        let sql = if cols.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                def.table,
                select_list(def)
            )
        } else {
            let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                def.table,
                cols.join(", "),
                placeholders.join(", "),
                select_list(def)
            )
        };

        let row = self
            .tx
            .query_row(&sql, rusqlite::params_from_iter(vals), |row| {
                row_to_object(def, row)
            })?;
        Ok(row)
    }

    /// Updates the row addressed by `fields["id"]` and returns it.
    pub fn update(&self, entity: &str, fields: &Object) -> Result<Object, StoreError> {
        let def = Self::def(entity)?;
        let id = fields
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(StoreError::MissingId { entity: def.name })?;

        let mut sets: Vec<String> = Vec::new();
        let mut vals: Vec<rusqlite::types::Value> = Vec::new();
        for (column, value) in fields {
            if column == "id" {
                continue;
            }
            check_column(def, column)?;
            sets.push(format!("{} = ?{}", column, vals.len() + 1));
            vals.push(to_sql(column, value)?);
        }

        if sets.is_empty() {
            return self.load(def, id);
        }

        vals.push(rusqlite::types::Value::Integer(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            def.table,
            sets.join(", "),
            vals.len()
        );
        let count = self.tx.execute(&sql, rusqlite::params_from_iter(vals))?;
        if count == 0 {
            return Err(StoreError::NotFound {
                entity: def.name,
                id,
            });
        }
        self.load(def, id)
    }

    /// Creates when the id is virtual (negative) or absent, updates when it
    /// is a real positive id.
    pub fn create_or_update(&self, entity: &str, fields: &Object) -> Result<Object, StoreError> {
        match fields.get("id").and_then(Value::as_i64) {
            Some(id) if is_real_id(id) => self.update(entity, fields),
            _ => self.create(entity, fields),
        }
    }

    /// Returns the row matching `where_`, creating `where_ ∪ extra` if none
    /// exists.
    pub fn create_or_find(
        &self,
        entity: &str,
        where_: &Object,
        extra: &Object,
    ) -> Result<Object, StoreError> {
        if let Some(existing) = self.find(entity, where_)? {
            return Ok(existing);
        }
        let mut fields = where_.clone();
        for (column, value) in extra {
            fields.insert(column.clone(), value.clone());
        }
        self.create(entity, &fields)
    }

    /// Deletes the row with the given id.
    ///
    /// Constraint violations from RESTRICT'd references propagate as
    /// [`StoreError::Constraint`].
    pub fn delete(&self, entity: &str, id: i64) -> Result<(), StoreError> {
        let def = Self::def(entity)?;
        let sql = format!("DELETE FROM {} WHERE id = ?1", def.table);
        let count = self.tx.execute(&sql, [id])?;
        if count == 0 {
            return Err(StoreError::NotFound {
                entity: def.name,
                id,
            });
        }
        Ok(())
    }

    /// Returns the first row matching the field-equality map, if any.
    pub fn find(&self, entity: &str, where_: &Object) -> Result<Option<Object>, StoreError> {
        let mut rows = self.find_all(entity, where_)?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.remove(0)))
        }
    }

    /// Returns all rows matching the field-equality map, ordered by id.
    ///
    /// A JSON null in the map matches SQL NULL.
    pub fn find_all(&self, entity: &str, where_: &Object) -> Result<Vec<Object>, StoreError> {
        let def = Self::def(entity)?;
        let mut clauses: Vec<String> = Vec::new();
        let mut vals: Vec<rusqlite::types::Value> = Vec::new();
        for (column, value) in where_ {
            check_column(def, column)?;
            if value.is_null() {
                clauses.push(format!("{column} IS NULL"));
            } else {
                clauses.push(format!("{} = ?{}", column, vals.len() + 1));
                vals.push(to_sql(column, value)?);
            }
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY id",
            select_list(def),
            def.table,
            where_sql
        );

        let mut stmt = self.tx.prepare(&sql)?;
        let mapped = stmt.query_map(rusqlite::params_from_iter(vals), |row| {
            row_to_object(def, row)
        })?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Returns the current edge set for `left_id`, ordered by right id.
    pub fn get_edges(&self, relation: &str, left_id: i64) -> Result<Vec<Edge>, StoreError> {
        let def = Self::rel(relation)?;
        edges::fetch_edges(self.tx, def, left_id)
    }

    /// Reconciles the stored edge set for `left_id` against `desired`
    /// (right id → attributes) and returns the surviving edges.
    pub fn set_edges(
        &self,
        relation: &str,
        left_id: i64,
        desired: &BTreeMap<i64, Object>,
    ) -> Result<Vec<Edge>, StoreError> {
        let def = Self::rel(relation)?;
        let (edges, writes) = edges::reconcile_edges(self.tx, def, left_id, desired)?;
        tracing::debug!(
            relation,
            left_id,
            created = writes.created,
            updated = writes.updated,
            deleted = writes.deleted,
            "edge set reconciled"
        );
        Ok(edges)
    }

    fn load(&self, def: &'static EntityDef, id: i64) -> Result<Object, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            select_list(def),
            def.table
        );
        self.tx
            .query_row(&sql, [id], |row| row_to_object(def, row))
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: def.name,
                id,
            })
    }
}

fn check_column(def: &EntityDef, column: &str) -> Result<(), StoreError> {
    if column == "id" || def.columns.contains(&column) {
        Ok(())
    } else {
        Err(StoreError::UnknownColumn {
            entity: def.name,
            column: column.to_string(),
        })
    }
}

fn select_list(def: &EntityDef) -> String {
    let mut list = String::from("id");
    for column in def.columns {
        list.push_str(", ");
        list.push_str(column);
    }
    list
}

pub(crate) fn to_sql(column: &str, value: &Value) -> Result<rusqlite::types::Value, StoreError> {
    use rusqlite::types::Value as Sql;
    Ok(match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Sql::Real(f)
            } else {
                return Err(StoreError::UnsupportedValue {
                    column: column.to_string(),
                });
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(StoreError::UnsupportedValue {
                column: column.to_string(),
            })
        }
    })
}

pub(crate) fn column_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

fn row_to_object(def: &EntityDef, row: &Row) -> rusqlite::Result<Object> {
    let mut obj = Object::new();
    obj.insert("id".to_string(), column_to_json(row.get_ref(0)?));
    for (i, column) in def.columns.iter().enumerate() {
        obj.insert((*column).to_string(), column_to_json(row.get_ref(i + 1)?));
    }
    Ok(obj)
}
