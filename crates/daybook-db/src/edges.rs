//! Edge-set reconciliation.
//!
//! A relationship (e.g. a structure's ordered key set) is stored as a set
//! of edges keyed by (left id, right id) with attribute columns such as
//! `ordering_index`. Reconciliation computes the minimal create/update/
//! delete set that makes the stored edges match a desired map, inside the
//! ambient transaction. An update whose attributes already match is
//! skipped entirely.

use crate::schema::RelationDef;
use crate::store::{column_to_json, to_sql, StoreError};
use daybook_types::Object;
use rusqlite::Connection;
use std::collections::BTreeMap;

/// One stored edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub left_id: i64,
    pub right_id: i64,
    /// Attribute columns carried on the edge, e.g. `ordering_index`.
    pub attributes: Object,
}

/// Write counts from one reconciliation pass.
///
/// A second reconcile with an identical desired set reports all zeroes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeWrites {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl EdgeWrites {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

pub(crate) fn fetch_edges(
    conn: &Connection,
    def: &RelationDef,
    left_id: i64,
) -> Result<Vec<Edge>, StoreError> {
    let mut select = def.right_col.to_string();
    for column in def.attr_cols {
        select.push_str(", ");
        select.push_str(column);
    }
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
        select, def.table, def.left_col, def.right_col
    );

    let mut stmt = conn.prepare(&sql)?;
    let mapped = stmt.query_map([left_id], |row| {
        let right_id: i64 = row.get(0)?;
        let mut attributes = Object::new();
        for (i, column) in def.attr_cols.iter().enumerate() {
            attributes.insert((*column).to_string(), column_to_json(row.get_ref(i + 1)?));
        }
        Ok(Edge {
            left_id,
            right_id,
            attributes,
        })
    })?;

    let mut edges = Vec::new();
    for edge in mapped {
        edges.push(edge?);
    }
    Ok(edges)
}

/// Reconciles the stored edge set for `left_id` against `desired`.
///
/// Returns the surviving edges (created plus present-in-both; deleted
/// excluded) and the write counts. The surviving list is ordered by right
/// id, not by input order — display order lives in an attribute column.
///
/// An empty `desired` map deletes every edge for `left_id`, which succeeds
/// as a no-op when there is nothing to delete.
pub fn reconcile_edges(
    conn: &Connection,
    def: &RelationDef,
    left_id: i64,
    desired: &BTreeMap<i64, Object>,
) -> Result<(Vec<Edge>, EdgeWrites), StoreError> {
    for attrs in desired.values() {
        for column in attrs.keys() {
            if !def.attr_cols.contains(&column.as_str()) {
                return Err(StoreError::UnknownColumn {
                    entity: def.name,
                    column: column.clone(),
                });
            }
        }
    }

    let existing = fetch_edges(conn, def, left_id)?;
    let existing_attrs: BTreeMap<i64, &Object> = existing
        .iter()
        .map(|edge| (edge.right_id, &edge.attributes))
        .collect();

    let mut writes = EdgeWrites::default();
    let mut surviving = Vec::new();

    for (&right_id, attrs) in desired {
        match existing_attrs.get(&right_id) {
            None => {
                insert_edge(conn, def, left_id, right_id, attrs)?;
                writes.created += 1;
                surviving.push(Edge {
                    left_id,
                    right_id,
                    attributes: attrs.clone(),
                });
            }
            Some(stored) => {
                let changed: Object = attrs
                    .iter()
                    .filter(|(column, value)| stored.get(column.as_str()) != Some(*value))
                    .map(|(column, value)| (column.clone(), value.clone()))
                    .collect();
                if !changed.is_empty() {
                    update_edge(conn, def, left_id, right_id, &changed)?;
                    writes.updated += 1;
                }
                let mut attributes = (*stored).clone();
                for (column, value) in &changed {
                    attributes.insert(column.clone(), value.clone());
                }
                surviving.push(Edge {
                    left_id,
                    right_id,
                    attributes,
                });
            }
        }
    }

    for edge in &existing {
        if !desired.contains_key(&edge.right_id) {
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                def.table, def.left_col, def.right_col
            );
            conn.execute(&sql, [left_id, edge.right_id])?;
            writes.deleted += 1;
        }
    }

    surviving.sort_by_key(|edge| edge.right_id);
    Ok((surviving, writes))
}

fn insert_edge(
    conn: &Connection,
    def: &RelationDef,
    left_id: i64,
    right_id: i64,
    attrs: &Object,
) -> Result<(), StoreError> {
    let mut cols = vec![def.left_col, def.right_col];
    let mut vals = vec![
        rusqlite::types::Value::Integer(left_id),
        rusqlite::types::Value::Integer(right_id),
    ];
    for (column, value) in attrs {
        cols.push(column.as_str());
        vals.push(to_sql(column, value)?);
    }
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        def.table,
        cols.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(vals))?;
    Ok(())
}

fn update_edge(
    conn: &Connection,
    def: &RelationDef,
    left_id: i64,
    right_id: i64,
    changed: &Object,
) -> Result<(), StoreError> {
    let mut sets: Vec<String> = Vec::new();
    let mut vals: Vec<rusqlite::types::Value> = Vec::new();
    for (column, value) in changed {
        sets.push(format!("{} = ?{}", column, vals.len() + 1));
        vals.push(to_sql(column, value)?);
    }
    vals.push(rusqlite::types::Value::Integer(left_id));
    vals.push(rusqlite::types::Value::Integer(right_id));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{} AND {} = ?{}",
        def.table,
        sets.join(", "),
        def.left_col,
        vals.len() - 1,
        def.right_col,
        vals.len()
    );
    conn.execute(&sql, rusqlite::params_from_iter(vals))?;
    Ok(())
}
