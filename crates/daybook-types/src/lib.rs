//! Shared value types for the daybook backend.
//!
//! This crate provides the cross-cutting types used by every other daybook
//! crate: query descriptors, broadcast tuples, JSON object aliases, and the
//! virtual-id convention for not-yet-persisted entities.
//!
//! No crate in the workspace depends on anything *except* `daybook-types`
//! for these definitions, which keeps the dependency graph acyclic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// A JSON object: the universal shape of entity rows, action inputs, and
/// where-clauses throughout the backend.
pub type Object = serde_json::Map<String, Value>;

/// The shape of a query as seen by the live-update machinery.
///
/// `name` is the action name that produced (or will produce) the data;
/// `args` is the action input. Two descriptors are interchangeable exactly
/// when they are deep-equal, which is what the live query cache uses to
/// dedupe repeated requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Action name, e.g. `"event-list"`.
    pub name: String,
    /// Action input, e.g. `{"where": {"date": "2020-06-22"}}`.
    #[serde(default)]
    pub args: Value,
}

impl QueryDescriptor {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// A `(channel, payload)` notification queued during an action and flushed
/// only after its transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    /// Channel name, conventionally the query name it invalidates.
    pub channel: String,
    /// Partial item carrying the identity and filterable fields.
    pub payload: Value,
}

impl Broadcast {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }
}

/// Returns true if `id` denotes an entity that has not been persisted yet.
///
/// Clients allocate negative placeholder ids for new entities; upsert-style
/// actions replace them with freshly assigned positive ids on create.
pub fn is_virtual_id(id: i64) -> bool {
    id < 0
}

/// Returns true if `id` denotes a persisted entity.
pub fn is_real_id(id: i64) -> bool {
    id > 0
}

/// Allocator for client-side virtual ids (-1, -2, ...).
///
/// Each allocator hands out a strictly decreasing sequence, so distinct
/// unsaved entities within one editing session never collide.
#[derive(Debug, Default)]
pub struct VirtualIds(AtomicI64);

impl VirtualIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next virtual id.
    pub fn next(&self) -> i64 {
        self.0.fetch_sub(1, Ordering::Relaxed) - 1
    }
}
