//! The execution context threaded through every action handler.

use crate::error::ActionError;
use crate::registry::ActionRegistry;
use daybook_db::Store;
use daybook_types::Broadcast;
use rusqlite::Transaction;
use serde_json::Value;
use std::cell::RefCell;

/// Everything a handler may touch: the ambient transaction, reentrant
/// dispatch, and the pending broadcast queue.
///
/// One context is created per top-level invoke and passed explicitly into
/// every handler; nested invokes reuse it, so all work in a call tree
/// shares one transaction and one queue. The queue is owned exclusively by
/// this context — it is flushed by the dispatcher after commit or dropped
/// with the context on rollback.
pub struct ActionContext<'a> {
    registry: &'a ActionRegistry,
    tx: &'a Transaction<'a>,
    queued: RefCell<Vec<Broadcast>>,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(registry: &'a ActionRegistry, tx: &'a Transaction<'a>) -> Self {
        Self {
            registry,
            tx,
            queued: RefCell::new(Vec::new()),
        }
    }

    /// Invokes another action on the same transaction.
    ///
    /// This is a plain function call: no new transaction, no new queue.
    /// A failure here fails the whole call tree.
    pub fn invoke(&self, name: &str, input: &Value) -> Result<Value, ActionError> {
        let handler = self
            .registry
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;
        tracing::debug!(action = name, "invoking");
        handler(self, input)
    }

    /// Queues a broadcast for delivery after this transaction commits.
    pub fn broadcast(&self, channel: &str, payload: Value) {
        self.queued
            .borrow_mut()
            .push(Broadcast::new(channel, payload));
    }

    /// The store adapter bound to the ambient transaction.
    pub fn store(&self) -> Store<'a> {
        Store::new(self.tx)
    }

    pub(crate) fn into_broadcasts(self) -> Vec<Broadcast> {
        self.queued.into_inner()
    }
}
