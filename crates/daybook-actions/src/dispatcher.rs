//! The transactional action dispatcher.

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::ActionRegistry;
use daybook_channels::ChannelHub;
use daybook_db::DbPool;
use daybook_types::Broadcast;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Executes named actions, one transaction per top-level invoke.
///
/// Broadcasts queued during an invoke are flushed in FIFO order strictly
/// after the commit. When a [`ChannelHub`] is attached the flush fires the
/// hub; when none is (headless or under test) the flushed broadcasts are
/// retained for inspection via [`take_broadcasts`](Self::take_broadcasts),
/// which clears them on read.
pub struct Dispatcher {
    pool: DbPool,
    registry: Arc<ActionRegistry>,
    hub: RwLock<Option<Arc<ChannelHub>>>,
    retained: Mutex<Vec<Broadcast>>,
}

impl Dispatcher {
    pub fn new(pool: DbPool, registry: Arc<ActionRegistry>) -> Self {
        Self {
            pool,
            registry,
            hub: RwLock::new(None),
            retained: Mutex::new(Vec::new()),
        }
    }

    /// Attaches the live delivery target. Until this is called, committed
    /// broadcasts accumulate in the retained buffer instead.
    pub fn attach_hub(&self, hub: Arc<ChannelHub>) {
        *self
            .hub
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(hub);
    }

    /// Executes the action registered under `name` in one transaction.
    ///
    /// On any failure — unknown name, validation, store constraint — the
    /// transaction rolls back, the pending broadcast queue is discarded,
    /// and the error propagates unchanged. On success the transaction
    /// commits and only then are the queued broadcasts flushed.
    pub fn invoke(&self, name: &str, input: &Value) -> Result<Value, ActionError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let ctx = ActionContext::new(&self.registry, &tx);

        let output = match ctx.invoke(name, input) {
            Ok(output) => output,
            Err(e) => {
                // Dropping the transaction rolls it back; the queue dies
                // with the context.
                tracing::debug!(action = name, error = %e, "action failed, rolling back");
                return Err(e);
            }
        };

        let queued = ctx.into_broadcasts();
        tx.commit()?;
        tracing::debug!(action = name, broadcasts = queued.len(), "action committed");
        self.flush(queued);
        Ok(output)
    }

    /// Drains the retained buffer (headless mode), clearing it on read.
    pub fn take_broadcasts(&self) -> Vec<Broadcast> {
        std::mem::take(
            &mut *self
                .retained
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn flush(&self, queued: Vec<Broadcast>) {
        if queued.is_empty() {
            return;
        }
        let hub = self
            .hub
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match hub {
            Some(hub) => {
                for broadcast in queued {
                    hub.fire(&broadcast.channel, broadcast.payload);
                }
            }
            None => self
                .retained
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(queued),
        }
    }
}
