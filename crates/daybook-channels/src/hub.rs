//! Named broadcast channels with one-shot waiters.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Value>,
}

#[derive(Default)]
struct HubState {
    next_waiter: u64,
    waiters: HashMap<String, Vec<Waiter>>,
}

/// The in-process delivery target for committed broadcasts.
///
/// Channels exist implicitly: subscribing names one, firing one resolves
/// whoever is currently waiting on it. A broadcast on a channel with no
/// waiters is dropped — consumers own their re-subscription cadence, and
/// nothing is buffered on their behalf.
#[derive(Default)]
pub struct ChannelHub {
    state: Mutex<HubState>,
}

impl ChannelHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a waiter on `channel`.
    ///
    /// The returned subscription resolves at most once; cancel it (or drop
    /// it) to detach before resolution.
    pub fn subscribe(self: &Arc<Self>, channel: &str) -> Subscription {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut state = self.lock();
            let id = state.next_waiter;
            state.next_waiter += 1;
            state
                .waiters
                .entry(channel.to_string())
                .or_default()
                .push(Waiter { id, tx });
            id
        };
        Subscription {
            hub: Arc::clone(self),
            channel: channel.to_string(),
            id,
            rx: Some(rx),
        }
    }

    /// Resolves every waiter currently registered on `channel` with
    /// `payload` and removes them.
    pub fn fire(&self, channel: &str, payload: Value) {
        let waiters = self.lock().waiters.remove(channel);
        match waiters {
            Some(waiters) if !waiters.is_empty() => {
                tracing::debug!(channel, count = waiters.len(), "firing channel");
                for waiter in waiters {
                    // A receiver that disappeared between subscribe and
                    // fire is indistinguishable from a cancel; ignore it.
                    let _ = waiter.tx.send(payload.clone());
                }
            }
            _ => tracing::debug!(channel, "fired channel with no waiters"),
        }
    }

    /// Number of waiters currently armed on `channel`.
    pub fn waiter_count(&self, channel: &str) -> usize {
        self.lock().waiters.get(channel).map_or(0, Vec::len)
    }

    fn detach(&self, channel: &str, id: u64) {
        let mut state = self.lock();
        if let Some(waiters) = state.waiters.get_mut(channel) {
            waiters.retain(|waiter| waiter.id != id);
            if waiters.is_empty() {
                state.waiters.remove(channel);
            }
        }
    }
}

/// One armed waiter on one channel.
pub struct Subscription {
    hub: Arc<ChannelHub>,
    channel: String,
    id: u64,
    rx: Option<oneshot::Receiver<Value>>,
}

impl Subscription {
    /// The channel this subscription is armed on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the channel to fire.
    ///
    /// Returns `Some(payload)` when the channel fires, `None` when the
    /// subscription was cancelled or already resolved. Cancellation is a
    /// normal teardown outcome, not an error. Cancel-safe: dropping the
    /// future leaves the waiter armed.
    pub async fn recv(&mut self) -> Option<Value> {
        let rx = self.rx.as_mut()?;
        let outcome = rx.await.ok();
        self.rx = None;
        outcome
    }

    /// Detaches the waiter before resolution.
    pub fn cancel(&mut self) {
        if self.rx.take().is_some() {
            self.hub.detach(&self.channel, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.rx.is_some() {
            self.hub.detach(&self.channel, self.id);
        }
    }
}
