//! In-process query backend: the dispatcher and hub seen as one surface.

use crate::dispatcher::Dispatcher;
use daybook_channels::{ChannelHub, QueryBackend, QueryError, Subscription};
use daybook_types::QueryDescriptor;
use serde_json::Value;
use std::sync::Arc;

/// Backs a [`daybook_channels::DataLoader`] with the local dispatcher.
///
/// Queries execute as ordinary actions; subscriptions go to the same hub
/// the dispatcher flushes committed broadcasts into.
pub struct LocalBackend {
    dispatcher: Arc<Dispatcher>,
    hub: Arc<ChannelHub>,
}

impl LocalBackend {
    /// Wires a backend over `dispatcher` and `hub`, attaching the hub as
    /// the dispatcher's delivery target.
    pub fn new(dispatcher: Arc<Dispatcher>, hub: Arc<ChannelHub>) -> Arc<Self> {
        dispatcher.attach_hub(hub.clone());
        Arc::new(Self { dispatcher, hub })
    }
}

impl QueryBackend for LocalBackend {
    fn query(&self, descriptor: &QueryDescriptor) -> Result<Value, QueryError> {
        self.dispatcher
            .invoke(&descriptor.name, &descriptor.args)
            .map_err(Into::into)
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        self.hub.subscribe(channel)
    }
}
