//! The live query cache: a query that keeps itself fresh via subscription.

use crate::hub::Subscription;
use crate::matcher::is_relevant;
use daybook_types::QueryDescriptor;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors surfaced by a query backend.
pub type QueryError = Box<dyn std::error::Error + Send + Sync>;

/// Where the loader gets its data and its subscriptions.
///
/// The in-process implementation wraps the action dispatcher and the
/// channel hub; tests substitute their own.
pub trait QueryBackend: Send + Sync {
    /// Executes the query described by `descriptor`.
    fn query(&self, descriptor: &QueryDescriptor) -> Result<Value, QueryError>;

    /// Registers a waiter on `channel`.
    fn subscribe(&self, channel: &str) -> Subscription;
}

enum Command {
    Reload { force: bool },
    Stop,
}

enum Wake {
    Command(Option<Command>),
    Notified(Option<Value>),
}

/// A cached query kept fresh by broadcast subscription.
///
/// The loader runs as its own task. Each cycle it holds at most one armed
/// waiter on the channel named after the served query. When the channel
/// fires, the matcher decides: a relevant payload forces a refetch and a
/// fresh delivery to the callback; an irrelevant one re-arms the waiter
/// and leaves the cached data untouched.
pub struct DataLoader {
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl DataLoader {
    /// Starts a loader.
    ///
    /// `get_input` produces the currently desired query descriptor (it is
    /// re-evaluated on every [`reload`](Self::reload)); `on_data` receives
    /// each delivered result. The initial load happens immediately.
    pub fn spawn(
        backend: std::sync::Arc<dyn QueryBackend>,
        get_input: impl Fn() -> QueryDescriptor + Send + 'static,
        on_data: impl Fn(Value) + Send + 'static,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            backend,
            get_input: Box::new(get_input),
            on_data: Box::new(on_data),
            served: None,
            subscription: None,
        };
        let task = tokio::spawn(driver.run(rx));
        Self {
            commands,
            task: Some(task),
        }
    }

    /// Re-evaluates the desired descriptor and refetches if it changed.
    ///
    /// A descriptor deep-equal to the one currently served is deduped.
    pub fn reload(&self) {
        let _ = self.commands.send(Command::Reload { force: false });
    }

    /// Refetches even if the descriptor is unchanged.
    pub fn force_reload(&self) {
        let _ = self.commands.send(Command::Reload { force: true });
    }

    /// Cancels the outstanding subscription and ends the loader task.
    pub async fn stop(&mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for DataLoader {
    fn drop(&mut self) {
        // Best effort: a dropped loader must not leave its task waiting.
        let _ = self.commands.send(Command::Stop);
    }
}

struct Driver {
    backend: std::sync::Arc<dyn QueryBackend>,
    get_input: Box<dyn Fn() -> QueryDescriptor + Send>,
    on_data: Box<dyn Fn(Value) + Send>,
    served: Option<QueryDescriptor>,
    subscription: Option<Subscription>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.reload(false);

        loop {
            let wake = tokio::select! {
                cmd = commands.recv() => Wake::Command(cmd),
                payload = wait_for(&mut self.subscription) => Wake::Notified(payload),
            };

            match wake {
                Wake::Command(Some(Command::Reload { force })) => self.reload(force),
                Wake::Command(Some(Command::Stop)) | Wake::Command(None) => break,
                Wake::Notified(Some(payload)) => {
                    self.subscription = None;
                    let relevant = self
                        .served
                        .as_ref()
                        .map_or(true, |served| is_relevant(served, &payload));
                    if relevant {
                        tracing::debug!(
                            query = self.served.as_ref().map(|s| s.name.as_str()),
                            "relevant broadcast, reloading"
                        );
                        self.reload(true);
                    } else {
                        tracing::debug!(
                            query = self.served.as_ref().map(|s| s.name.as_str()),
                            "irrelevant broadcast, re-arming"
                        );
                        self.rearm();
                    }
                }
                // The waiter was detached out from under us; stay idle
                // until the next command.
                Wake::Notified(None) => self.subscription = None,
            }
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    fn reload(&mut self, force: bool) {
        let input = (self.get_input)();
        if !force && self.served.as_ref() == Some(&input) {
            return;
        }

        if let Some(mut old) = self.subscription.take() {
            old.cancel();
        }
        // Subscribe before querying: a commit landing between the query's
        // snapshot and the waiter registration must still wake us.
        self.subscription = Some(self.backend.subscribe(&input.name));

        match self.backend.query(&input) {
            Ok(data) => (self.on_data)(data),
            // Keep the waiter armed; a later broadcast retries the fetch.
            Err(e) => tracing::warn!(query = %input.name, error = %e, "live query fetch failed"),
        }
        self.served = Some(input);
    }

    fn rearm(&mut self) {
        if let Some(served) = &self.served {
            self.subscription = Some(self.backend.subscribe(&served.name));
        }
    }
}

async fn wait_for(subscription: &mut Option<Subscription>) -> Option<Value> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ChannelHub;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct MockBackend {
        hub: Arc<ChannelHub>,
        data: Mutex<Value>,
        queries: AtomicUsize,
    }

    impl MockBackend {
        fn new(hub: Arc<ChannelHub>, data: Value) -> Arc<Self> {
            Arc::new(Self {
                hub,
                data: Mutex::new(data),
                queries: AtomicUsize::new(0),
            })
        }

        fn set_data(&self, data: Value) {
            *self.data.lock().expect("data lock") = data;
        }

        fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    impl QueryBackend for MockBackend {
        fn query(&self, _descriptor: &QueryDescriptor) -> Result<Value, QueryError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.data.lock().expect("data lock").clone())
        }

        fn subscribe(&self, channel: &str) -> Subscription {
            self.hub.subscribe(channel)
        }
    }

    async fn armed(hub: &ChannelHub, channel: &str) {
        for _ in 0..200 {
            if hub.waiter_count(channel) == 1 {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("waiter on {channel} never armed");
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("loader hung up")
    }

    fn event_list_loader(
        backend: Arc<MockBackend>,
    ) -> (DataLoader, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let loader = DataLoader::spawn(
            backend,
            || QueryDescriptor::new("event-list", json!({"where": {"date": "2020-06-22"}})),
            move |data| {
                let _ = tx.send(data);
            },
        );
        (loader, rx)
    }

    #[tokio::test]
    async fn initial_load_delivers_and_arms() {
        let hub = ChannelHub::new();
        let backend = MockBackend::new(hub.clone(), json!([{"id": 7}]));
        let (mut loader, mut rx) = event_list_loader(backend.clone());

        assert_eq!(next(&mut rx).await, json!([{"id": 7}]));
        armed(&hub, "event-list").await;
        assert_eq!(backend.query_count(), 1);

        loader.stop().await;
    }

    #[tokio::test]
    async fn relevant_broadcast_forces_reload() {
        let hub = ChannelHub::new();
        let backend = MockBackend::new(hub.clone(), json!([{"id": 7}]));
        let (mut loader, mut rx) = event_list_loader(backend.clone());

        next(&mut rx).await;
        armed(&hub, "event-list").await;

        backend.set_data(json!([{"id": 7}, {"id": 8}]));
        hub.fire("event-list", json!({"date": "2020-06-22", "id": 8}));

        assert_eq!(next(&mut rx).await, json!([{"id": 7}, {"id": 8}]));
        armed(&hub, "event-list").await;
        assert_eq!(backend.query_count(), 2);

        loader.stop().await;
    }

    #[tokio::test]
    async fn irrelevant_broadcast_rearms_silently() {
        let hub = ChannelHub::new();
        let backend = MockBackend::new(hub.clone(), json!([{"id": 7}]));
        let (mut loader, mut rx) = event_list_loader(backend.clone());

        next(&mut rx).await;
        armed(&hub, "event-list").await;

        hub.fire("event-list", json!({"date": "2020-06-23", "id": 9}));

        armed(&hub, "event-list").await;
        assert_eq!(backend.query_count(), 1, "no refetch for a different date");
        let outcome = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err(), "cached data must not be redelivered");

        loader.stop().await;
    }

    #[tokio::test]
    async fn identical_descriptor_is_deduped() {
        let hub = ChannelHub::new();
        let backend = MockBackend::new(hub.clone(), json!([]));
        let (mut loader, mut rx) = event_list_loader(backend.clone());

        next(&mut rx).await;
        armed(&hub, "event-list").await;

        loader.reload();
        let outcome = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err(), "unchanged descriptor must not refetch");
        assert_eq!(backend.query_count(), 1);

        loader.force_reload();
        next(&mut rx).await;
        assert_eq!(backend.query_count(), 2);

        loader.stop().await;
    }

    #[tokio::test]
    async fn changed_descriptor_moves_the_subscription() {
        let hub = ChannelHub::new();
        let backend = MockBackend::new(hub.clone(), json!([]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let desired = Arc::new(Mutex::new(QueryDescriptor::new(
            "event-list",
            json!({"where": {"date": "2020-06-22"}}),
        )));
        let desired_for_loader = desired.clone();
        let mut loader = DataLoader::spawn(
            backend.clone(),
            move || desired_for_loader.lock().expect("desired lock").clone(),
            move |data| {
                let _ = tx.send(data);
            },
        );

        next(&mut rx).await;
        armed(&hub, "event-list").await;

        *desired.lock().expect("desired lock") =
            QueryDescriptor::new("topic-list", json!({}));
        loader.reload();

        next(&mut rx).await;
        armed(&hub, "topic-list").await;
        assert_eq!(hub.waiter_count("event-list"), 0, "old waiter detached");

        loader.stop().await;
    }

    #[tokio::test]
    async fn stop_cancels_the_outstanding_subscription() {
        let hub = ChannelHub::new();
        let backend = MockBackend::new(hub.clone(), json!([]));
        let (mut loader, mut rx) = event_list_loader(backend.clone());

        next(&mut rx).await;
        armed(&hub, "event-list").await;

        loader.stop().await;
        assert_eq!(hub.waiter_count("event-list"), 0);
    }
}
