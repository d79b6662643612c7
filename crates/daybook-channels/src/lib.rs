//! Live-update channels for the daybook backend.
//!
//! Three pieces cooperate to keep client-side query results fresh without
//! polling:
//!
//! - [`ChannelHub`]: named notification channels with one-shot waiters.
//!   Firing a channel resolves every waiter currently registered on it and
//!   removes them; a consumer that wants the next notification subscribes
//!   again. Nothing is buffered for absent consumers.
//! - [`is_relevant`]: the subscription matcher — given the shape of the
//!   query behind a cached result and a broadcast payload, decides whether
//!   the cache is now stale.
//! - [`DataLoader`]: the live query cache — issues a query, delivers the
//!   result, and keeps one armed waiter on the query's channel, reloading
//!   on relevant broadcasts and silently re-arming on irrelevant ones.

mod hub;
mod loader;
mod matcher;

pub use hub::{ChannelHub, Subscription};
pub use loader::{DataLoader, QueryBackend, QueryError};
pub use matcher::is_relevant;
