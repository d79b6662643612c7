//! Database layer for the daybook backend.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, embedded SQL migrations, the transaction-scoped
//! relational store adapter, and the edge reconciler. Every table in
//! daybook is created through the versioned migrations managed here.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: a personal logging app is a single-writer,
//!   many-reader workload with no external database process.
//! - **Foreign keys ON everywhere**: the restrict/cascade split on edge
//!   tables is load-bearing — deletes that would orphan referenced rows
//!   must fail at the store, and the action layer surfaces that failure
//!   unchanged.
//! - **Embedded migrations**: SQL ships inside the binary via
//!   `include_str!` and cannot drift from the code that depends on it.

mod edges;
mod migrations;
mod pool;
mod schema;
mod store;

pub use edges::{reconcile_edges, Edge, EdgeWrites};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, PoolError, PoolSettings};
pub use schema::{entity, relation, EntityDef, RelationDef};
pub use store::{Store, StoreError};
