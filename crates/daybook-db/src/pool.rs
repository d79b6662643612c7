//! Connection pool creation and SQLite configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Runtime tunables for the SQLite connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Busy timeout applied to every connection, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Maximum number of pooled connections.
    ///
    /// For `:memory:` databases this must be 1 — each in-memory connection
    /// is its own database, so only a single shared connection sees a
    /// consistent store.
    pub max_connections: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            max_connections: 4,
        }
    }
}

impl PoolSettings {
    /// Settings for an in-memory test database: a single connection.
    pub fn in_memory() -> Self {
        Self {
            max_connections: 1,
            ..Self::default()
        }
    }
}

/// The SQLite connection pool shared by the dispatcher and the server.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Creates a connection pool with WAL journaling and foreign keys enabled.
///
/// Pass `":memory:"` (with [`PoolSettings::in_memory`]) for a throwaway
/// test database.
///
/// # Errors
///
/// Returns [`PoolError::PoolInit`] if the pool cannot be built, which
/// includes the case where the first connection fails its pragmas.
pub fn create_pool(db_path: &str, settings: PoolSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let busy_timeout_ms = settings.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory" instead of "wal"; both
            // are acceptable.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("unexpected journal mode: {journal_mode}")),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {busy_timeout_ms};"
            ))
        });

    let pool = Pool::builder()
        .max_size(settings.max_connections)
        .build(manager)?;

    Ok(pool)
}
