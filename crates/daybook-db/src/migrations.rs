//! Embedded SQL migration runner.
//!
//! Migrations are SQL files compiled into the binary. They run
//! sequentially on startup, tracked by the `_daybook_migrations` table,
//! and each runs exactly once inside its own transaction.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_topics",
        sql: include_str!("migrations/000_topics.sql"),
    },
    Migration {
        name: "001_structures",
        sql: include_str!("migrations/001_structures.sql"),
    },
    Migration {
        name: "002_events",
        sql: include_str!("migrations/002_events.sql"),
    },
];

/// Errors that can occur while applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A statement inside a migration failed; the migration rolled back.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    /// The migration tracking table could not be queried.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations, returning how many were applied.
///
/// Already-applied migrations (tracked in `_daybook_migrations`) are
/// skipped, so calling this on every startup is safe.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migration_list(conn, MIGRATIONS)
}

fn run_migration_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _daybook_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: "_daybook_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _daybook_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(migration = migration.name, "already applied, skipping");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _daybook_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn fresh_db_applies_all() {
        let conn = Connection::open_in_memory().expect("open");
        let applied = run_migrations(&conn).expect("migrations");
        assert_eq!(applied, MIGRATIONS.len());

        for table in [
            "topics",
            "structures",
            "structure_keys",
            "structure_to_keys",
            "events",
            "event_values",
            "event_to_values",
        ] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .expect("sqlite_master");
            assert!(exists, "table {table} should exist");
        }
    }

    #[test]
    fn second_run_is_noop() {
        let conn = Connection::open_in_memory().expect("open");
        assert_eq!(run_migrations(&conn).expect("first"), MIGRATIONS.len());
        assert_eq!(run_migrations(&conn).expect("second"), 0);
    }

    #[test]
    fn failed_migration_rolls_back() {
        let conn = Connection::open_in_memory().expect("open");
        let migrations = [Migration {
            name: "900_broken",
            sql: "CREATE TABLE half_done (id INTEGER PRIMARY KEY);
                  CREATE TABLE half_done (id INTEGER PRIMARY KEY);",
        }];

        let err = run_migration_list(&conn, &migrations).expect_err("duplicate table");
        match err {
            MigrationError::ExecutionFailed { name, .. } => assert_eq!(name, "900_broken"),
            other => panic!("unexpected error: {other:?}"),
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'half_done')",
                [],
                |row| row.get(0),
            )
            .expect("sqlite_master");
        assert!(!exists, "partial migration should have rolled back");
    }
}
