use daybook_db::{create_pool, run_migrations, PoolSettings};

#[test]
fn db_initialization_works() {
    let pool = create_pool(":memory:", PoolSettings::in_memory()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn).expect("failed to run migrations");
    assert_eq!(applied, 3);

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to list tables")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(
        tables,
        vec![
            "_daybook_migrations",
            "event_to_values",
            "event_values",
            "events",
            "structure_keys",
            "structure_to_keys",
            "structures",
            "topics",
        ]
    );
}

#[test]
fn migrations_idempotent_through_pool() {
    let pool = create_pool(":memory:", PoolSettings::in_memory()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    assert_eq!(run_migrations(&conn).expect("first run"), 3);
    assert_eq!(run_migrations(&conn).expect("second run"), 0);
}
