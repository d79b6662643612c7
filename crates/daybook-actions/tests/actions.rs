//! End-to-end tests for the standard actions through the dispatcher.

use daybook_actions::{standard, ActionRegistry, Dispatcher};
use daybook_db::{create_pool, run_migrations, PoolSettings};
use serde_json::{json, Value};
use std::sync::Arc;

fn dispatcher() -> Dispatcher {
    let pool = create_pool(":memory:", PoolSettings::in_memory()).expect("pool");
    {
        let conn = pool.get().expect("connection");
        run_migrations(&conn).expect("migrations");
    }
    let mut registry = ActionRegistry::new();
    standard::register_all(&mut registry).expect("standard actions");
    Dispatcher::new(pool, Arc::new(registry))
}

#[test]
fn event_upsert_with_virtual_id_creates_and_broadcasts_once() {
    let dispatcher = dispatcher();

    let event = dispatcher
        .invoke(
            "event-upsert",
            &json!({"id": -1, "date": "2020-06-22", "title": "Morning run"}),
        )
        .expect("upsert");
    assert_eq!(event["id"], json!(1), "virtual id replaced by a real one");
    assert_eq!(event["details"], json!(""));

    let broadcasts = dispatcher.take_broadcasts();
    assert_eq!(broadcasts.len(), 1, "exactly one broadcast");
    assert_eq!(broadcasts[0].channel, "event-list");
    assert_eq!(broadcasts[0].payload["id"], json!(1));
    assert_eq!(broadcasts[0].payload["date"], json!("2020-06-22"));
}

#[test]
fn event_upsert_rejects_bad_dates() {
    let dispatcher = dispatcher();
    let err = dispatcher
        .invoke(
            "event-upsert",
            &json!({"date": "June 22nd", "title": "Morning run"}),
        )
        .expect_err("invalid date");
    assert!(err.to_string().contains("date"));
    assert!(dispatcher.take_broadcasts().is_empty());
}

#[test]
fn topic_delete_with_dependent_structures_fails_and_rolls_back() {
    let dispatcher = dispatcher();

    let topic = dispatcher
        .invoke("topic-upsert", &json!({"id": -1, "name": "Fitness"}))
        .expect("topic");
    dispatcher
        .invoke(
            "structure-upsert",
            &json!({"id": -1, "name": "Workout", "topic_id": topic["id"]}),
        )
        .expect("structure");
    dispatcher.take_broadcasts();

    let err = dispatcher
        .invoke("topic-delete", &json!({"id": topic["id"]}))
        .expect_err("restrict'd delete");
    assert!(err.is_constraint(), "expected a constraint error: {err}");
    assert!(
        dispatcher.take_broadcasts().is_empty(),
        "failed action must not notify"
    );

    let topics = dispatcher
        .invoke("topic-list", &json!({}))
        .expect("topic-list");
    let names: Vec<&str> = topics
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Fitness"], "topic still present");
}

#[test]
fn structure_keys_are_shared_by_name_and_keep_their_type() {
    let dispatcher = dispatcher();

    let animals = dispatcher
        .invoke(
            "structure-upsert",
            &json!({
                "id": -1,
                "name": "Animals",
                "keys": [
                    {"id": -1, "name": "Size", "value_type": "string"},
                    {"id": -2, "name": "Legs", "value_type": "integer"},
                ],
            }),
        )
        .expect("animals");
    let keys = animals["keys"].as_array().expect("keys");
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0]["name"], json!("Size"));
    assert_eq!(keys[0]["id"], json!(1));
    assert_eq!(keys[1]["name"], json!("Legs"));

    let vehicles = dispatcher
        .invoke(
            "structure-upsert",
            &json!({
                "id": -1,
                "name": "Vehicles",
                "keys": [
                    {"id": -2, "name": "Medium", "value_type": "string"},
                    // Same name, different requested type: the existing key
                    // row is reused and its type is left unchanged.
                    {"id": -1, "name": "Size", "value_type": "integer"},
                ],
            }),
        )
        .expect("vehicles");
    let keys = vehicles["keys"].as_array().expect("keys");
    assert_eq!(keys[0]["name"], json!("Medium"));
    assert_eq!(keys[1]["name"], json!("Size"));
    assert_eq!(keys[1]["id"], json!(1), "Size key row reused");
    assert_eq!(keys[1]["value_type"], json!("string"), "type unchanged");
}

#[test]
fn structure_key_reorder_converges() {
    let dispatcher = dispatcher();

    let structure = dispatcher
        .invoke(
            "structure-upsert",
            &json!({
                "id": -1,
                "name": "Workout",
                "keys": [
                    {"name": "Exercise", "value_type": "string"},
                    {"name": "Reps", "value_type": "integer"},
                ],
            }),
        )
        .expect("create");
    let id = structure["id"].as_i64().expect("id");

    let reordered = dispatcher
        .invoke(
            "structure-upsert",
            &json!({
                "id": id,
                "name": "Workout",
                "keys": [
                    {"name": "Reps", "value_type": "integer"},
                    {"name": "Exercise", "value_type": "string"},
                ],
            }),
        )
        .expect("reorder");
    let names: Vec<&str> = reordered["keys"]
        .as_array()
        .expect("keys")
        .iter()
        .filter_map(|k| k["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Reps", "Exercise"]);

    let emptied = dispatcher
        .invoke(
            "structure-upsert",
            &json!({"id": id, "name": "Workout", "keys": []}),
        )
        .expect("empty key set");
    assert_eq!(emptied["keys"], json!([]));
}

#[test]
fn event_values_validate_against_the_structure() {
    let dispatcher = dispatcher();

    let structure = dispatcher
        .invoke(
            "structure-upsert",
            &json!({
                "id": -1,
                "name": "Workout",
                "keys": [
                    {"name": "Exercise", "value_type": "string"},
                    {"name": "Reps", "value_type": "integer"},
                ],
            }),
        )
        .expect("structure");
    let structure_id = structure["id"].as_i64().expect("id");
    let keys = structure["keys"].as_array().expect("keys");
    let exercise_id = keys[0]["id"].as_i64().expect("key id");
    let reps_id = keys[1]["id"].as_i64().expect("key id");

    let event = dispatcher
        .invoke(
            "event-upsert",
            &json!({
                "id": -1,
                "date": "2020-06-22",
                "title": "Morning run",
                "structure_id": structure_id,
                "values": [
                    {"key_id": exercise_id, "data": "running"},
                    {"key_id": reps_id, "data": "12"},
                ],
            }),
        )
        .expect("event");
    let values = event["values"].as_array().expect("values");
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["data"], json!("running"));
    assert_eq!(values[1]["data"], json!("12"));

    // Integer-typed keys reject non-numeric data, and the whole upsert
    // rolls back with them.
    let err = dispatcher
        .invoke(
            "event-upsert",
            &json!({
                "id": -1,
                "date": "2020-06-23",
                "title": "Bad reps",
                "structure_id": structure_id,
                "values": [{"key_id": reps_id, "data": "many"}],
            }),
        )
        .expect_err("non-integer data");
    assert!(err.to_string().contains("integer"));

    let events = dispatcher
        .invoke("event-list", &json!({}))
        .expect("event-list");
    assert_eq!(events.as_array().expect("array").len(), 1);

    // A key outside the structure is rejected too.
    let err = dispatcher
        .invoke(
            "event-upsert",
            &json!({
                "id": -1,
                "date": "2020-06-23",
                "title": "Wrong key",
                "structure_id": structure_id,
                "values": [{"key_id": 999, "data": "x"}],
            }),
        )
        .expect_err("foreign key id");
    assert!(err.to_string().contains("not part of structure"));
}

#[test]
fn event_list_filters_by_date() {
    let dispatcher = dispatcher();
    for (date, title) in [
        ("2020-06-22", "Morning run"),
        ("2020-06-22", "Lunch"),
        ("2020-06-23", "Sleep in"),
    ] {
        dispatcher
            .invoke("event-upsert", &json!({"date": date, "title": title}))
            .expect("upsert");
    }

    let events = dispatcher
        .invoke("event-list", &json!({"where": {"date": "2020-06-22"}}))
        .expect("filtered list");
    let titles: Vec<&str> = events
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Morning run", "Lunch"]);
}

#[test]
fn value_typeahead_ranks_by_frequency() {
    let dispatcher = dispatcher();

    let structure = dispatcher
        .invoke(
            "structure-upsert",
            &json!({
                "id": -1,
                "name": "Meals",
                "keys": [{"name": "Dish", "value_type": "string"}],
            }),
        )
        .expect("structure");
    let structure_id = structure["id"].as_i64().expect("id");
    let dish_id = structure["keys"][0]["id"].as_i64().expect("key id");

    for (date, dish) in [
        ("2020-06-20", "soup"),
        ("2020-06-21", "salad"),
        ("2020-06-22", "soup"),
        ("2020-06-23", "sandwich"),
    ] {
        dispatcher
            .invoke(
                "event-upsert",
                &json!({
                    "date": date,
                    "title": "Dinner",
                    "structure_id": structure_id,
                    "values": [{"key_id": dish_id, "data": dish}],
                }),
            )
            .expect("event");
    }

    let suggestions = dispatcher
        .invoke(
            "value-typeahead",
            &json!({"structure_id": structure_id, "key_id": dish_id, "prefix": "s"}),
        )
        .expect("typeahead");
    assert_eq!(suggestions, json!(["soup", "salad", "sandwich"]));

    let narrowed = dispatcher
        .invoke(
            "value-typeahead",
            &json!({"structure_id": structure_id, "key_id": dish_id, "prefix": "sa"}),
        )
        .expect("typeahead");
    assert_eq!(narrowed, json!(["salad", "sandwich"]));
}

#[test]
fn shared_values_are_deduplicated_across_events() {
    let dispatcher = dispatcher();

    let structure = dispatcher
        .invoke(
            "structure-upsert",
            &json!({
                "id": -1,
                "name": "Workout",
                "keys": [{"name": "Exercise", "value_type": "string"}],
            }),
        )
        .expect("structure");
    let structure_id = structure["id"].as_i64().expect("id");
    let key_id = structure["keys"][0]["id"].as_i64().expect("key id");

    let mut value_ids = Vec::new();
    for date in ["2020-06-22", "2020-06-23"] {
        let event = dispatcher
            .invoke(
                "event-upsert",
                &json!({
                    "date": date,
                    "title": "Run",
                    "structure_id": structure_id,
                    "values": [{"key_id": key_id, "data": "running"}],
                }),
            )
            .expect("event");
        value_ids.push(event["values"][0]["id"].clone());
    }
    assert_eq!(value_ids[0], value_ids[1], "same (key, data) row reused");
}

#[test]
fn topic_hierarchy_lists_by_parent() {
    let dispatcher = dispatcher();

    let root = dispatcher
        .invoke("topic-upsert", &json!({"name": "Life"}))
        .expect("root");
    let root_id = root["id"].as_i64().expect("id");
    for name in ["Work", "Fitness"] {
        dispatcher
            .invoke("topic-upsert", &json!({"name": name, "parent_id": root_id}))
            .expect("child");
    }

    let children = dispatcher
        .invoke("topic-list", &json!({"where": {"parent_id": root_id}}))
        .expect("children");
    let names: Vec<&str> = children
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Fitness", "Work"], "sorted by name");

    let roots = dispatcher
        .invoke("topic-list", &json!({"where": {"parent_id": null}}))
        .expect("roots");
    assert_eq!(roots.as_array().expect("array").len(), 1);
}

#[test]
fn load_actions_fetch_by_identity() {
    let dispatcher = dispatcher();

    let topic = dispatcher
        .invoke("topic-upsert", &json!({"name": "Fitness"}))
        .expect("topic");
    let loaded = dispatcher
        .invoke("topic-load", &json!({"id": topic["id"]}))
        .expect("load");
    assert_eq!(loaded["name"], json!("Fitness"));

    let err = dispatcher
        .invoke("topic-load", &json!({"id": 404}))
        .expect_err("missing topic");
    assert!(err.is_not_found());
}

#[test]
fn event_delete_broadcasts_the_filterable_fields() {
    let dispatcher = dispatcher();

    let event = dispatcher
        .invoke(
            "event-upsert",
            &json!({"date": "2020-06-22", "title": "Morning run"}),
        )
        .expect("event");
    dispatcher.take_broadcasts();

    dispatcher
        .invoke("event-delete", &json!({"id": event["id"]}))
        .expect("delete");

    let broadcasts = dispatcher.take_broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].channel, "event-list");
    assert_eq!(broadcasts[0].payload["date"], json!("2020-06-22"));

    let events: Value = dispatcher
        .invoke("event-list", &json!({}))
        .expect("event-list");
    assert_eq!(events, json!([]));
}
