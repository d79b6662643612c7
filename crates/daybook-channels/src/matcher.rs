//! The subscription matcher: does this broadcast invalidate that query?

use daybook_types::QueryDescriptor;
use serde_json::Value;

/// Decides whether a broadcast payload invalidates the cached result of
/// `query`.
///
/// - Names ending in `-load` are single-entity fetches: relevant exactly
///   when the payload's identity equals the loaded id.
/// - Names ending in `-list` are collection fetches: relevant when every
///   key of the query's `where` clause is either absent from the payload
///   or equal in both. This is a superset test — it may force an
///   unnecessary refetch, but it never misses a change that could move an
///   item into or out of the result set.
/// - Any other name is conservatively always relevant.
pub fn is_relevant(query: &QueryDescriptor, payload: &Value) -> bool {
    if query.name.ends_with("-load") {
        return query.args.get("id") == payload.get("id");
    }
    if query.name.ends_with("-list") {
        let filter = match query.args.get("where").and_then(Value::as_object) {
            Some(filter) => filter,
            None => return true,
        };
        return filter.iter().all(|(key, wanted)| match payload.get(key) {
            None => true,
            Some(actual) => actual == wanted,
        });
    }
    true
}
