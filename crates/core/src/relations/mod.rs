//! `$rel` relation helpers
//!
//! Backend responses may contain objects carrying a `$rel` template that
//! points at the full resource. Enrichment fetches that resource and merges
//! it into the object. This module holds the pure parts: detecting a
//! relation and merging a fetched document.

pub mod template;

use bizberry_domain::constants::{RELATION_FETCHED_AT_KEY, RELATION_KEY, RELATION_UPDATED_AT_KEY};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// The `$rel` template of `object`, if it has a string one.
pub fn relation_template(object: &Map<String, Value>) -> Option<&str> {
    object.get(RELATION_KEY).and_then(Value::as_str)
}

/// Merge a fetched relation document into `target`.
///
/// Fields of `fetched` overwrite fields of `target`, `$rel` is removed and the
/// cache timestamps are stamped. Returns `false` (leaving `target` untouched)
/// when `fetched` is not an object.
pub fn merge_relation(
    target: &mut Map<String, Value>,
    fetched: Value,
    fetched_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> bool {
    let Value::Object(fields) = fetched else {
        return false;
    };

    target.remove(RELATION_KEY);
    for (key, value) in fields {
        if key == RELATION_KEY {
            continue;
        }
        target.insert(key, value);
    }
    target.insert(RELATION_FETCHED_AT_KEY.to_string(), Value::String(rfc3339(fetched_at)));
    target.insert(RELATION_UPDATED_AT_KEY.to_string(), Value::String(rfc3339(updated_at)));
    true
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
