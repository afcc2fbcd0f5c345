//! Field-level change detection between two snapshots.
//!
//! Snapshots are compared on their serialized form, so the names returned
//! are the camelCase keys consumers see in `eventEntity`, in the order the
//! snapshot declares its fields.

use serde::Serialize;
use serde_json::{Map, Value};

/// Names of the top-level fields whose values differ between `before` and
/// `after`. A field present on only one side counts as changed.
pub fn changed_fields<T: Serialize>(before: &T, after: &T) -> Result<Vec<String>, serde_json::Error> {
    let before = to_object(before)?;
    let after = to_object(after)?;

    let mut changed: Vec<String> = after
        .iter()
        .filter(|(name, value)| before.get(name.as_str()) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect();
    changed.extend(
        before
            .keys()
            .filter(|name| !after.contains_key(name.as_str()))
            .cloned(),
    );
    Ok(changed)
}

/// Every top-level field name of `snapshot`. Used for deletions.
pub fn all_fields<T: Serialize>(snapshot: &T) -> Result<Vec<String>, serde_json::Error> {
    Ok(to_object(snapshot)?.keys().cloned().collect())
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}
