//! Deep merge used by object patches and default hydration.

use serde_json::{Map, Value};

/// Merge `patch` into `target`.
///
/// Objects present on both sides are merged key by key; any other value in
/// `patch` (array, scalar, null, or an object landing on a non-object)
/// replaces the target value as a whole.
pub fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => merge_map(target, patch),
        (target, patch) => *target = patch.clone(),
    }
}

/// Merge every key of `patch` into `target`, inserting keys it lacks.
pub fn merge_map(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, sub_patch) in patch {
        match target.get_mut(key) {
            Some(current) => merge(current, sub_patch),
            None => {
                target.insert(key.clone(), sub_patch.clone());
            }
        }
    }
}
