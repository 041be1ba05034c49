//! JSON merge patch (RFC 7386)

use serde_json::{Map, Value};

/// Applies `patch` to `target` following JSON merge patch semantics:
/// objects merge recursively, `null` removes a key, everything else replaces.
pub fn json_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                json_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
