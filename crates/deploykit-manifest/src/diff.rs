//! Two-way apply diff.
//!
//! Given the previously-applied baseline and the new desired manifest,
//! compute the merge-patch document that moves the live object to the
//! desired state: keys that disappeared from the desired manifest are set
//! to `null` so the merge patch removes them; keys present in both
//! recurse; arrays are replaced wholesale (merge patch has no array merge
//! semantics); keys only in the desired manifest pass through unchanged.
//!
//! This is deliberately a two-way diff against the stored baseline, not a
//! three-way merge against live divergence.

use serde_json::{Map, Value};

/// Compute the merge-patch document for `desired` relative to
/// `last_applied`.
pub fn diff_for_apply(last_applied: &Value, desired: &Value) -> Value {
    match (last_applied, desired) {
        (Value::Object(baseline_map), Value::Object(desired_map)) => {
            let mut patch = Map::new();
            for (key, baseline_value) in baseline_map {
                match desired_map.get(key) {
                    None => {
                        // Removed relative to the baseline: explicit null
                        // deletes the field under merge-patch semantics.
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(desired_value) => {
                        patch.insert(key.clone(), diff_value(baseline_value, desired_value));
                    }
                }
            }
            for (key, desired_value) in desired_map {
                if !baseline_map.contains_key(key) {
                    patch.insert(key.clone(), desired_value.clone());
                }
            }
            Value::Object(patch)
        }
        // Non-object roots cannot express deletion; send desired as-is.
        _ => desired.clone(),
    }
}

fn diff_value(baseline: &Value, desired: &Value) -> Value {
    match (baseline, desired) {
        (Value::Object(_), Value::Object(_)) => diff_for_apply(baseline, desired),
        // Arrays replace rather than merge.
        (Value::Array(_), Value::Array(_)) => desired.clone(),
        _ => desired.clone(),
    }
}
