//! Merge primitives for manifest trees.
//!
//! Two flavors, matching the composition engine's strategies:
//!
//! - [`deep_merge`]: object keys merge recursively, arrays concatenate,
//!   scalars take the overlay value.
//! - [`shallow_merge`]: top-level key replacement only.

use serde_json::Value;

/// Recursively merge `overlay` into `base`.
///
/// Object keys present in both sides merge recursively; arrays present in
/// both sides are concatenated (overlay entries appended after base
/// entries); any other combination takes the overlay value wholesale.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(overlay_items)) => {
            base_items.extend(overlay_items.iter().cloned());
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

/// Replace top-level keys of `base` with those of `overlay`.
///
/// When either side is not an object the overlay replaces base wholesale.
pub fn shallow_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                base_map.insert(key.clone(), overlay_value.clone());
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_unions_nested_maps() {
        let mut base = json!({"a": {"x": 1}});
        deep_merge(&mut base, &json!({"a": {"y": 2}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn deep_merge_concatenates_arrays() {
        let mut base = json!({"items": [1, 2]});
        deep_merge(&mut base, &json!({"items": [3]}));
        assert_eq!(base, json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn deep_merge_scalar_takes_overlay() {
        let mut base = json!({"replicas": 1, "image": "old"});
        deep_merge(&mut base, &json!({"replicas": 3}));
        assert_eq!(base, json!({"replicas": 3, "image": "old"}));
    }

    #[test]
    fn deep_merge_mixed_shapes_take_overlay() {
        let mut base = json!({"spec": {"a": 1}});
        deep_merge(&mut base, &json!({"spec": [1]}));
        assert_eq!(base["spec"], json!([1]));
    }

    #[test]
    fn shallow_merge_replaces_whole_top_level_values() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": 1});
        shallow_merge(&mut base, &json!({"a": {"z": 3}}));
        assert_eq!(base, json!({"a": {"z": 3}, "b": 1}));
    }

    #[test]
    fn shallow_merge_non_object_overlay_replaces_base() {
        let mut base = json!({"a": 1});
        shallow_merge(&mut base, &json!("raw"));
        assert_eq!(base, json!("raw"));
    }
}
