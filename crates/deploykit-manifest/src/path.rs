//! Nested path access over manifest trees.
//!
//! The composer builds manifests incrementally, so the mutating helpers
//! create intermediate objects on demand (`ensure_*`) rather than failing
//! on a missing parent. A node of the wrong shape on the path is an
//! [`ManifestError::UnexpectedShape`] naming where the walk stopped.

use crate::error::{ManifestError, ManifestResult};
use serde_json::{Map, Value};

/// Walk `segments` down `value`, returning the node at the end of the path.
pub fn get_path<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Mutable variant of [`get_path`]. Does not create missing nodes.
pub fn get_path_mut<'a>(value: &'a mut Value, segments: &[&str]) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in segments {
        current = current.get_mut(segment)?;
    }
    Some(current)
}

fn wrong_shape(segments: &[&str], upto: usize, expected: &'static str) -> ManifestError {
    let path = if upto == 0 { "(root)".to_string() } else { segments[..upto].join(".") };
    ManifestError::UnexpectedShape { path, expected }
}

/// Walk `segments`, creating empty objects for any missing intermediate
/// node, and return the object map at the end of the path. An existing
/// node of the wrong shape on the path is an error.
pub fn ensure_object_mut<'a>(
    value: &'a mut Value,
    segments: &[&str],
) -> ManifestResult<&'a mut Map<String, Value>> {
    let mut current = value;
    for (depth, segment) in segments.iter().enumerate() {
        let map = current
            .as_object_mut()
            .ok_or_else(|| wrong_shape(segments, depth, "object"))?;
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    current
        .as_object_mut()
        .ok_or_else(|| wrong_shape(segments, segments.len(), "object"))
}

/// Like [`ensure_object_mut`] but the leaf node is an array, created empty
/// when absent.
pub fn ensure_array_mut<'a>(
    value: &'a mut Value,
    segments: &[&str],
) -> ManifestResult<&'a mut Vec<Value>> {
    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| wrong_shape(segments, 0, "array"))?;
    let parent = if parents.is_empty() {
        value
            .as_object_mut()
            .ok_or_else(|| wrong_shape(segments, 0, "object"))?
    } else {
        ensure_object_mut(value, parents)?
    };
    parent
        .entry(leaf.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| wrong_shape(segments, segments.len(), "array"))
}
