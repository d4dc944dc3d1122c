//! Canonical JSON encoding.
//!
//! The last-applied annotation must encode identically across runs so that
//! diffing against it is stable; object keys are therefore emitted in
//! sorted order.

use serde_json::Value;

/// Serialize `value` with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json escapes the key string for us.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        other => {
            out.push_str(&serde_json::to_string(other).unwrap_or_default());
        }
    }
}
