//! Criteria lookup and layering
//!
//! Criteria are plain JSON objects supplied at call time and/or bound
//! persistently on a [`Store`](crate::Store). Filters, ranges, and params
//! reference them by dotted path (e.g. `"a.b"`).

use serde_json::Value;

/// Look up a dotted path (e.g. `"a.b"`) in a criteria object.
///
/// Returns `None` for any missing intermediate key. An explicit `null`
/// counts as absent, so a caller can mask a bound value without
/// substituting one of its own.
pub fn reach<'a>(criteria: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = criteria;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() { None } else { Some(current) }
}

/// Deep merge `overlay` into `base`.
///
/// If both values are objects, merge them recursively with `overlay`
/// taking precedence at leaves. Otherwise `overlay` replaces `base`.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_map.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// String form of a scalar criterion, used to match filter case keys.
///
/// Objects and arrays are not usable criterion values and yield `None`.
pub fn criterion_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric form of a scalar criterion, used for range comparison.
pub fn criterion_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}
