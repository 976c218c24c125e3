//! Recursive deep merge.
//!
//! Objects merge key by key, arrays merge index by index with `Undefined`
//! source entries skipped, and anything else (leaves, opaque values, or a
//! container kind mismatch) is replaced by the source. The result shares
//! every branch the source did not change, and merging a no-op source hands
//! back the target itself.

use crate::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Merge `source` into `target` and return the combined value.
///
/// ```
/// use tirea_history::{merge_values, Value};
/// use serde_json::json;
///
/// let target = Value::from(json!({"a": {"x": 1}, "b": [1, 2, 3]}));
/// let source = Value::from(json!({"a": {"y": 2}, "b": [9]}));
/// let merged = merge_values(&target, &source);
/// assert_eq!(merged, json!({"a": {"x": 1, "y": 2}, "b": [9, 2, 3]}));
///
/// // Nothing to do: the target comes back untouched.
/// let same = merge_values(&target, &Value::from(json!({})));
/// assert!(same.same_ref(&target));
/// ```
pub fn merge_values(target: &Value, source: &Value) -> Value {
    let mut ancestors = HashSet::new();
    merge_inner(target, source, &mut ancestors)
}

fn merge_inner(target: &Value, source: &Value, ancestors: &mut HashSet<*const ()>) -> Value {
    if target.same_ref(source) || !target.same_kind(source) {
        return source.clone();
    }

    // Re-entering a source container that is already being merged further up
    // means the source is cyclic; leave the target as it is.
    let Some(ptr) = source.container_ptr() else {
        return source.clone();
    };
    if !ancestors.insert(ptr) {
        return target.clone();
    }

    let merged = match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            let mut out: Option<crate::Map> = None;
            for (key, incoming) in s.iter() {
                let existing = t.get(key);
                let next = match existing {
                    Some(current) if current.is_container() && incoming.is_container() => {
                        merge_inner(current, incoming, ancestors)
                    }
                    _ => incoming.clone(),
                };
                if existing.is_some_and(|current| current.same_ref(&next)) {
                    continue;
                }
                out.get_or_insert_with(|| (**t).clone())
                    .insert(key.clone(), next);
            }
            out.map_or_else(|| target.clone(), |map| Value::Object(Arc::new(map)))
        }
        (Value::Array(t), Value::Array(s)) => {
            let mut out: Option<Vec<Value>> = None;
            for (index, incoming) in s.iter().enumerate() {
                if incoming.is_undefined() {
                    continue;
                }
                let existing = t.get(index);
                let next = match existing {
                    Some(current) if current.is_container() && incoming.is_container() => {
                        merge_inner(current, incoming, ancestors)
                    }
                    _ => incoming.clone(),
                };
                if existing.is_some_and(|current| current.same_ref(&next)) {
                    continue;
                }
                let items = out.get_or_insert_with(|| (**t).clone());
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = next;
            }
            out.map_or_else(|| target.clone(), |items| Value::Array(Arc::new(items)))
        }
        _ => source.clone(),
    };

    ancestors.remove(&ptr);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn test_merge_empty_source_is_identity() {
        let obj = v(json!({"a": 1, "b": {"c": 2}}));
        assert!(merge_values(&obj, &v(json!({}))).same_ref(&obj));

        let arr = v(json!([1, {"x": 1}]));
        assert!(merge_values(&arr, &v(json!([]))).same_ref(&arr));
    }

    #[test]
    fn test_merge_objects_union_keys() {
        let target = v(json!({"a": 1, "nested": {"x": 1, "y": 2}}));
        let source = v(json!({"b": 2, "nested": {"y": 3}}));
        let merged = merge_values(&target, &source);
        assert_eq!(merged, json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 3}}));
        // Target is untouched.
        assert_eq!(target["nested"]["y"], json!(2));
    }

    #[test]
    fn test_merge_explicit_null_overwrites() {
        let merged = merge_values(&v(json!({"a": {"b": 1}})), &v(json!({"a": null})));
        assert_eq!(merged, json!({"a": null}));
    }

    #[test]
    fn test_merge_array_skips_holes() {
        let target = v(json!([{"prop": "prop1"}]));
        let source = Value::array([
            Value::Undefined,
            Value::Undefined,
            v(json!({"prop": "also prop"})),
        ]);
        let merged = merge_values(&target, &source);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], json!({"prop": "prop1"}));
        assert!(merged[1].is_undefined());
        assert_eq!(merged[2], json!({"prop": "also prop"}));
        assert!(merged[0].same_ref(&target[0]));
    }

    #[test]
    fn test_merge_array_does_not_truncate() {
        let merged = merge_values(&v(json!([1, 2, 3, 4])), &v(json!([9])));
        assert_eq!(merged, json!([9, 2, 3, 4]));
    }

    #[test]
    fn test_merge_kind_mismatch_replaces() {
        let source = v(json!([1]));
        let merged = merge_values(&v(json!({"a": 1})), &source);
        assert!(merged.same_ref(&source));

        let merged = merge_values(&v(json!({"a": {"b": 1}})), &v(json!({"a": [1]})));
        assert_eq!(merged, json!({"a": [1]}));
    }

    #[test]
    fn test_merge_opaque_replaces() {
        let stamp = Value::opaque(42u64);
        let target = v(json!({"at": {"year": 2020}}));
        let source = Value::object([("at", stamp.clone())]);
        let merged = merge_values(&target, &source);
        assert!(merged["at"].same_ref(&stamp));
    }

    #[test]
    fn test_merge_preserves_untouched_branches() {
        let target = v(json!({"a": {"x": 1}, "b": {"y": 2}}));
        let merged = merge_values(&target, &v(json!({"a": {"x": 5}})));
        assert!(merged["b"].same_ref(&target["b"]));
        assert!(!merged["a"].same_ref(&target["a"]));
    }

    #[test]
    fn test_merge_identical_subtree_keeps_reference() {
        let target = v(json!({"a": {"x": 1}, "b": 1}));
        let source = Value::object([("a", target["a"].clone())]);
        assert!(merge_values(&target, &source).same_ref(&target));
    }

    #[test]
    fn test_merge_shared_source_node_merges_everywhere() {
        let shared = v(json!({"flag": true}));
        let target = v(json!({"left": {"n": 1}, "right": {"n": 2}}));
        let source = Value::object([("left", shared.clone()), ("right", shared)]);
        let merged = merge_values(&target, &source);
        assert_eq!(merged["left"], json!({"n": 1, "flag": true}));
        assert_eq!(merged["right"], json!({"n": 2, "flag": true}));
    }
}
