//! Deep read/write access by path.
//!
//! Reads never fail: anything that cannot be followed yields `None`.
//! Writes create missing intermediate containers (an array when the next
//! segment is an index, an object otherwise) and report a no-op when the
//! updater hands back the identical value.
//!
//! Every write is validated by a read-only probe before the first
//! `Arc::make_mut`, so a failing or no-op write leaves shared branches alone.

use crate::{HistoryError, HistoryResult, Map, Path, Seg, Value};
use std::sync::Arc;

/// Most holes a single write may pad an array with. Writing further past the
/// end is an `IndexOutOfBounds` error.
pub const MAX_INDEX_GAP: usize = 1 << 16;

/// Resolve a possibly negative index against an array length.
///
/// Non-negative indices are returned as-is, even past the end. Negative
/// indices count back from `len`; `None` means out of bounds.
#[inline]
pub fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        return usize::try_from(index).ok();
    }
    let resolved = len as i64 + index;
    usize::try_from(resolved).ok()
}

fn lookup<'a>(map: &'a Map, seg: &Seg) -> Option<&'a Value> {
    match seg {
        Seg::Key(k) => map.get(k.as_str()),
        Seg::Index(i) => map.get(i.to_string().as_str()),
    }
}

/// Get the value at a path (read mode).
///
/// Object nodes accept any segment (indices address their decimal key);
/// array nodes only accept index segments. Holes and missing keys read as
/// `None`, as does any attempt to descend through a leaf.
///
/// ```
/// use tirea_history::{get_at_path, path, Value};
/// use serde_json::json;
///
/// let doc = Value::from(json!({"items": ["a", "b", "c"]}));
/// assert_eq!(get_at_path(&doc, path!("items", -1).segments()), Some(&Value::from("c")));
/// assert_eq!(get_at_path(&doc, path!("items", -4).segments()), None);
/// assert_eq!(get_at_path(&doc, path!("items", "1").segments()), None);
/// ```
pub fn get_at_path<'a>(root: &'a Value, path: &[Seg]) -> Option<&'a Value> {
    let mut current = root;
    for seg in path {
        current = match current {
            Value::Object(map) => lookup(map, seg)?,
            Value::Array(items) => {
                let index = seg.as_index()?;
                items.get(resolve_index(index, items.len())?)?
            }
            _ => return None,
        };
    }
    match current {
        Value::Undefined => None,
        found => Some(found),
    }
}

/// Compute a new value at a path from the old one (write mode).
///
/// The updater receives the current value (`Undefined` when absent). If it
/// returns the identical value, nothing is written and `Ok(None)` is
/// returned; otherwise the value is stored and returned.
///
/// # Errors
///
/// - `InvalidTargetType` when descending through a leaf
/// - `InvalidTargetKey` when a key segment is applied to an array
/// - `IndexOutOfBounds` when a negative index resolves before the start, or
///   a write would pad an array with more than [`MAX_INDEX_GAP`] holes
pub fn update_at_path<F>(root: &mut Value, path: &[Seg], updater: F) -> HistoryResult<Option<Value>>
where
    F: FnOnce(&Value) -> Value,
{
    let old = probe(root, path)?;
    let new = updater(&old);
    if new.same_ref(&old) {
        return Ok(None);
    }
    write_at(root, path, 0, new.clone())?;
    Ok(Some(new))
}

/// Set a value at a path. Returns `true` if anything was written.
pub fn set_at_path(root: &mut Value, path: &[Seg], value: Value) -> HistoryResult<bool> {
    update_at_path(root, path, |_| value).map(|written| written.is_some())
}

/// Delete the value at a path and return it.
///
/// Object keys are removed; array entries become holes so the indices of
/// their siblings are preserved. Deleting something absent is a no-op.
pub fn delete_at_path(root: &mut Value, path: &[Seg]) -> HistoryResult<Option<Value>> {
    let Some((last, parents)) = path.split_last() else {
        return Err(HistoryError::invalid_operation("cannot delete the root value"));
    };
    if get_at_path(root, path).is_none() {
        return Ok(None);
    }

    let mut current = root;
    for seg in parents {
        current = child_mut(current, seg).ok_or_else(|| {
            HistoryError::invalid_operation(format!("path vanished during delete at {seg}"))
        })?;
    }

    let removed = match current {
        Value::Object(map) => Arc::make_mut(map).shift_remove(last.to_key().as_str()),
        Value::Array(items) => {
            let items = Arc::make_mut(items);
            last.as_index()
                .and_then(|i| resolve_index(i, items.len()))
                .and_then(|pos| items.get_mut(pos))
                .map(std::mem::take)
        }
        _ => None,
    };
    Ok(removed)
}

fn child_mut<'a>(current: &'a mut Value, seg: &Seg) -> Option<&'a mut Value> {
    match current {
        Value::Object(map) => Arc::make_mut(map).get_mut(seg.to_key().as_str()),
        Value::Array(items) => {
            let items = Arc::make_mut(items);
            let pos = resolve_index(seg.as_index()?, items.len())?;
            items.get_mut(pos)
        }
        _ => None,
    }
}

/// Walk the path without mutating, applying write-mode validation, and
/// return the current value at its end.
fn probe(root: &Value, path: &[Seg]) -> HistoryResult<Value> {
    // `None` once the walk has left the existing tree: the remaining
    // segments will address freshly created containers.
    let mut current = Some(root);
    let mut walked = Path::root();

    for seg in path {
        current = match current {
            Some(Value::Object(map)) => lookup(map, seg).filter(|v| !v.is_undefined()),
            Some(node @ Value::Array(items)) => {
                let Seg::Index(index) = seg else {
                    return Err(HistoryError::invalid_target_key(walked, seg, node));
                };
                let pos = resolve_index(*index, items.len())
                    .filter(|pos| pos - items.len().min(*pos) <= MAX_INDEX_GAP)
                    .ok_or_else(|| {
                        HistoryError::index_out_of_bounds(walked.clone(), *index, items.len())
                    })?;
                items.get(pos).filter(|v| !v.is_undefined())
            }
            Some(leaf) => return Err(HistoryError::invalid_target_type(walked, leaf)),
            None => {
                if let Seg::Index(index) = seg {
                    let in_range = usize::try_from(*index).is_ok_and(|pos| pos <= MAX_INDEX_GAP);
                    if !in_range {
                        return Err(HistoryError::index_out_of_bounds(walked, *index, 0));
                    }
                }
                None
            }
        };
        walked.push(seg.clone());
    }

    Ok(current.cloned().unwrap_or_default())
}

fn empty_container_for(seg: &Seg) -> Value {
    if seg.is_index() {
        Value::empty_array()
    } else {
        Value::empty_object()
    }
}

fn write_at(current: &mut Value, path: &[Seg], depth: usize, value: Value) -> HistoryResult<()> {
    let Some(seg) = path.get(depth) else {
        *current = value;
        return Ok(());
    };

    if current.is_undefined() {
        *current = empty_container_for(seg);
    }

    let at = || Path::from_segments(path[..depth].to_vec());
    match (current, seg) {
        (Value::Object(map), _) => {
            let slot = Arc::make_mut(map)
                .entry(seg.to_key())
                .or_insert(Value::Undefined);
            write_at(slot, path, depth + 1, value)
        }
        (Value::Array(items), Seg::Index(index)) => {
            let items = Arc::make_mut(items);
            let pos = resolve_index(*index, items.len())
                .ok_or_else(|| HistoryError::index_out_of_bounds(at(), *index, items.len()))?;
            // The probe bounded `pos` by MAX_INDEX_GAP past the end.
            if pos >= items.len() {
                items.resize(pos + 1, Value::Undefined);
            }
            write_at(&mut items[pos], path, depth + 1, value)
        }
        (array @ Value::Array(_), key) => {
            Err(HistoryError::invalid_target_key(at(), key, array))
        }
        (leaf, _) => Err(HistoryError::invalid_target_type(at(), leaf)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 3), Some(0));
        assert_eq!(resolve_index(5, 3), Some(5));
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-3, 3), Some(0));
        assert_eq!(resolve_index(-4, 3), None);
    }

    #[test]
    fn test_get_nested() {
        let doc = v(json!({"a": {"b": [10, {"c": true}]}}));
        assert_eq!(get_at_path(&doc, path!("a", "b", 1, "c").segments()), Some(&Value::Bool(true)));
        assert_eq!(get_at_path(&doc, path!("a", "x", "y").segments()), None);
        assert_eq!(get_at_path(&doc, path!("a", "b", 0, "z").segments()), None);
        assert_eq!(get_at_path(&Value::Null, path!("a").segments()), None);
    }

    #[test]
    fn test_get_object_with_index_segment() {
        let doc = v(json!({"0": "zero"}));
        assert_eq!(get_at_path(&doc, path!(0).segments()), Some(&Value::from("zero")));
    }

    #[test]
    fn test_update_creates_intermediates() {
        let mut doc = v(json!({}));
        let written = update_at_path(&mut doc, path!("a", "list", 2, "x").segments(), |_| {
            Value::from(1)
        })
        .unwrap();
        assert_eq!(written, Some(Value::from(1)));
        let list = &doc["a"]["list"];
        assert!(list.is_array());
        assert_eq!(list.len(), 3);
        assert!(list[0].is_undefined());
        assert!(list[1].is_undefined());
        assert_eq!(list[2], json!({"x": 1}));
    }

    #[test]
    fn test_update_identical_is_noop() {
        let mut doc = v(json!({"a": {"b": 1}, "c": {"d": 2}}));
        let before = doc.clone();
        let written = update_at_path(&mut doc, path!("a", "b").segments(), |old| old.clone()).unwrap();
        assert!(written.is_none());
        assert!(doc.same_ref(&before));
        assert!(doc["a"].same_ref(&before["a"]));
    }

    #[test]
    fn test_update_preserves_sibling_identity() {
        let mut doc = v(json!({"a": {"b": 1}, "c": {"d": 2}}));
        let before = doc.clone();
        set_at_path(&mut doc, path!("a", "b").segments(), Value::from(5)).unwrap();
        assert_eq!(doc["a"]["b"], json!(5));
        assert_eq!(before["a"]["b"], json!(1));
        assert!(doc["c"].same_ref(&before["c"]));
        assert!(!doc["a"].same_ref(&before["a"]));
    }

    #[test]
    fn test_update_negative_index() {
        let mut doc = v(json!(["a", "b", "c"]));
        set_at_path(&mut doc, path!(-1).segments(), Value::from("z")).unwrap();
        assert_eq!(doc, json!(["a", "b", "z"]));

        let err = set_at_path(&mut doc, path!(-4).segments(), Value::from("q")).unwrap_err();
        assert!(matches!(err, HistoryError::IndexOutOfBounds { index: -4, len: 3, .. }));
    }

    #[test]
    fn test_update_through_leaf_fails() {
        let mut doc = v(json!({"a": 1}));
        let err = set_at_path(&mut doc, path!("a", "b").segments(), Value::from(2)).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidTargetType { found: "number", .. }));
    }

    #[test]
    fn test_update_key_on_array_fails() {
        let mut doc = v(json!({"a": [1]}));
        let before = doc.clone();
        let err = set_at_path(&mut doc, path!("a", "x").segments(), Value::from(2)).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidTargetKey { .. }));
        assert!(doc.same_ref(&before));
    }

    #[test]
    fn test_update_negative_index_in_created_array_fails() {
        let mut doc = v(json!({}));
        let err = set_at_path(&mut doc, path!("list", -1).segments(), Value::from(1)).unwrap_err();
        assert!(matches!(err, HistoryError::IndexOutOfBounds { len: 0, .. }));
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn test_update_far_past_end_fails_without_writing() {
        let mut doc = v(json!({"list": [1]}));
        let before = doc.clone();
        let far = i64::try_from(MAX_INDEX_GAP).unwrap() + 2;

        let err = set_at_path(&mut doc, path!("list", far).segments(), Value::from(2)).unwrap_err();
        assert!(matches!(err, HistoryError::IndexOutOfBounds { len: 1, .. }));
        let err = set_at_path(&mut doc, path!("list", i64::MAX).segments(), Value::from(2)).unwrap_err();
        assert!(matches!(err, HistoryError::IndexOutOfBounds { .. }));
        let err = set_at_path(&mut doc, path!("fresh", i64::MAX).segments(), Value::from(2)).unwrap_err();
        assert!(matches!(err, HistoryError::IndexOutOfBounds { len: 0, .. }));
        assert!(doc.same_ref(&before));

        set_at_path(&mut doc, path!("list", far - 1).segments(), Value::from(2)).unwrap();
        assert_eq!(doc["list"].len(), MAX_INDEX_GAP + 2);
    }

    #[test]
    fn test_delete() {
        let mut doc = v(json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]}));
        assert_eq!(delete_at_path(&mut doc, path!("a", "b").segments()).unwrap(), Some(Value::from(1)));
        assert_eq!(doc["a"], json!({"c": 2}));

        delete_at_path(&mut doc, path!("list", 1).segments()).unwrap();
        assert!(doc["list"][1].is_undefined());
        assert_eq!(doc["list"].len(), 3);

        let before = doc.clone();
        assert_eq!(delete_at_path(&mut doc, path!("missing").segments()).unwrap(), None);
        assert!(doc.same_ref(&before));
    }
}
