//! Change tracking over a mutable tree.
//!
//! A [`ChangeTracker`] owns the value being edited plus a shadow tree that
//! mirrors only the branches that were written. Writes always land on the
//! tracked value; the shadow records the new value whenever it differs from
//! the old one under the tracker's comparator. Shadow containers are created
//! on first use and take the container kind the tracked value has at that
//! branch, so a write to `items[3]` records into an array even when nothing
//! else under `items` changed.
//!
//! [`TrackedView`] is the capability handed to callbacks: a cursor made of
//! the tracker borrow and an accumulated path. Reads through a view borrow
//! straight from the live tree, so reading the same branch twice yields the
//! same allocation.

use crate::{
    delete_at_path, get_at_path, merge_values, resolve_index, update_at_path, Comparator,
    HistoryResult, Path, Seg, Target, Value,
};
use std::sync::Arc;

/// Tracked value plus the shadow tree of recorded writes.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    target: Value,
    changes: Value,
    compare: Comparator,
    // Leading segments hidden from the comparator's context keys.
    compare_depth: usize,
}

impl ChangeTracker {
    /// Start tracking `target` with deep equality as the change test.
    pub fn new(target: Value) -> Self {
        Self::with_comparator(target, Comparator::deep())
    }

    /// Start tracking `target` with a custom change test.
    pub fn with_comparator(target: Value, compare: Comparator) -> Self {
        Self {
            target,
            changes: Value::Undefined,
            compare,
            compare_depth: 0,
        }
    }

    /// Hand the comparator keys relative to the first `depth` segments of
    /// each written path, so a tracker over `{initial, state}` reports the
    /// same keys as a diff of either root.
    #[must_use]
    pub fn compare_below(mut self, depth: usize) -> Self {
        self.compare_depth = depth;
        self
    }

    /// The live tracked value.
    #[inline]
    pub fn target(&self) -> &Value {
        &self.target
    }

    /// Read the tracked value at `path`.
    #[inline]
    pub fn read(&self, path: &[Seg]) -> Option<&Value> {
        get_at_path(&self.target, path)
    }

    /// The recorded changes, or `None` if nothing has been recorded.
    pub fn changes(&self) -> Option<&Value> {
        match &self.changes {
            Value::Undefined => None,
            changes => Some(changes),
        }
    }

    /// Recorded change at `path`.
    pub fn change_at(&self, path: &[Seg]) -> Option<&Value> {
        get_at_path(&self.changes, path)
    }

    /// Write `value` at `path`.
    ///
    /// Returns `true` when the write was recorded as a change, `false` when
    /// the new value equals the old one.
    pub fn write(&mut self, path: &[Seg], value: Value) -> HistoryResult<bool> {
        self.update(path, |_| value)
    }

    /// Compute a new value at `path` from the current one.
    pub fn update<F>(&mut self, path: &[Seg], updater: F) -> HistoryResult<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        let path = normalize(&self.target, path);
        let old = self.read(path.segments()).cloned().unwrap_or_default();
        let Some(new) = update_at_path(&mut self.target, path.segments(), updater)? else {
            return Ok(false);
        };
        let keys = path.segments().get(self.compare_depth..).unwrap_or_default();
        if self.compare.equal(&old, &new, keys) {
            return Ok(false);
        }
        self.record(&path, new);
        Ok(true)
    }

    /// Deep-merge `source` into the value at `path`.
    pub fn merge(&mut self, path: &[Seg], source: &Value) -> HistoryResult<bool> {
        self.update(path, |current| merge_values(current, source))
    }

    /// Delete the value at `path`.
    ///
    /// Returns whether a recorded change existed at that path; the entry is
    /// dropped along with the tracked value.
    pub fn delete(&mut self, path: &[Seg]) -> HistoryResult<bool> {
        let path = normalize(&self.target, path);
        delete_at_path(&mut self.target, path.segments())?;
        Ok(self.forget(path.segments()))
    }

    /// Root view over the tracked value.
    pub fn view(&mut self) -> TrackedView<'_> {
        TrackedView {
            tracker: self,
            base: Path::root(),
        }
    }

    /// View rooted at `path`.
    pub fn view_at(&mut self, path: Path) -> TrackedView<'_> {
        TrackedView {
            tracker: self,
            base: path,
        }
    }

    /// Split into the tracked value and the recorded changes.
    pub fn into_parts(self) -> (Value, Option<Value>) {
        let changes = match self.changes {
            Value::Undefined => None,
            changes => Some(changes),
        };
        (self.target, changes)
    }

    fn record(&mut self, path: &Path, value: Value) {
        let Self {
            target, changes, ..
        } = self;
        let mut node = changes;
        for (depth, seg) in path.iter().enumerate() {
            let branch_is_array = matches!(
                get_at_path(target, &path.segments()[..depth]),
                Some(Value::Array(_))
            );
            if branch_is_array != node.is_array() || !node.is_container() {
                *node = if branch_is_array {
                    Value::empty_array()
                } else {
                    Value::empty_object()
                };
            }
            node = match node {
                Value::Array(items) => {
                    let Some(pos) = seg.as_index().and_then(|i| usize::try_from(i).ok()) else {
                        return;
                    };
                    let items = Arc::make_mut(items);
                    // Bounded by the target array the write just landed in.
                    if pos >= items.len() {
                        items.resize(pos + 1, Value::Undefined);
                    }
                    &mut items[pos]
                }
                Value::Object(map) => Arc::make_mut(map)
                    .entry(seg.to_key())
                    .or_insert(Value::Undefined),
                _ => return,
            };
        }
        *node = value;
    }

    fn forget(&mut self, path: &[Seg]) -> bool {
        if path.is_empty() {
            return !std::mem::take(&mut self.changes).is_undefined();
        }
        matches!(delete_at_path(&mut self.changes, path), Ok(Some(_)))
    }
}

/// Rewrite negative indices into positions against the arrays they address,
/// so the shadow tree (which is usually shorter) records at the same slot.
/// Indices that do not resolve are left for the write to reject.
fn normalize(root: &Value, path: &[Seg]) -> Path {
    let mut node = Some(root);
    path.iter()
        .map(|seg| {
            let resolved = match (node, seg) {
                (Some(Value::Array(items)), Seg::Index(i)) if *i < 0 => {
                    resolve_index(*i, items.len())
                        .map_or_else(|| seg.clone(), |pos| Seg::Index(pos as i64))
                }
                _ => seg.clone(),
            };
            node = node.and_then(|n| get_at_path(n, std::slice::from_ref(&resolved)));
            resolved
        })
        .collect()
}

/// Path-addressed read/write capability over a [`ChangeTracker`].
///
/// Relative targets are joined onto the view's base path; the empty target
/// `""` addresses the base itself.
pub struct TrackedView<'t> {
    tracker: &'t mut ChangeTracker,
    base: Path,
}

impl<'t> TrackedView<'t> {
    /// Absolute path of this view.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.base
    }

    /// Value at the view's base.
    pub fn value(&self) -> Option<&Value> {
        self.tracker.read(self.base.segments())
    }

    /// Value at a relative target. Unparseable targets read as `None`.
    pub fn get(&self, rel: impl Into<Target>) -> Option<&Value> {
        let path = self.resolve(rel).ok()?;
        self.tracker.read(path.segments())
    }

    /// Recorded changes under the view's base.
    pub fn changes(&self) -> Option<&Value> {
        self.tracker.change_at(self.base.segments())
    }

    /// Nested view at a relative target.
    pub fn at(&mut self, rel: impl Into<Target>) -> HistoryResult<TrackedView<'_>> {
        let base = self.resolve(rel)?;
        Ok(TrackedView {
            tracker: self.tracker,
            base,
        })
    }

    /// Write at a relative target; `true` if a change was recorded.
    pub fn set(&mut self, rel: impl Into<Target>, value: impl Into<Value>) -> HistoryResult<bool> {
        let path = self.resolve(rel)?;
        self.tracker.write(path.segments(), value.into())
    }

    /// Replace the value at the view's base.
    pub fn replace(&mut self, value: impl Into<Value>) -> HistoryResult<bool> {
        self.tracker.write(self.base.segments(), value.into())
    }

    /// Compute a new value at a relative target from the current one.
    pub fn update<F>(&mut self, rel: impl Into<Target>, updater: F) -> HistoryResult<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        let path = self.resolve(rel)?;
        self.tracker.update(path.segments(), updater)
    }

    /// Deep-merge `source` at a relative target.
    pub fn merge(&mut self, rel: impl Into<Target>, source: impl Into<Value>) -> HistoryResult<bool> {
        let path = self.resolve(rel)?;
        self.tracker.merge(path.segments(), &source.into())
    }

    /// Delete at a relative target; `true` if a recorded change was dropped.
    pub fn delete(&mut self, rel: impl Into<Target>) -> HistoryResult<bool> {
        let path = self.resolve(rel)?;
        self.tracker.delete(path.segments())
    }

    fn resolve(&self, rel: impl Into<Target>) -> HistoryResult<Path> {
        let rel = rel.into().resolve()?;
        Ok(self.base.join(&rel))
    }
}

impl std::fmt::Debug for TrackedView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedView")
            .field("path", &self.base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    fn tracker(j: serde_json::Value) -> ChangeTracker {
        ChangeTracker::new(Value::from(j))
    }

    #[test]
    fn test_write_records_nested_change() {
        let mut t = tracker(json!({"user": {"details": {"age": 30}}}));
        let changed = t
            .write(path!("user", "details", "name").segments(), Value::from("Jane"))
            .unwrap();
        assert!(changed);
        assert_eq!(
            t.changes().unwrap(),
            &json!({"user": {"details": {"name": "Jane"}}})
        );
        assert_eq!(t.target()["user"]["details"]["age"], json!(30));
    }

    #[test]
    fn test_repeated_write_reports_no_change() {
        let mut t = tracker(json!({"user": {"details": {"age": 30}}}));
        let p = path!("user", "details", "name");
        assert!(t.write(p.segments(), Value::from("Jane")).unwrap());
        assert!(!t.write(p.segments(), Value::from("Jane")).unwrap());
        assert_eq!(
            t.changes().unwrap(),
            &json!({"user": {"details": {"name": "Jane"}}})
        );
    }

    #[test]
    fn test_equal_write_is_not_recorded() {
        let mut t = tracker(json!({"a": {"b": [1, 2]}}));
        assert!(!t.write(path!("a", "b").segments(), Value::from(json!([1, 2]))).unwrap());
        assert!(t.changes().is_none());
    }

    #[test]
    fn test_sparse_array_shadow() {
        let mut t = tracker(json!({"items": [1, 2, 3, 4]}));
        t.write(path!("items", 1).segments(), Value::from(10)).unwrap();
        t.write(path!("items", 3).segments(), Value::from(20)).unwrap();
        let items = &t.changes().unwrap()["items"];
        assert!(items.is_array());
        assert_eq!(items.len(), 4);
        assert!(items[0].is_undefined());
        assert_eq!(items[1], json!(10));
        assert!(items[2].is_undefined());
        assert_eq!(items[3], json!(20));
    }

    #[test]
    fn test_negative_index_records_resolved_slot() {
        let mut t = tracker(json!({"items": ["a", "b", "c"]}));
        t.write(path!("items", -1).segments(), Value::from("z")).unwrap();
        let items = &t.changes().unwrap()["items"];
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], json!("z"));
    }

    #[test]
    fn test_sibling_changes_are_kept() {
        let mut t = tracker(json!({"a": {"x": 1, "y": 2}}));
        t.write(path!("a", "x").segments(), Value::from(5)).unwrap();
        t.write(path!("a", "y").segments(), Value::from(6)).unwrap();
        assert_eq!(t.changes().unwrap(), &json!({"a": {"x": 5, "y": 6}}));
    }

    #[test]
    fn test_write_does_not_touch_original() {
        let original = Value::from(json!({"a": {"x": 1}, "b": {"y": 1}}));
        let mut t = ChangeTracker::new(original.clone());
        t.write(path!("a", "x").segments(), Value::from(2)).unwrap();
        assert_eq!(original["a"]["x"], json!(1));
        assert!(t.target()["b"].same_ref(&original["b"]));
    }

    #[test]
    fn test_delete_reports_recorded_entry() {
        let mut t = tracker(json!({"a": 1, "b": 2}));
        t.write(path!("a").segments(), Value::from(3)).unwrap();
        assert!(t.delete(path!("a").segments()).unwrap());
        assert!(t.target().get("a").is_none());
        assert!(!t.delete(path!("b").segments()).unwrap());
        assert!(t.target().get("b").is_none());
    }

    #[test]
    fn test_merge_records_merged_value() {
        let mut t = tracker(json!({"cfg": {"a": 1}}));
        assert!(t.merge(path!("cfg").segments(), &Value::from(json!({"b": 2}))).unwrap());
        assert_eq!(t.changes().unwrap(), &json!({"cfg": {"a": 1, "b": 2}}));
    }

    #[test]
    fn test_write_error_leaves_tracker_unchanged() {
        let mut t = tracker(json!({"a": 1}));
        let before = t.target().clone();
        assert!(t.write(path!("a", "b").segments(), Value::from(1)).is_err());
        assert!(t.target().same_ref(&before));
        assert!(t.changes().is_none());
    }

    #[test]
    fn test_view_relative_paths() {
        let mut t = tracker(json!({"state": {"list": [1, 2]}}));
        {
            let mut view = t.view_at(path!("state"));
            assert_eq!(view.get("list[1]"), Some(&Value::from(2)));
            let mut list = view.at("list").unwrap();
            assert!(list.set("[0]", 9).unwrap());
            assert_eq!(list.value().unwrap(), &json!([9, 2]));
        }
        assert_eq!(t.changes().unwrap()["state"]["list"][0], json!(9));
    }

    #[test]
    fn test_view_reads_share_allocation() {
        let mut t = tracker(json!({"a": {"b": {"c": 1}}}));
        let view = t.view();
        let first = view.get("a.b").unwrap();
        let second = view.get("a.b").unwrap();
        assert!(first.same_ref(second));
    }

    #[test]
    fn test_view_invalid_path() {
        let mut t = tracker(json!({}));
        let mut view = t.view();
        assert!(view.get("a[b]").is_none());
        assert!(view.set("a[1.5]", 1).is_err());
    }
}
