//! Transaction drafts over `{initial, state}`.
//!
//! A [`Draft`] is the mutable view a transaction edits. It is obtained from a
//! [`DraftBackend`] at the start of the transaction and finalized back into
//! immutable roots once the callback returns. The default backend,
//! [`CopyOnWrite`], hands out the shared tree itself and relies on
//! `Arc::make_mut` to copy exactly the branches that are written.

use crate::{
    ChangeTracker, Comparator, HistoryError, HistoryResult, Map, Path, Seg, Target, TrackedView,
    Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) const STATE: &str = "state";
pub(crate) const INITIAL: &str = "initial";

/// Options passed through to the draft backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftOptions {
    /// On finalize, swap written branches that ended up equal to the
    /// pre-transaction value back to the pre-transaction allocation.
    pub reshare_unchanged: bool,
}

impl DraftOptions {
    #[must_use]
    pub fn with_reshare_unchanged(mut self, enabled: bool) -> Self {
        self.reshare_unchanged = enabled;
        self
    }
}

/// Persistent-structure primitive used by transactions.
///
/// `begin` produces a value that can be mutated through `Arc::make_mut`
/// without disturbing `base`; `finalize` turns the edited value back into
/// the published tree. Untouched branches of the result must be the same
/// allocations as in `base`.
pub trait DraftBackend: Send + Sync {
    fn begin(&self, base: &Value) -> Value;

    fn finalize(&self, base: &Value, draft: Value, options: &DraftOptions) -> Value;
}

/// Default backend: the draft starts as a cheap clone of `base`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOnWrite;

impl DraftBackend for CopyOnWrite {
    fn begin(&self, base: &Value) -> Value {
        base.clone()
    }

    fn finalize(&self, base: &Value, draft: Value, options: &DraftOptions) -> Value {
        if options.reshare_unchanged {
            reshare(base, &draft)
        } else {
            draft
        }
    }
}

/// Rebuild `draft` so that every branch deep-equal to `base` is `base`'s
/// allocation.
fn reshare(base: &Value, draft: &Value) -> Value {
    if base.same_ref(draft) {
        return draft.clone();
    }
    match (base, draft) {
        (Value::Object(before), Value::Object(after)) => {
            let mut out: Option<Map> = None;
            let mut all_shared = before.len() == after.len();
            for (index, (key, child)) in after.iter().enumerate() {
                let prior = before.get(key);
                let next = prior.map_or_else(|| child.clone(), |p| reshare(p, child));
                if !prior.is_some_and(|p| p.same_ref(&next)) {
                    all_shared = false;
                }
                if !next.same_ref(child) {
                    if let Some((_, slot)) = out
                        .get_or_insert_with(|| (**after).clone())
                        .get_index_mut(index)
                    {
                        *slot = next;
                    }
                }
            }
            if all_shared {
                return base.clone();
            }
            out.map_or_else(|| draft.clone(), |map| Value::Object(Arc::new(map)))
        }
        (Value::Array(before), Value::Array(after)) => {
            let mut out: Option<Vec<Value>> = None;
            let mut all_shared = before.len() == after.len();
            for (index, child) in after.iter().enumerate() {
                let prior = before.get(index);
                let next = prior.map_or_else(|| child.clone(), |p| reshare(p, child));
                if !prior.is_some_and(|p| p.same_ref(&next)) {
                    all_shared = false;
                }
                if !next.same_ref(child) {
                    out.get_or_insert_with(|| (**after).clone())[index] = next;
                }
            }
            if all_shared {
                return base.clone();
            }
            out.map_or_else(|| draft.clone(), |items| Value::Array(Arc::new(items)))
        }
        _ if base == draft => base.clone(),
        _ => draft.clone(),
    }
}

/// Resolve a transaction target and check that it addresses `state` or
/// `initial`.
pub(crate) fn root_path(target: impl Into<Target>) -> HistoryResult<Path> {
    let target = target.into();
    let path = target.resolve()?;
    match path.first() {
        Some(Seg::Key(root)) if root == STATE || root == INITIAL => Ok(path),
        _ => Err(HistoryError::invalid_path(target.to_string())),
    }
}

/// Mutable view over `{initial, state}` for one transaction.
pub struct Draft {
    base: Value,
    tracker: ChangeTracker,
    backend: Arc<dyn DraftBackend>,
    options: DraftOptions,
}

impl Draft {
    /// Open a draft over the given roots.
    pub fn begin(
        initial: &Value,
        state: &Value,
        compare: Comparator,
        backend: Arc<dyn DraftBackend>,
        options: DraftOptions,
    ) -> Self {
        let base = Value::object([(INITIAL, initial.clone()), (STATE, state.clone())]);
        let tracker =
            ChangeTracker::with_comparator(backend.begin(&base), compare).compare_below(1);
        Self {
            base,
            tracker,
            backend,
            options,
        }
    }

    /// Current draft `state`.
    pub fn state(&self) -> &Value {
        &self.tracker.target()[STATE]
    }

    /// Current draft `initial`.
    pub fn initial(&self) -> &Value {
        &self.tracker.target()[INITIAL]
    }

    /// Read at a `state.*` or `initial.*` target.
    pub fn get(&self, target: impl Into<Target>) -> HistoryResult<Option<&Value>> {
        let path = root_path(target)?;
        Ok(self.tracker.read(path.segments()))
    }

    /// Tracked view rooted at a `state.*` or `initial.*` target.
    pub fn view(&mut self, target: impl Into<Target>) -> HistoryResult<TrackedView<'_>> {
        let path = root_path(target)?;
        Ok(self.tracker.view_at(path))
    }

    pub fn set(&mut self, target: impl Into<Target>, value: impl Into<Value>) -> HistoryResult<bool> {
        let path = root_path(target)?;
        self.tracker.write(path.segments(), value.into())
    }

    pub fn update<F>(&mut self, target: impl Into<Target>, updater: F) -> HistoryResult<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        let path = root_path(target)?;
        self.tracker.update(path.segments(), updater)
    }

    pub fn merge(&mut self, target: impl Into<Target>, source: impl Into<Value>) -> HistoryResult<bool> {
        let path = root_path(target)?;
        self.tracker.merge(path.segments(), &source.into())
    }

    pub fn delete(&mut self, target: impl Into<Target>) -> HistoryResult<bool> {
        let path = root_path(target)?;
        if path.len() == 1 {
            return Err(HistoryError::invalid_operation(format!(
                "cannot delete the {} root",
                path
            )));
        }
        self.tracker.delete(path.segments())
    }

    /// Paths written so far in this transaction, with their latest values.
    pub fn patches(&self) -> Option<&Value> {
        self.tracker.changes()
    }

    /// Finalize into `(initial, state)`.
    pub(crate) fn finish(self) -> (Value, Value) {
        let (edited, _) = self.tracker.into_parts();
        let root = self.backend.finalize(&self.base, edited, &self.options);
        (root[INITIAL].clone(), root[STATE].clone())
    }
}

impl std::fmt::Debug for Draft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draft")
            .field("state", self.state())
            .field("initial", self.initial())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Path-local access for a path-addressed commit.
///
/// `state()` and `initial()` are views at the same relative path under each
/// root, so a pending value can be confirmed in one transaction.
pub struct CommitScope<'d> {
    draft: &'d mut Draft,
    path: Path,
}

impl<'d> CommitScope<'d> {
    pub(crate) fn new(draft: &'d mut Draft, path: Path) -> Self {
        Self { draft, path }
    }

    /// Path relative to the roots.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn under(&self, root: &str) -> Path {
        Path::root().key(root).join(&self.path)
    }

    /// Current value at the path under `state`.
    pub fn state_value(&self) -> Option<Value> {
        self.draft.tracker.read(self.under(STATE).segments()).cloned()
    }

    /// Current value at the path under `initial`.
    pub fn initial_value(&self) -> Option<Value> {
        self.draft.tracker.read(self.under(INITIAL).segments()).cloned()
    }

    /// Tracked view at the path under `state`.
    pub fn state(&mut self) -> TrackedView<'_> {
        let path = self.under(STATE);
        self.draft.tracker.view_at(path)
    }

    /// Tracked view at the path under `initial`.
    pub fn initial(&mut self) -> TrackedView<'_> {
        let path = self.under(INITIAL);
        self.draft.tracker.view_at(path)
    }

    /// Whole-draft access.
    pub fn draft(&mut self) -> &mut Draft {
        self.draft
    }
}
