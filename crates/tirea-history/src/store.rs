//! The store: one published history record and the transactions that
//! replace it.
//!
//! Every mutating call runs the same cycle. A draft is opened over the
//! current `{initial, state}`, the operation edits it, the transform hook
//! (if any) gets a last look, and the draft is finalized. When neither root
//! changed the current record is returned as-is; otherwise a successor is
//! swapped in, the dispatcher and listeners run synchronously, and the
//! after-change observer is scheduled on the Tokio runtime.
//!
//! Only one draft may be open per store. A mutating call made while another
//! transaction is in flight, from inside its callback or while an async wrap
//! is pending, fails with `TransactionInProgress`. Listeners run after the
//! flag is released and may start transactions of their own.

use crate::acts::{Listener, Setter, SubscriptionId};
use crate::draft::{root_path, INITIAL, STATE};
use crate::{
    Acts, CommitScope, Draft, History, HistoryError, HistoryResult, OpKind, StoreOptions, Target,
    TrackedView, Value,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type ViewFn<'a> = dyn FnOnce(&mut TrackedView<'_>) -> HistoryResult<Option<Value>> + 'a;

/// Argument of [`Store::set`]: a replacement value or a callback.
///
/// The callback receives a view at the target path. It may edit through the
/// view, or return `Some(value)` to replace the target outright.
pub enum Update<'a> {
    Value(Value),
    With(Box<ViewFn<'a>>),
}

impl<'a> Update<'a> {
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&mut TrackedView<'_>) -> HistoryResult<Option<Value>> + 'a,
    {
        Update::With(Box::new(f))
    }
}

impl fmt::Debug for Update<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Update::With(_) => f.write_str("With(<callback>)"),
        }
    }
}

macro_rules! impl_update_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Update<'_> {
                fn from(v: $t) -> Self {
                    Update::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_update_from!(Value, serde_json::Value, bool, i32, i64, u32, u64, usize, f64, &str, String);

struct StoreInner {
    record: Mutex<Arc<History>>,
    in_transaction: AtomicBool,
    listeners: Mutex<Vec<(SubscriptionId, Arc<Listener>)>>,
    next_subscription: AtomicU64,
    options: StoreOptions,
}

/// Clears the transaction flag when dropped.
struct TransactionGuard {
    inner: Arc<StoreInner>,
}

impl TransactionGuard {
    fn acquire(inner: &Arc<StoreInner>) -> HistoryResult<Self> {
        inner
            .in_transaction
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HistoryError::TransactionInProgress)?;
        Ok(Self {
            inner: Arc::clone(inner),
        })
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.inner.in_transaction.store(false, Ordering::Release);
    }
}

/// Handle to a history store. Clones share the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store with default options.
    ///
    /// # Errors
    ///
    /// `InvalidStore` unless `initial` is an object or an array.
    pub fn create(initial: impl Into<Value>) -> HistoryResult<Self> {
        Self::create_with(initial, StoreOptions::default())
    }

    pub fn create_with(initial: impl Into<Value>, options: StoreOptions) -> HistoryResult<Self> {
        let initial = initial.into();
        if !initial.is_container() {
            return Err(HistoryError::invalid_store(&initial));
        }
        let record = Arc::new(History::new(initial, options.compare.clone()));
        Ok(Self {
            inner: Arc::new(StoreInner {
                record: Mutex::new(record),
                in_transaction: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
                options,
            }),
        })
    }

    /// The current record.
    pub fn get(&self) -> Arc<History> {
        Arc::clone(&self.lock_record())
    }

    /// Read through the current record (`state.*`, `initial.*`, `prev.*`,
    /// `prevInitial.*`, `changes.*`).
    pub fn get_at(&self, target: impl Into<Target>) -> HistoryResult<Option<Value>> {
        let record = self.get();
        let found = record.get(target)?.cloned();
        Ok(found)
    }

    /// Replace the value at a `state.*`/`initial.*` target.
    ///
    /// No merging happens: `set("state.items", json!([]))` empties the list.
    pub fn set<'a>(
        &self,
        target: impl Into<Target>,
        update: impl Into<Update<'a>>,
    ) -> HistoryResult<Arc<History>> {
        let path = root_path(target)?;
        match update.into() {
            Update::Value(value) => {
                self.transact(OpKind::Set, |draft| draft.set(path, value).map(drop))
            }
            Update::With(f) => self.transact(OpKind::Set, |draft| {
                let mut view = draft.view(path)?;
                if let Some(replacement) = f(&mut view)? {
                    view.replace(replacement)?;
                }
                Ok(())
            }),
        }
    }

    /// Compute the value at a target from its current value.
    pub fn update<F>(&self, target: impl Into<Target>, updater: F) -> HistoryResult<Arc<History>>
    where
        F: FnOnce(&Value) -> Value,
    {
        let path = root_path(target)?;
        self.transact(OpKind::Set, |draft| draft.update(path, updater).map(drop))
    }

    /// Replace whole roots from an object with `state` and/or `initial`.
    pub fn set_roots(&self, roots: impl Into<Value>) -> HistoryResult<Arc<History>> {
        let (initial, state) = split_roots(&roots.into())?;
        self.transact(OpKind::Set, |draft| {
            if let Some(initial) = initial {
                draft.set(INITIAL, initial)?;
            }
            if let Some(state) = state {
                draft.set(STATE, state)?;
            }
            Ok(())
        })
    }

    /// Deep-merge `source` at a `state.*`/`initial.*` target.
    pub fn merge(
        &self,
        target: impl Into<Target>,
        source: impl Into<Value>,
    ) -> HistoryResult<Arc<History>> {
        let path = root_path(target)?;
        let source = source.into();
        self.transact(OpKind::Merge, |draft| draft.merge(path, source).map(drop))
    }

    /// Deep-merge into whole roots from an object with `state` and/or
    /// `initial`.
    pub fn merge_roots(&self, roots: impl Into<Value>) -> HistoryResult<Arc<History>> {
        let (initial, state) = split_roots(&roots.into())?;
        self.transact(OpKind::Merge, |draft| {
            if let Some(initial) = initial {
                draft.merge(INITIAL, initial)?;
            }
            if let Some(state) = state {
                draft.merge(STATE, state)?;
            }
            Ok(())
        })
    }

    /// Edit both roots in one transaction.
    pub fn commit<F>(&self, f: F) -> HistoryResult<Arc<History>>
    where
        F: FnOnce(&mut Draft) -> HistoryResult<()>,
    {
        self.transact(OpKind::Commit, f)
    }

    /// Edit the same relative path under both roots.
    ///
    /// `target` is relative to the roots, e.g. `"items[0]"`.
    pub fn commit_at<F>(&self, target: impl Into<Target>, f: F) -> HistoryResult<Arc<History>>
    where
        F: FnOnce(&mut CommitScope<'_>) -> HistoryResult<()>,
    {
        let path = target.into().resolve()?;
        self.transact(OpKind::Commit, |draft| {
            let mut scope = CommitScope::new(draft, path);
            f(&mut scope)
        })
    }

    /// Point `state` back at `initial`. Returns the current record when there
    /// is nothing to reset.
    pub fn reset(&self) -> HistoryResult<Arc<History>> {
        let current = self.get();
        if current.changes().is_none() {
            return Ok(current);
        }
        self.transact(OpKind::Reset, |draft| {
            let initial = draft.initial().clone();
            draft.set(STATE, initial).map(drop)
        })
    }

    /// Turn a draft callback into a reusable updater. Each call is one
    /// transaction.
    pub fn wrap<A, F>(&self, f: F) -> impl Fn(A) -> HistoryResult<Arc<History>>
    where
        F: Fn(&mut Draft, A) -> HistoryResult<()>,
    {
        let store = self.clone();
        move |arg: A| store.transact(OpKind::Commit, |draft| f(draft, arg))
    }

    /// Like [`Store::wrap`], with the callback addressed at one target. The
    /// callback may return a replacement for the target.
    pub fn wrap_at<A, F>(
        &self,
        target: impl Into<Target>,
        f: F,
    ) -> HistoryResult<impl Fn(A) -> HistoryResult<Arc<History>>>
    where
        F: Fn(&mut TrackedView<'_>, A) -> HistoryResult<Option<Value>>,
    {
        let path = root_path(target)?;
        let store = self.clone();
        Ok(move |arg: A| {
            store.transact(OpKind::Set, |draft| {
                let mut view = draft.view(path.clone())?;
                if let Some(replacement) = f(&mut view, arg)? {
                    view.replace(replacement)?;
                }
                Ok(())
            })
        })
    }

    /// Async updater. The callback owns the draft until its future resolves
    /// and hands it back; the store stays locked for transactions until then.
    ///
    /// The draft is opened when the updater is called, not when the returned
    /// future is first polled. Dropping the future abandons the transaction.
    pub fn wrap_async<A, F, Fut>(
        &self,
        f: F,
    ) -> impl Fn(A) -> BoxFuture<'static, HistoryResult<Arc<History>>>
    where
        A: Send + 'static,
        F: Fn(Draft, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HistoryResult<Draft>> + Send + 'static,
    {
        let store = self.clone();
        move |arg: A| -> BoxFuture<'static, HistoryResult<Arc<History>>> {
            let guard = match TransactionGuard::acquire(&store.inner) {
                Ok(guard) => guard,
                Err(err) => return futures::future::ready(Err(err)).boxed(),
            };
            let current = store.get();
            let pending = f(store.open(&current), arg);
            let store = store.clone();
            async move {
                let draft = pending.await?;
                let published = store.finish(&current, draft, OpKind::Commit);
                drop(guard);
                Ok::<_, HistoryError>(store.announce(&current, published?))
            }
            .boxed()
        }
    }

    /// Setter bound to a `state.*`/`initial.*` target.
    pub fn setter(&self, target: impl Into<Target>) -> HistoryResult<Setter> {
        let path = root_path(target)?;
        Ok(Setter::new(self.clone(), path))
    }

    /// Run a named action registered in [`StoreOptions::with_acts`].
    pub fn act(&self, name: &str, arg: impl Into<Value>) -> HistoryResult<Arc<History>> {
        let action = self
            .inner
            .options
            .acts
            .get(name)
            .cloned()
            .ok_or_else(|| HistoryError::unknown_action(name))?;
        action(self, arg.into())
    }

    pub fn acts(&self) -> &Acts {
        &self.inner.options.acts
    }

    /// Register a listener called synchronously with every published record.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<History>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn lock_record(&self) -> MutexGuard<'_, Arc<History>> {
        // The record is only ever replaced whole, so a poisoned lock still
        // holds a consistent value.
        self.inner
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<Listener>)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, current: &History) -> Draft {
        let options = &self.inner.options;
        Draft::begin(
            current.initial(),
            current.state(),
            options.compare.clone(),
            Arc::clone(&options.backend),
            options.draft.clone(),
        )
    }

    fn transact<F>(&self, kind: OpKind, edit: F) -> HistoryResult<Arc<History>>
    where
        F: FnOnce(&mut Draft) -> HistoryResult<()>,
    {
        let guard = TransactionGuard::acquire(&self.inner)?;
        let current = self.get();
        let mut draft = self.open(&current);
        edit(&mut draft)?;
        let published = self.finish(&current, draft, kind)?;
        drop(guard);
        Ok(self.announce(&current, published))
    }

    /// Finalize the draft and swap in the successor record, if any.
    fn finish(
        &self,
        current: &Arc<History>,
        mut draft: Draft,
        kind: OpKind,
    ) -> HistoryResult<Option<Arc<History>>> {
        let options = &self.inner.options;
        if let Some(transform) = &options.transform {
            let patches = draft.patches().cloned();
            transform(&mut draft, current.as_ref(), kind, patches)?;
        }

        let (initial, state) = draft.finish();
        if !initial.same_kind(&state) {
            return Err(HistoryError::shape_mismatch(&initial, &state));
        }

        let compare = &options.compare;
        let initial_changed =
            !initial.same_ref(current.initial()) && !compare.equal(current.initial(), &initial, &[]);
        let state_changed =
            !state.same_ref(current.state()) && !compare.equal(current.state(), &state, &[]);
        if !initial_changed && !state_changed {
            tracing::trace!(op = %kind, "transaction changed nothing");
            return Ok(None);
        }

        let next = Arc::new(current.advance(
            initial_changed.then_some(initial),
            state_changed.then_some(state),
        ));
        *self.lock_record() = Arc::clone(&next);
        tracing::debug!(op = %kind, initial_changed, state_changed, "published history record");
        Ok(Some(next))
    }

    /// Notify the dispatcher, listeners and after-change observer.
    fn announce(&self, current: &Arc<History>, published: Option<Arc<History>>) -> Arc<History> {
        let Some(next) = published else {
            return Arc::clone(current);
        };

        let options = &self.inner.options;
        if let Some(dispatcher) = &options.dispatcher {
            dispatcher(&next);
        }
        let listeners: Vec<Arc<Listener>> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&next);
        }

        if let Some(observer) = options.after_change.clone() {
            let record = Arc::clone(&next);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { observer.on_change(record).await });
                }
                Err(_) => {
                    tracing::warn!("no Tokio runtime for after_change observer; running inline");
                    futures::executor::block_on(observer.on_change(record));
                }
            }
        }
        next
    }
}

fn split_roots(roots: &Value) -> HistoryResult<(Option<Value>, Option<Value>)> {
    let pick = |key: &str| roots.get(key).filter(|v| !v.is_undefined()).cloned();
    let (initial, state) = (pick(INITIAL), pick(STATE));
    if initial.is_none() && state.is_none() {
        return Err(HistoryError::MissingRoots);
    }
    Ok((initial, state))
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("record", &self.get())
            .field("in_transaction", &self.inner.in_transaction.load(Ordering::Relaxed))
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(j: serde_json::Value) -> Store {
        Store::create(j).unwrap()
    }

    #[test]
    fn test_create_rejects_leaves() {
        assert!(matches!(Store::create(json!(1)), Err(HistoryError::InvalidStore { found: "number" })));
        assert!(matches!(Store::create(json!(null)), Err(HistoryError::InvalidStore { .. })));
        assert!(matches!(Store::create(Value::Undefined), Err(HistoryError::InvalidStore { .. })));
        assert!(Store::create(json!([])).is_ok());
    }

    #[test]
    fn test_noop_set_returns_same_record() {
        let s = store(json!({"a": 1}));
        let before = s.get();
        let after = s.set("state.a", 1).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_reentrant_transaction_fails() {
        let s = store(json!({"a": 1}));
        let inner = s.clone();
        let err = s
            .commit(|draft| {
                draft.set("state.a", 2)?;
                inner.set("state.a", 3).map(drop)
            })
            .unwrap_err();
        assert!(matches!(err, HistoryError::TransactionInProgress));
        assert_eq!(s.get().state(), &json!({"a": 1}));
        // The flag is released after the failed transaction.
        assert!(s.set("state.a", 4).is_ok());
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let s = store(json!({"a": 1}));
        let err = s.set("state", json!([1])).unwrap_err();
        assert!(matches!(err, HistoryError::ShapeMismatch { .. }));
        assert_eq!(s.get().state(), &json!({"a": 1}));
    }

    #[test]
    fn test_split_roots() {
        assert!(matches!(split_roots(&Value::from(json!({"x": 1}))), Err(HistoryError::MissingRoots)));
        let (initial, state) = split_roots(&Value::from(json!({"state": {"a": 1}}))).unwrap();
        assert!(initial.is_none());
        assert_eq!(state.unwrap(), json!({"a": 1}));
    }
}
