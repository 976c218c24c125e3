//! Facades over the store: named actions, curried setters, listeners and
//! after-change observers.

use crate::{History, HistoryResult, Path, Store, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A named action: receives the store and a call-time argument.
pub type ActFn = dyn Fn(&Store, Value) -> HistoryResult<Arc<History>> + Send + Sync;

/// Listener notified synchronously with every published record.
pub type Listener = dyn Fn(&Arc<History>) + Send + Sync;

/// Registry of named actions, fixed when the store is created.
#[derive(Clone, Default)]
pub struct Acts {
    actions: BTreeMap<String, Arc<ActFn>>,
}

impl Acts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action, replacing any previous one with the same name.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Store, Value) -> HistoryResult<Arc<History>> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ActFn>> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for Acts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.actions.keys()).finish()
    }
}

/// Handle returned by [`Store::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// Observer run after a record is published, off the publishing call.
#[async_trait]
pub trait ChangeObserver: Send + Sync {
    async fn on_change(&self, history: Arc<History>);
}

#[async_trait]
impl<F, Fut> ChangeObserver for F
where
    F: Fn(Arc<History>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_change(&self, history: Arc<History>) {
        (self)(history).await
    }
}

/// Setter bound to one path, from [`Store::setter`].
#[derive(Clone, Debug)]
pub struct Setter {
    store: Store,
    path: Path,
}

impl Setter {
    pub(crate) fn new(store: Store, path: Path) -> Self {
        Self { store, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the value at the bound path.
    pub fn set(&self, value: impl Into<Value>) -> HistoryResult<Arc<History>> {
        let value: Value = value.into();
        self.store.set(self.path.clone(), value)
    }

    /// Deep-merge into the value at the bound path.
    pub fn merge(&self, source: impl Into<Value>) -> HistoryResult<Arc<History>> {
        self.store.merge(self.path.clone(), source)
    }

    /// Compute the new value from the current one.
    pub fn update<F>(&self, updater: F) -> HistoryResult<Arc<History>>
    where
        F: FnOnce(&Value) -> Value,
    {
        self.store.update(self.path.clone(), updater)
    }
}
