//! Store configuration.

use crate::{
    Acts, ChangeObserver, Comparator, CompareContext, CopyOnWrite, Draft, DraftBackend,
    DraftOptions, History, HistoryResult, OpKind, Value,
};
use std::fmt;
use std::sync::Arc;

/// Synchronous callback run right after a record is published.
pub type Dispatcher = dyn Fn(&Arc<History>) + Send + Sync;

/// Hook run before a draft is finalized: `(draft, current record, kind, patches)`.
pub type TransformFn =
    dyn Fn(&mut Draft, &History, OpKind, Option<Value>) -> HistoryResult<()> + Send + Sync;

/// Options recognised by [`Store::create_with`](crate::Store::create_with).
#[derive(Clone)]
pub struct StoreOptions {
    pub(crate) compare: Comparator,
    pub(crate) after_change: Option<Arc<dyn ChangeObserver>>,
    pub(crate) dispatcher: Option<Arc<Dispatcher>>,
    pub(crate) transform: Option<Arc<TransformFn>>,
    pub(crate) acts: Acts,
    pub(crate) draft: DraftOptions,
    pub(crate) backend: Arc<dyn DraftBackend>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            compare: Comparator::deep(),
            after_change: None,
            dispatcher: None,
            transform: None,
            acts: Acts::default(),
            draft: DraftOptions::default(),
            backend: Arc::new(CopyOnWrite),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace deep equality for no-op detection and diffing.
    #[must_use]
    pub fn with_compare<F>(mut self, compare: F) -> Self
    where
        F: Fn(&Value, &Value, &CompareContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.compare = Comparator::custom(compare);
        self
    }

    #[must_use]
    pub fn with_comparator(mut self, compare: Comparator) -> Self {
        self.compare = compare;
        self
    }

    /// Observer scheduled after every published record.
    #[must_use]
    pub fn with_after_change(mut self, observer: impl ChangeObserver + 'static) -> Self {
        self.after_change = Some(Arc::new(observer));
        self
    }

    #[must_use]
    pub fn with_dispatcher<F>(mut self, dispatcher: F) -> Self
    where
        F: Fn(&Arc<History>) + Send + Sync + 'static,
    {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Hook that may rewrite the draft before it is finalized.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&mut Draft, &History, OpKind, Option<Value>) -> HistoryResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    #[must_use]
    pub fn with_acts(mut self, acts: Acts) -> Self {
        self.acts = acts;
        self
    }

    #[must_use]
    pub fn with_draft_options(mut self, options: DraftOptions) -> Self {
        self.draft = options;
        self
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn DraftBackend>) -> Self {
        self.backend = backend;
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("compare", &self.compare)
            .field("after_change", &self.after_change.is_some())
            .field("dispatcher", &self.dispatcher.is_some())
            .field("transform", &self.transform.is_some())
            .field("acts", &self.acts)
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}
