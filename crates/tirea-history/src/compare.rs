//! Pluggable equality used for no-op detection and diffing.

use crate::{Seg, Value};
use std::fmt;
use std::sync::Arc;

/// Custom equality function: `(prev, next, context) -> considered equal`.
pub type CompareFn = dyn Fn(&Value, &Value, &CompareContext<'_>) -> bool + Send + Sync;

/// Where in the tree a comparison happens.
#[derive(Debug, Clone, Copy)]
pub struct CompareContext<'a> {
    keys: &'a [Seg],
}

impl<'a> CompareContext<'a> {
    /// Context for a comparison at `keys` (empty for the roots).
    pub fn new(keys: &'a [Seg]) -> Self {
        Self { keys }
    }

    /// The segment under comparison, `None` at the root.
    pub fn key(&self) -> Option<&'a Seg> {
        self.keys.last()
    }

    /// Full path from the compared roots to this pair.
    pub fn keys(&self) -> &'a [Seg] {
        self.keys
    }

    /// The default comparator, for custom functions that only special-case
    /// some paths.
    pub fn cmp(&self, prev: &Value, next: &Value) -> bool {
        prev == next
    }
}

/// Equality strategy. Defaults to deep structural equality.
#[derive(Clone, Default)]
pub struct Comparator {
    custom: Option<Arc<CompareFn>>,
}

impl Comparator {
    /// Deep structural equality.
    pub fn deep() -> Self {
        Self::default()
    }

    /// Wrap a custom equality function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value, &CompareContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            custom: Some(Arc::new(f)),
        }
    }

    /// True if a custom function is installed.
    pub fn is_custom(&self) -> bool {
        self.custom.is_some()
    }

    /// Compare two values. Identical values are always equal.
    pub fn equal(&self, prev: &Value, next: &Value, keys: &[Seg]) -> bool {
        if prev.same_ref(next) {
            return true;
        }
        match &self.custom {
            Some(f) => f(prev, next, &CompareContext::new(keys)),
            None => prev == next,
        }
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator")
            .field("custom", &self.custom.is_some())
            .finish()
    }
}
