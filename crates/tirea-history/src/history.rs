//! Published history records.

use crate::{compute_changes, get_at_path, Comparator, HistoryError, HistoryResult, Seg, Target, Value};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// Immutable snapshot of a store.
///
/// Records are published as `Arc<History>`. A transaction that changes
/// nothing hands back the same `Arc`, so pointer equality is a valid
/// "did anything happen" check.
pub struct History {
    initial: Value,
    state: Value,
    prev: Option<Value>,
    prev_initial: Option<Value>,
    changes: OnceLock<Option<Value>>,
    compare: Comparator,
}

impl History {
    /// First record of a store: `initial` and `state` are the same value.
    pub fn new(initial: Value, compare: Comparator) -> Self {
        Self {
            state: initial.clone(),
            initial,
            prev: None,
            prev_initial: None,
            changes: OnceLock::from(None),
            compare,
        }
    }

    /// Build the successor record. `None` roots are carried over, and the
    /// matching `prev` field is inherited instead of advanced.
    pub(crate) fn advance(&self, initial: Option<Value>, state: Option<Value>) -> Self {
        let (prev_initial, initial) = match initial {
            Some(next) => (Some(self.initial.clone()), next),
            None => (self.prev_initial.clone(), self.initial.clone()),
        };
        let (prev, state) = match state {
            Some(next) => (Some(self.state.clone()), next),
            None => (self.prev.clone(), self.state.clone()),
        };
        Self {
            initial,
            state,
            prev,
            prev_initial,
            changes: OnceLock::new(),
            compare: self.compare.clone(),
        }
    }

    #[inline]
    pub fn initial(&self) -> &Value {
        &self.initial
    }

    #[inline]
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// `state` before the last transaction that changed it.
    #[inline]
    pub fn prev(&self) -> Option<&Value> {
        self.prev.as_ref()
    }

    /// `initial` before the last transaction that changed it.
    #[inline]
    pub fn prev_initial(&self) -> Option<&Value> {
        self.prev_initial.as_ref()
    }

    /// Difference between `initial` and `state`, computed on first access.
    pub fn changes(&self) -> Option<&Value> {
        self.changes
            .get_or_init(|| compute_changes(&self.initial, &self.state, &self.compare))
            .as_ref()
    }

    /// True when `state` differs from `initial`.
    pub fn is_dirty(&self) -> bool {
        self.changes().is_some()
    }

    /// Read through the record.
    ///
    /// The first segment picks the field (`state`, `initial`, `prev`,
    /// `prevInitial` or `changes`); the rest is a read-mode path into it.
    pub fn get(&self, target: impl Into<Target>) -> HistoryResult<Option<&Value>> {
        let target = target.into();
        let path = target.resolve()?;
        let Some((Seg::Key(field), rest)) = path.segments().split_first() else {
            return Err(HistoryError::invalid_path(target.to_string()));
        };
        let root = match field.as_str() {
            "state" => Some(&self.state),
            "initial" => Some(&self.initial),
            "prev" => self.prev(),
            "prevInitial" => self.prev_initial(),
            "changes" => self.changes(),
            _ => return Err(HistoryError::invalid_path(target.to_string())),
        };
        Ok(root.and_then(|value| get_at_path(value, rest)))
    }

    /// Render the record as an object value. Absent fields are `Undefined`.
    pub fn to_value(&self) -> Value {
        Value::object([
            ("initial", self.initial.clone()),
            ("state", self.state.clone()),
            ("prev", Value::from(self.prev.clone())),
            ("prevInitial", Value::from(self.prev_initial.clone())),
            ("changes", Value::from(self.changes().cloned())),
        ])
    }
}

impl Serialize for History {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("initial", &self.initial)
            .field("state", &self.state)
            .field("prev", &self.prev)
            .field("prev_initial", &self.prev_initial)
            .field("changes", &self.changes.get())
            .finish()
    }
}
