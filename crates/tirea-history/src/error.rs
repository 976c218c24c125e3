//! Error types for tirea-history operations.

use crate::{Path, Value};
use thiserror::Error;

/// Result type alias for tirea-history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors that can occur while reading, writing or publishing history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The value handed to the store constructor is not a container.
    #[error("invalid store value: expected object or array, found {found}")]
    InvalidStore {
        /// Kind of the rejected value.
        found: &'static str,
    },

    /// A path expression could not be parsed or does not address a root.
    #[error("Invalid state path: {path:?}")]
    InvalidPath {
        /// The raw path expression.
        path: String,
    },

    /// A write tried to descend through a value that is not a container.
    #[error("invalid target type at {path}: found {found}, must be array or object")]
    InvalidTargetType {
        /// Path of the offending value.
        path: Path,
        /// Kind of the value found there.
        found: &'static str,
    },

    /// A segment cannot address the container it is applied to.
    #[error("invalid target key {key} for {container} at {path}")]
    InvalidTargetKey {
        /// Path of the container.
        path: Path,
        /// The rejected segment, rendered.
        key: String,
        /// Kind of the container.
        container: &'static str,
    },

    /// A negative array index resolved before the start of the array.
    #[error("array index {index} out of bounds for array length {len} at {path}")]
    IndexOutOfBounds {
        /// Path of the array.
        path: Path,
        /// The index as written by the caller.
        index: i64,
        /// Length of the array at resolution time.
        len: usize,
    },

    /// `set_roots`/`merge_roots` was called without `state` or `initial`.
    #[error("root update requires `state` or `initial`")]
    MissingRoots,

    /// A transaction left `state` and `initial` in different shape families.
    #[error("state and initial must both be objects or both be arrays (initial: {initial}, state: {state})")]
    ShapeMismatch {
        /// Kind of the finalized initial value.
        initial: &'static str,
        /// Kind of the finalized state value.
        state: &'static str,
    },

    /// Another transaction already holds the store's draft.
    #[error("a transaction is already in progress on this store")]
    TransactionInProgress,

    /// No action is registered under this name.
    #[error("unknown action: {name}")]
    UnknownAction {
        /// Requested action name.
        name: String,
    },

    /// Invalid operation error.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },
}

impl HistoryError {
    /// Create an invalid store error for the rejected value.
    #[inline]
    pub fn invalid_store(value: &Value) -> Self {
        HistoryError::InvalidStore {
            found: value_type_name(value),
        }
    }

    /// Create an invalid path error.
    #[inline]
    pub fn invalid_path(path: impl Into<String>) -> Self {
        HistoryError::InvalidPath { path: path.into() }
    }

    /// Create an invalid target type error.
    #[inline]
    pub fn invalid_target_type(path: Path, found: &Value) -> Self {
        HistoryError::InvalidTargetType {
            path,
            found: value_type_name(found),
        }
    }

    /// Create an invalid target key error.
    #[inline]
    pub fn invalid_target_key(path: Path, key: impl ToString, container: &Value) -> Self {
        HistoryError::InvalidTargetKey {
            path,
            key: key.to_string(),
            container: value_type_name(container),
        }
    }

    /// Create an index out of bounds error.
    #[inline]
    pub fn index_out_of_bounds(path: Path, index: i64, len: usize) -> Self {
        HistoryError::IndexOutOfBounds { path, index, len }
    }

    /// Create a shape mismatch error.
    #[inline]
    pub fn shape_mismatch(initial: &Value, state: &Value) -> Self {
        HistoryError::ShapeMismatch {
            initial: value_type_name(initial),
            state: value_type_name(state),
        }
    }

    /// Create an unknown action error.
    #[inline]
    pub fn unknown_action(name: impl Into<String>) -> Self {
        HistoryError::UnknownAction { name: name.into() }
    }

    /// Create an invalid operation error.
    #[inline]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        HistoryError::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Get the type name of a value.
#[inline]
pub fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Undefined => "undefined",
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Opaque(_) => "opaque",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = HistoryError::index_out_of_bounds(path!("state", "items"), -4, 3);
        assert_eq!(
            err.to_string(),
            "array index -4 out of bounds for array length 3 at $.state.items"
        );

        let err = HistoryError::invalid_path("a[1.5]");
        assert!(err.to_string().starts_with("Invalid state path"));

        let err = HistoryError::invalid_target_type(path!("a"), &Value::from(1));
        assert!(err.to_string().contains("must be array or object"));
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(value_type_name(&Value::Undefined), "undefined");
        assert_eq!(value_type_name(&Value::from(json!(null))), "null");
        assert_eq!(value_type_name(&Value::from(json!(true))), "boolean");
        assert_eq!(value_type_name(&Value::from(json!(42))), "number");
        assert_eq!(value_type_name(&Value::from(json!("hello"))), "string");
        assert_eq!(value_type_name(&Value::from(json!([1, 2, 3]))), "array");
        assert_eq!(value_type_name(&Value::from(json!({"a": 1}))), "object");
        assert_eq!(value_type_name(&Value::opaque(5u8)), "opaque");
    }
}
