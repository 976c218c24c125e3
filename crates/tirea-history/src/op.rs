//! Transaction kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which operation opened a transaction.
///
/// Handed to the transform hook so it can treat, for example, a reset
/// differently from an ordinary write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Direct replacement at a path or of whole roots.
    Set,
    /// Deep merge at a path or into whole roots.
    Merge,
    /// `state` reverted to `initial`.
    Reset,
    /// Callback with access to both roots.
    Commit,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Set => "set",
            OpKind::Merge => "merge",
            OpKind::Reset => "reset",
            OpKind::Commit => "commit",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
