//! Path-addressed deep updates over structurally shared state, with change
//! tracking and a transactional history store.
//!
//! `tirea-history` keeps a `{initial, state}` pair of trees and publishes an
//! immutable [`History`] record after every transaction that changed one of
//! them. Untouched branches are shared by reference between records, and a
//! transaction that changes nothing hands back the very same record.
//!
//! # Core Concepts
//!
//! - **Value**: The tree. Objects and arrays are reference counted, so
//!   identity (`same_ref`) is observable
//! - **Path**: Segments parsed from dot/bracket expressions (`a.b[0]`,
//!   `list[-1]`, `a\.b`)
//! - **Accessors**: `get_at_path`, `update_at_path`, `merge_values`
//! - **ChangeTracker**: Records which paths were written, mirroring the
//!   shape of the tracked value
//! - **Store**: Runs transactions (`set`, `merge`, `commit`, `reset`,
//!   wrapped updaters) and publishes records
//! - **History**: `initial`, `state`, `prev`, `prevInitial` and a lazily
//!   computed `changes` diff
//!
//! # Quick Start
//!
//! ```
//! use tirea_history::Store;
//! use serde_json::json;
//!
//! let store = Store::create(json!({"counter": 0, "list": ["item1"]})).unwrap();
//!
//! store.set("state.counter", 10).unwrap();
//! store.set("state.list[1]", "item2").unwrap();
//!
//! let record = store.get();
//! assert_eq!(record.state()["counter"], json!(10));
//! assert_eq!(
//!     record.changes().unwrap().to_json(),
//!     json!({"counter": 10, "list": [null, "item2"]})
//! );
//!
//! // Back to the baseline: state is initial again, by reference.
//! let reset = store.reset().unwrap();
//! assert!(reset.state().same_ref(reset.initial()));
//! assert!(reset.changes().is_none());
//! ```
//!
//! # Drafts
//!
//! Callback operations receive a [`Draft`] (or a [`TrackedView`] at a path)
//! and edit it in place. Edits are invisible to readers until the
//! transaction finishes:
//!
//! ```
//! use tirea_history::Store;
//! use serde_json::json;
//!
//! let store = Store::create(json!({"pending": 0})).unwrap();
//! store.set("state.pending", 3).unwrap();
//! assert!(store.get().changes().is_some());
//!
//! // Confirm the optimistic value by syncing `initial` to `state`.
//! store
//!     .commit(|draft| {
//!         let pending = draft.state()["pending"].clone();
//!         draft.set("initial.pending", pending)?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert!(store.get().changes().is_none());
//! ```

mod access;
mod acts;
mod compare;
mod diff;
mod draft;
mod error;
mod history;
mod merge;
mod op;
mod options;
mod path;
mod store;
mod tracker;
mod value;

// Core types
pub use access::{
    delete_at_path, get_at_path, resolve_index, set_at_path, update_at_path, MAX_INDEX_GAP,
};
pub use compare::{CompareContext, CompareFn, Comparator};
pub use diff::compute_changes;
pub use error::{value_type_name, HistoryError, HistoryResult};
pub use merge::merge_values;
pub use path::{clear_path_cache, parse_path, path_cache_len, try_parse_path, Path, Seg, Target};
pub use value::{Map, Opaque, Value};

// Tracking and transactions
pub use draft::{CommitScope, CopyOnWrite, Draft, DraftBackend, DraftOptions};
pub use history::History;
pub use op::OpKind;
pub use options::{Dispatcher, StoreOptions, TransformFn};
pub use store::{Store, Update};
pub use tracker::{ChangeTracker, TrackedView};

// Facades
pub use acts::{ActFn, Acts, ChangeObserver, Listener, Setter, SubscriptionId};
