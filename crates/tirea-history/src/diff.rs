//! Structural diff between `initial` and `state`.

use crate::{Comparator, Map, Seg, Value};

/// Compute the `changes` projection of a history record.
///
/// Returns `None` when the comparator considers both roots equal, or when no
/// key or index below them differs. Otherwise:
///
/// - object pairs produce an object holding only the keys whose values
///   differ, recursively; keys removed from `state` appear as `Undefined`
/// - array pairs produce a sparse array as long as the longer input, with
///   `Undefined` at unchanged indices and the new element at changed ones
/// - any other pair produces `state` itself
///
/// The result is a pure function of its inputs.
pub fn compute_changes(initial: &Value, state: &Value, cmp: &Comparator) -> Option<Value> {
    let mut keys = Vec::new();
    diff_at(initial, state, cmp, &mut keys)
}

fn diff_at(initial: &Value, state: &Value, cmp: &Comparator, keys: &mut Vec<Seg>) -> Option<Value> {
    if cmp.equal(initial, state, keys) {
        return None;
    }

    let undefined = Value::Undefined;
    match (initial, state) {
        (Value::Object(before), Value::Object(after)) => {
            let mut out = Map::new();
            for (key, next) in after.iter() {
                keys.push(Seg::Key(key.clone()));
                let prev = before.get(key).unwrap_or(&undefined);
                if let Some(changed) = diff_at(prev, next, cmp, keys) {
                    out.insert(key.clone(), changed);
                }
                keys.pop();
            }
            for (key, prev) in before.iter() {
                if after.contains_key(key) {
                    continue;
                }
                keys.push(Seg::Key(key.clone()));
                if !cmp.equal(prev, &undefined, keys) {
                    out.insert(key.clone(), Value::Undefined);
                }
                keys.pop();
            }
            (!out.is_empty()).then(|| Value::from(out))
        }
        (Value::Array(before), Value::Array(after)) => {
            let len = before.len().max(after.len());
            let mut out = Vec::with_capacity(len);
            let mut any = false;
            for index in 0..len {
                let prev = before.get(index).unwrap_or(&undefined);
                let next = after.get(index).unwrap_or(&undefined);
                keys.push(Seg::Index(index as i64));
                if cmp.equal(prev, next, keys) {
                    out.push(Value::Undefined);
                } else {
                    any = true;
                    out.push(next.clone());
                }
                keys.pop();
            }
            any.then(|| Value::from(out))
        }
        _ => Some(state.clone()),
    }
}
