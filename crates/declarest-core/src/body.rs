//! Response body normalization.
//!
//! After every mutation the engine reads the resource back and folds the
//! server's answer into the body it persists. Normalization keeps that
//! persisted body drift-free: paths the caller declared as ignored or
//! write-only are pruned from the server's answer, and the result is
//! intersected against the previously declared body so server-added
//! fields disappear and pruned fields stay pinned to their declared
//! values.

use serde_json::Value;

use crate::attrpath::AttrPath;

/// Folds `server` into the persisted body, given the previously declared
/// `prior` body.
///
/// A null `prior` means no body has been declared yet (a freshly imported
/// resource); the server body is adopted wholesale. Otherwise the ignored
/// and write-only paths are deleted from a copy of the server body, which
/// is then intersected against `prior`: keys the pruned server body still
/// carries take the server's value, keys it lost keep `prior`'s, and keys
/// only the server has are dropped. Arrays recurse element-wise when the
/// lengths match and are taken from the server verbatim when they differ.
#[must_use]
pub fn normalize(
    prior: &Value,
    server: &Value,
    ignore: &[AttrPath],
    write_only: &[AttrPath],
) -> Value {
    if prior.is_null() {
        return server.clone();
    }
    let mut pruned = server.clone();
    for path in ignore.iter().chain(write_only) {
        path.remove(&mut pruned);
    }
    intersect(prior, &pruned)
}

fn intersect(prior: &Value, server: &Value) -> Value {
    match (prior, server) {
        (Value::Object(p), Value::Object(s)) => {
            let mut out = serde_json::Map::new();
            for (key, pv) in p {
                let merged = match s.get(key) {
                    Some(sv) => intersect(pv, sv),
                    None => pv.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (Value::Array(p), Value::Array(s)) => {
            if p.len() == s.len() {
                Value::Array(p.iter().zip(s.iter()).map(|(pv, sv)| intersect(pv, sv)).collect())
            } else {
                Value::Array(s.clone())
            }
        }
        _ => server.clone(),
    }
}

// ============================================================================
// Tests
// ============================================================================
