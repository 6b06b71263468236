//! Set-flavoured operations over JSON values.
//!
//! These back the reconciler's update planning: `difference` computes the
//! minimal merge patch between two bodies, `nullify` turns a removed
//! subtree into explicit nulls, and `disjointed` reports whether two bodies
//! touch any of the same leaves.

use serde_json::{Map, Value};

/// True when `left` and `right` share no leaves.
///
/// Objects are disjoint when every key they share maps to disjoint values;
/// keys present on only one side do not make them joint. Arrays compare
/// element-wise over the shared indices, with extra elements on the longer
/// side counting as disjoint. Every other pairing is joint. Symmetric.
#[must_use]
pub fn disjointed(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => l.iter().all(|(key, lv)| match r.get(key) {
            Some(rv) => disjointed(lv, rv),
            None => true,
        }),
        (Value::Array(l), Value::Array(r)) => {
            l.iter().zip(r.iter()).all(|(lv, rv)| disjointed(lv, rv))
        }
        _ => false,
    }
}

/// The part of `left` not already present in `right`.
///
/// For objects this is a recursive set difference: keys whose values are
/// wholly contained in `right` are dropped, object-object pairs keep their
/// non-empty remainder, and any other pair keeps `left`'s value when it
/// differs from `right`'s. A non-object `left` comes back unchanged.
#[must_use]
pub fn difference(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut out = Map::new();
            for (key, lv) in l {
                match r.get(key) {
                    None => {
                        out.insert(key.clone(), lv.clone());
                    }
                    Some(rv) => match (lv, rv) {
                        (Value::Object(_), Value::Object(_)) => {
                            let inner = difference(lv, rv);
                            let keep = inner.as_object().is_some_and(|m| !m.is_empty());
                            if keep {
                                out.insert(key.clone(), inner);
                            }
                        }
                        _ => {
                            if lv != rv {
                                out.insert(key.clone(), lv.clone());
                            }
                        }
                    },
                }
            }
            Value::Object(out)
        }
        _ => left.clone(),
    }
}

/// Same object skeleton with every non-object leaf replaced by `null`.
/// A non-object input becomes `null`. Idempotent.
#[must_use]
pub fn nullify(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), nullify(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_with_no_shared_keys_are_disjoint() {
        let l = json!({"a": 1});
        let r = json!({"b": 2});
        assert!(disjointed(&l, &r));
        assert!(disjointed(&r, &l));
    }

    #[test]
    fn shared_scalar_keys_are_joint() {
        let l = json!({"a": 1, "x": true});
        let r = json!({"a": 9});
        assert!(!disjointed(&l, &r));
        assert!(!disjointed(&r, &l));
    }

    #[test]
    fn disjointedness_recurses_and_stays_symmetric() {
        let l = json!({"nest": {"a": 1}, "only_l": 1});
        let r = json!({"nest": {"b": 2}, "only_r": 2});
        assert!(disjointed(&l, &r));
        assert!(disjointed(&r, &l));

        let r_joint = json!({"nest": {"a": 0}});
        assert!(!disjointed(&l, &r_joint));
        assert!(!disjointed(&r_joint, &l));
    }

    #[test]
    fn array_extras_do_not_force_joint() {
        let l = json!([{"a": 1}]);
        let r = json!([{"b": 2}, {"a": 1}]);
        assert!(disjointed(&l, &r));
        assert!(disjointed(&r, &l));
        assert!(!disjointed(&json!([1]), &json!([1, 2])));
    }

    #[test]
    fn difference_drops_contained_keys() {
        let l = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": "x"});
        let r = json!({"a": 1, "b": {"c": 2, "d": 9}, "extra": true});
        assert_eq!(difference(&l, &r), json!({"b": {"d": 3}, "e": "x"}));
    }

    #[test]
    fn difference_keeps_changed_arrays_whole() {
        let l = json!({"tags": ["a", "b"]});
        assert_eq!(
            difference(&l, &json!({"tags": ["a"]})),
            json!({"tags": ["a", "b"]})
        );
        assert_eq!(difference(&l, &json!({"tags": ["a", "b"]})), json!({}));
    }

    #[test]
    fn difference_of_non_objects_is_left() {
        assert_eq!(difference(&json!(5), &json!(7)), json!(5));
        assert_eq!(difference(&json!([1]), &json!([1])), json!([1]));
    }

    #[test]
    fn nullify_builds_a_null_skeleton() {
        let v = json!({"a": 1, "b": {"c": "x", "d": [1, 2]}});
        assert_eq!(
            nullify(&v),
            json!({"a": null, "b": {"c": null, "d": null}})
        );
    }

    #[test]
    fn nullify_is_idempotent() {
        let v = json!({"a": 1, "b": {"c": "x"}, "arr": [1]});
        let once = nullify(&v);
        assert_eq!(nullify(&once), once);
        assert_eq!(nullify(&json!("scalar")), json!(null));
    }
}
