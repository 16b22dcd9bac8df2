//! Value model shared by every store variant
//!
//! Stores hold JSON-shaped data (`serde_json::Value`). A slot is
//! `Option<Json>` where `None` is the unready sentinel: the state a store
//! exposes before it has ever been given a value (e.g. a fetched store
//! before its first successful read). Equality, key lookup, and truthiness
//! are all defined over this model.

pub use serde_json::Value as Json;

/// Deep structural equality over the JSON value model.
///
/// Object comparison is key-order independent. Numbers compare numerically,
/// so `1`, `1u64`, and `1.0` are all equal to each other.
pub fn deep_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Null, Json::Null) => true,
        (Json::Bool(a), Json::Bool(b)) => a == b,
        (Json::Number(a), Json::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => a == b,
            },
        },
        (Json::String(a), Json::String(b)) => a == b,
        (Json::Array(a), Json::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| deep_eq(a, b))
        }
        (Json::Object(a), Json::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, va)| b.get(key).is_some_and(|vb| deep_eq(va, vb)))
        }
        _ => false,
    }
}

/// Equality lifted over slots; two unready slots are equal.
pub fn opt_eq(a: &Option<Json>, b: &Option<Json>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => deep_eq(a, b),
        _ => false,
    }
}

/// One-level key lookup. Unready slots and non-objects have no fields.
pub fn field<'a>(slot: &'a Option<Json>, key: &str) -> Option<&'a Json> {
    slot.as_ref()?.as_object()?.get(key)
}

/// Truthiness used by the fetched dependency gate; an unready slot is falsy.
pub fn is_truthy(slot: &Option<Json>) -> bool {
    slot.as_ref().is_some_and(is_truthy_value)
}

/// Falsy: null, `false`, numeric zero, empty strings, empty arrays, empty
/// objects. Everything else is truthy.
pub fn is_truthy_value(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_eq_ignores_object_key_order() {
        let a = json!({"x": 1, "y": [1, 2, {"z": "s"}]});
        let b = json!({"y": [1, 2, {"z": "s"}], "x": 1});
        assert!(deep_eq(&a, &b));
    }

    #[test]
    fn deep_eq_compares_numbers_numerically() {
        assert!(deep_eq(&json!(1), &json!(1.0)));
        assert!(!deep_eq(&json!(1), &json!(1.5)));
    }

    #[test]
    fn deep_eq_detects_nested_difference() {
        let a = json!({"x": {"y": 1}});
        let b = json!({"x": {"y": 2}});
        assert!(!deep_eq(&a, &b));
    }

    #[test]
    fn opt_eq_treats_unready_slots_as_equal() {
        assert!(opt_eq(&None, &None));
        assert!(!opt_eq(&None, &Some(json!(null))));
    }

    #[test]
    fn field_reads_one_level() {
        let slot = Some(json!({"x": 10, "y": {"z": 1}}));
        assert_eq!(field(&slot, "x"), Some(&json!(10)));
        assert_eq!(field(&slot, "missing"), None);
        assert_eq!(field(&Some(json!([1, 2])), "x"), None);
        assert_eq!(field(&None, "x"), None);
    }

    #[test]
    fn truthiness_rules() {
        assert!(!is_truthy(&None));
        assert!(!is_truthy(&Some(json!(null))));
        assert!(!is_truthy(&Some(json!(false))));
        assert!(!is_truthy(&Some(json!(0))));
        assert!(!is_truthy(&Some(json!(""))));
        assert!(!is_truthy(&Some(json!([]))));
        assert!(!is_truthy(&Some(json!({}))));

        assert!(is_truthy(&Some(json!(true))));
        assert!(is_truthy(&Some(json!(42))));
        assert!(is_truthy(&Some(json!("x"))));
        assert!(is_truthy(&Some(json!([0]))));
        assert!(is_truthy(&Some(json!({"k": 0}))));
    }
}
