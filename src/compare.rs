//! Deep comparison and merging of JSON resource representations.
//!
//! [`equal`] is deliberately asymmetric: the first argument is what the user
//! asked for, the second is what ARM reports. A `null` on the desired side
//! means "not managed" and always matches; keys that only exist on the
//! observed side are server-populated defaults and never cause a mismatch.
//! Consequently `equal(a, b)` and `equal(b, a)` may disagree.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Keys whose string values ARM treats case-insensitively.
const IDENTIFIER_KEYS: &[&str] = &["id", "location", "type", "resourceGroup", "resource_group"];

/// Whether `new` (desired) is satisfied by `old` (observed).
pub fn equal(new: &Value, old: &Value) -> bool {
    equal_at(new, old, None)
}

fn equal_at(new: &Value, old: &Value, key: Option<&str>) -> bool {
    match (new, old) {
        (Value::Null, _) => true,
        (Value::Object(new), Value::Object(old)) => new
            .iter()
            .all(|(k, v)| equal_at(v, old.get(k).unwrap_or(&Value::Null), Some(k))),
        (Value::Object(_), _) => false,
        (Value::Array(new), Value::Array(old)) => equal_sequences(new, old, key),
        (Value::Array(_), _) => false,
        (Value::String(a), Value::String(b)) if key.map_or(false, is_identifier_key) => {
            a.eq_ignore_ascii_case(b)
        }
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (a, b) => a == b,
    }
}

fn equal_sequences(new: &[Value], old: &[Value], key: Option<&str>) -> bool {
    if new.len() != old.len() {
        return false;
    }

    let mut new: Vec<&Value> = new.iter().collect();
    let mut old: Vec<&Value> = old.iter().collect();

    let all_objects = new.iter().chain(old.iter()).all(|v| v.is_object());
    let sort_key = if all_objects {
        ["id", "name"]
            .into_iter()
            .find(|k| new.iter().chain(old.iter()).all(|v| v.get(k).is_some()))
    } else {
        None
    };

    match sort_key {
        Some(k) => {
            new.sort_by(|a, b| compare_field(a, b, k));
            old.sort_by(|a, b| compare_field(a, b, k));
        }
        None if key.map_or(false, is_identifier_key) => {
            new.sort_by_key(|v| canonical(v).to_lowercase());
            old.sort_by_key(|v| canonical(v).to_lowercase());
        }
        None => {
            new.sort_by_key(|v| canonical(v));
            old.sort_by_key(|v| canonical(v));
        }
    }

    new.iter()
        .zip(old.iter())
        .all(|(n, o)| equal_at(n, o, key))
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let left = a.get(field).map(canonical).unwrap_or_default();
    let right = b.get(field).map(canonical).unwrap_or_default();
    left.to_lowercase().cmp(&right.to_lowercase())
}

/// Stable textual form used as the natural ordering of values.
fn canonical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", k, canonical(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

fn is_identifier_key(key: &str) -> bool {
    IDENTIFIER_KEYS.contains(&key)
        || ["Id", "_id", "Ids", "_ids"]
            .iter()
            .any(|suffix| key.ends_with(suffix))
}

/// Overlay `overlay` onto `base`.
///
/// Mappings merge key by key, recursively. A `null` in the overlay keeps the
/// base value; any other overlay value, sequences included, replaces it.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (_, Value::Null) => base.clone(),
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                if value.is_null() {
                    continue;
                }
                let next = match base.get(key) {
                    Some(existing) => merge(existing, value),
                    None => prune_nulls(value),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => prune_nulls(overlay),
    }
}

/// Drop `null` members from mappings, recursively.
///
/// Sequence elements are kept as is so positions are not shifted.
pub fn prune_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), prune_nulls(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(prune_nulls).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_is_reflexive() {
        for x in [
            json!(null),
            json!(1),
            json!("S1"),
            json!({"sku": {"name": "S1"}, "tags": {"a": "b"}}),
            json!([{"name": "b"}, {"name": "a"}]),
        ] {
            assert!(equal(&x, &x), "{} should equal itself", x);
        }
    }

    #[test]
    fn test_identifier_sequences_ignore_case_and_order() {
        let desired = json!({"resource_ids": ["/B", "/a"]});
        let observed = json!({"resource_ids": ["/a", "/b"]});
        assert!(equal(&desired, &observed));

        let labels_desired = json!({"labels": ["B", "a"]});
        let labels_observed = json!({"labels": ["a", "b"]});
        assert!(!equal(&labels_desired, &labels_observed));
    }

    #[test]
    fn test_null_desired_matches_anything() {
        for y in [json!(null), json!(3), json!({"a": 1}), json!(["x"])] {
            assert!(equal(&Value::Null, &y));
        }
    }

    #[test]
    fn test_asymmetric_in_null() {
        let desired = json!({"sku": null});
        let observed = json!({"sku": "S1"});
        assert!(equal(&desired, &observed));
        assert!(!equal(&observed, &desired));
    }

    #[test]
    fn test_extra_observed_keys_are_harmless() {
        let desired = json!({"sku": "S1"});
        let observed = json!({"id": "/x/item1", "sku": "S1", "extraServerField": "x"});
        assert!(equal(&desired, &observed));
        assert!(!equal(&observed, &desired));
    }

    #[test]
    fn test_scalar_difference_detected() {
        assert!(!equal(&json!({"sku": "S2"}), &json!({"sku": "S1"})));
        assert!(!equal(&json!({"sku": "S1"}), &json!({})));
    }

    #[test]
    fn test_mapping_against_non_mapping() {
        assert!(!equal(&json!({"a": 1}), &json!("a")));
        assert!(!equal(&json!({"a": 1}), &Value::Null));
    }

    #[test]
    fn test_strings_case_sensitive_by_default() {
        assert!(!equal(&json!({"sku": "s1"}), &json!({"sku": "S1"})));
    }

    #[test]
    fn test_identifier_fields_case_insensitive() {
        assert!(equal(
            &json!({"location": "EastUS"}),
            &json!({"location": "eastus"})
        ));
        assert!(equal(
            &json!({"subnetId": "/Subscriptions/A/resourceGroups/RG"}),
            &json!({"subnetId": "/subscriptions/a/resourcegroups/rg"})
        ));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(equal(&json!({"capacity": 1}), &json!({"capacity": 1.0})));
    }

    #[test]
    fn test_sequences_require_same_length() {
        assert!(!equal(&json!(["a"]), &json!(["a", "b"])));
    }

    #[test]
    fn test_sequences_of_mappings_ordered_by_id() {
        let desired = json!([{"id": "/b", "v": 2}, {"id": "/a", "v": 1}]);
        let observed = json!([{"id": "/A", "v": 1, "x": true}, {"id": "/b", "v": 2}]);
        assert!(equal(&desired, &observed));
    }

    #[test]
    fn test_sequences_of_mappings_ordered_by_name() {
        let desired = json!([{"name": "rule2", "port": 443}, {"name": "rule1", "port": 80}]);
        let observed = json!([{"name": "rule1", "port": 80}, {"name": "rule2", "port": 443}]);
        assert!(equal(&desired, &observed));

        let drifted = json!([{"name": "rule1", "port": 81}, {"name": "rule2", "port": 443}]);
        assert!(!equal(&desired, &drifted));
    }

    #[test]
    fn test_scalar_sequences_order_insensitive() {
        assert!(equal(&json!(["b", "a"]), &json!(["a", "b"])));
        assert!(!equal(&json!(["b", "c"]), &json!(["a", "b"])));
    }

    #[test]
    fn test_merge_nested() {
        let base = json!({"sku": {"name": "S1", "tier": "Standard"}, "location": "eastus"});
        let overlay = json!({"sku": {"name": "S2"}, "kind": null});
        assert_eq!(
            merge(&base, &overlay),
            json!({"sku": {"name": "S2", "tier": "Standard"}, "location": "eastus"})
        );
    }

    #[test]
    fn test_merge_replaces_sequences() {
        let base = json!({"rules": [1, 2, 3]});
        let overlay = json!({"rules": [4]});
        assert_eq!(merge(&base, &overlay), json!({"rules": [4]}));
    }

    #[test]
    fn test_prune_nulls() {
        let value = json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, 2]});
        assert_eq!(prune_nulls(&value), json!({"b": {"d": 1}, "e": [null, 2]}));
    }
}
