use std::collections::BTreeMap;

use serde_json::Value;

/// Replaces the value of every object member named `key`, at any depth.
///
/// Replaced values are not descended into. Arrays are walked element by
/// element, including arrays nested in arrays.
pub fn replace_key(document: &mut Value, key: &str, replacement: &Value) {
    match document {
        Value::Object(members) => {
            for (name, value) in members.iter_mut() {
                if name == key {
                    *value = replacement.clone();
                } else {
                    replace_key(value, key, replacement);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                replace_key(item, key, replacement);
            }
        }
        _ => {}
    }
}

pub fn apply_defaults(document: &mut Value, defaults: &BTreeMap<String, Value>) {
    for (key, replacement) in defaults {
        replace_key(document, key, replacement);
    }
}
