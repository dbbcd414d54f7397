//! Key-case codec between the wire and in-memory naming conventions.
//!
//! The backend speaks `snake_case`; in-memory records use `camelCase`.
//! Both directions recurse through arrays element-wise and through objects
//! key-wise. Scalars and `null` pass through unchanged.
//!
//! [`to_wire_form`] is lossy: any key whose value is falsy (`0`, `""`,
//! `false`, `null`) is dropped, and [`to_internal_form`] does not put it
//! back. A round trip is therefore only exact for mappings without falsy
//! values.

use serde_json::{Map, Value};

/// Converts a value to wire form: `sendTimestamp` becomes `send_timestamp`
/// and falsy-valued keys are omitted.
pub fn to_wire_form(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(to_wire_form).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !is_falsy(v))
                .map(|(k, v)| (camel_to_snake(&k), to_wire_form(v)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

/// Converts a value to internal form: `send_timestamp` becomes
/// `sendTimestamp`.
pub fn to_internal_form(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(to_internal_form).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (snake_to_camel(&k), to_internal_form(v)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        // Empty arrays and objects are kept.
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(next) if c == '_' && next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}
