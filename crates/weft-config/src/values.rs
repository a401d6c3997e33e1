//! Configuration values exposed to grammar queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dotted configuration keys mapped to JSON values.
///
/// Queries reach these through `(#is? test.config "key value")`. A key
/// without an expected value passes when the stored value is truthy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigValues {
    entries: BTreeMap<String, Value>,
}

impl ConfigValues {
    /// Creates an empty value set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the value under `key` exists and is truthy.
    ///
    /// `null`, `false`, zero, and empty strings, arrays, or objects are
    /// falsy.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(value_is_truthy)
    }

    /// Whether the value under `key` renders as `expected`.
    ///
    /// Strings compare verbatim. Other values compare through their JSON
    /// rendering, so `true`, `4` and `null` match their literal spelling.
    #[must_use]
    pub fn matches(&self, key: &str, expected: &str) -> bool {
        match self.get(key) {
            Some(Value::String(text)) => text == expected,
            Some(Value::Number(number)) => expected
                .parse::<serde_json::Number>()
                .is_ok_and(|parsed| parsed == *number),
            Some(other) => other.to_string() == expected,
            None => false,
        }
    }
}

fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().map_or_else(
            || number.as_f64().is_some_and(|float| float.abs() > f64::EPSILON),
            |integer| integer != 0,
        ),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
