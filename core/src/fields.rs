//! Custom field key normalization.
//!
//! Drip rejects custom field identifiers containing reserved characters, so
//! every key is rewritten before it leaves the process: `$` is dropped,
//! spaces become underscores and the result is lower-cased. Values are never
//! touched.

use serde_json::{Map, Value};

/// Custom fields keyed by (normalized) identifier.
pub type CustomFields = Map<String, Value>;

/// Rewrite `key` into a form Drip accepts. Idempotent.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '$')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Copy `fields` with every key normalized.
///
/// Keys that collapse onto the same normalized form keep the value that
/// comes last in iteration order.
pub fn normalized_fields(fields: &CustomFields) -> CustomFields {
    fields
        .iter()
        .map(|(key, value)| (normalize_key(key), value.clone()))
        .collect()
}
