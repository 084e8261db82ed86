//! Query parameters understood by the store.

use std::collections::BTreeMap;

use url::form_urlencoded;

pub const AUTH: &str = "auth";
pub const SHALLOW: &str = "shallow";
pub const FORMAT: &str = "format";
pub const FORMAT_EXPORT: &str = "export";
pub const ORDER_BY: &str = "orderBy";
pub const LIMIT_TO_FIRST: &str = "limitToFirst";
pub const LIMIT_TO_LAST: &str = "limitToLast";
pub const START_AT: &str = "startAt";
pub const END_AT: &str = "endAt";
pub const EQUAL_TO: &str = "equalTo";

/// Query parameter map: each key holds an ordered list of values.
///
/// Keys are kept sorted so the encoded query string is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    /// Empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), vec![value.into()]);
    }

    /// Add `value` after any existing values of `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    /// Drop `key` and all its values.
    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Form-urlencode into `k=v&k=v`, keys sorted, values in insertion order.
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.values {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }
}

/// Render a filter value the way the store expects it.
///
/// Integer and boolean literals pass through; anything else becomes a JSON
/// string, with any quotes the caller already wrapped it in removed first.
pub fn escape_value(value: &str) -> String {
    if value.parse::<i64>().is_ok() || value == "true" || value == "false" {
        return value.to_string();
    }
    let trimmed = value.trim_matches('"');
    serde_json::Value::String(trimmed.to_string()).to_string()
}
