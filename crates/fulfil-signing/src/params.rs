//! # Carrier Parameters
//!
//! [`CarrierParams`] is the field map destined for a single carrier call.
//! Keys are kept in a `BTreeMap<String, _>`, whose ordering is the byte-wise
//! ordering of the UTF-8 key, which is the order the canonical string needs.

use std::collections::BTreeMap;

use serde_json::Value;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Absent value. Never signed, never sent.
    Null,
    /// Text value.
    Str(String),
    /// Integer value. Zero is a significant value.
    Int(i64),
    /// Flag, rendered `"1"` / `"0"`.
    Bool(bool),
    /// Arbitrary JSON. Objects and arrays render as JSON text.
    Json(Value),
    /// A list of sub-items. Excluded from the signature and appended to the
    /// form body as JSON text after signing.
    Items(Vec<Value>),
}

impl ParamValue {
    /// Whether this value is a sub-item list.
    pub fn is_items(&self) -> bool {
        matches!(self, Self::Items(_))
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for ParamValue {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Ordered field map for one carrier request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarrierParams {
    fields: BTreeMap<String, ParamValue>,
}

impl CarrierParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`CarrierParams::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.fields.get(name)
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.fields.remove(name)
    }

    /// Iterate fields in byte order of their names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields, including ones that will not be signed.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for CarrierParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_byte_ordered() {
        let params = CarrierParams::new()
            .with("b", "2")
            .with("B", "1")
            .with("a", "3")
            .with("_x", "4");
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["B", "_x", "a", "b"]);
    }

    #[test]
    fn option_none_becomes_null() {
        let v: ParamValue = Option::<String>::None.into();
        assert_eq!(v, ParamValue::Null);
        let v: ParamValue = Some(5u32).into();
        assert_eq!(v, ParamValue::Int(5));
    }

    #[test]
    fn insert_replaces_existing() {
        let mut params = CarrierParams::new();
        params.insert("weight", 100u32);
        params.insert("weight", 200u32);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("weight"), Some(&ParamValue::Int(200)));
    }
}
