//! Transformation parameters
//!
//! Parameters are a name -> value mapping. Insertion order is never
//! significant: two mappings holding the same pairs are equal and must
//! produce the same cache key.

use crate::error::{QueryError, Result};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Query options recognised when extracting parameters from a request
pub const QUERY_OPTIONS: &[&str] = &[
    "$filter", "$orderby", "$top", "$skip", "$select", "$expand", "$count", "$search", "$format",
];

/// Legacy options that are passed through alongside the standard ones
pub const LEGACY_OPTIONS: &[&str] = &["omit"];

/// A single parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Only used for values above `i64::MAX`
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Render a scalar value as text, the way it would appear in a query string
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            ParamValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            ParamValue::Int(i) => Some(Cow::Owned(i.to_string())),
            ParamValue::UInt(u) => Some(Cow::Owned(u.to_string())),
            ParamValue::Float(f) => Some(Cow::Owned(f.to_string())),
            ParamValue::Bool(b) => Some(Cow::Owned(b.to_string())),
            ParamValue::Null | ParamValue::List(_) | ParamValue::Map(_) => None,
        }
    }

    /// Check that the value has a canonical serialized form
    pub fn validate(&self) -> Result<()> {
        match self {
            ParamValue::Float(f) if !f.is_finite() => Err(QueryError::KeyDerivation(format!(
                "non-finite float {} has no canonical form",
                f
            ))),
            ParamValue::List(items) => items.iter().try_for_each(ParamValue::validate),
            ParamValue::Map(entries) => entries.values().try_for_each(ParamValue::validate),
            _ => Ok(()),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ParamValue::Null => serializer.serialize_unit(),
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::Int(i) => serializer.serialize_i64(*i),
            ParamValue::UInt(u) => serializer.serialize_u64(*u),
            ParamValue::Float(f) => {
                if !f.is_finite() {
                    return Err(S::Error::custom(format!("non-finite float {}", f)));
                }
                // -0.0 and 0.0 compare equal and must serialize identically
                let normalized = if *f == 0.0 { 0.0 } else { *f };
                serializer.serialize_f64(normalized)
            }
            ParamValue::Text(s) => serializer.serialize_str(s),
            ParamValue::List(items) => serializer.collect_seq(items),
            ParamValue::Map(entries) => serializer.collect_map(entries),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => ParamValue::Int(v),
            Err(_) => ParamValue::UInt(value),
        }
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::from(value as u64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ParamValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    ParamValue::UInt(u)
                } else {
                    // JSON numbers are always finite
                    ParamValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => ParamValue::Text(s),
            Value::Array(items) => ParamValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => {
                ParamValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Transformation parameters applied to a base collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    entries: HashMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building parameters programmatically
    pub fn builder() -> QueryParamsBuilder {
        QueryParamsBuilder::default()
    }

    /// Set a parameter, replacing any previous value under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    /// Builder-style variant of [`QueryParams::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(name)
    }

    /// Look up a query option by its bare name, accepting both the
    /// `$filter` and `filter` spellings. The `$` form wins if both are set.
    pub fn get_option(&self, option: &str) -> Option<&ParamValue> {
        let bare = option.trim_start_matches('$');
        self.entries
            .get(&format!("${}", bare))
            .or_else(|| self.entries.get(bare))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parameters ordered by name
    pub fn sorted(&self) -> BTreeMap<&str, &ParamValue> {
        self.iter().collect()
    }

    /// Keep only the recognised query options from a request's parameters
    pub fn from_request<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        let mut params = QueryParams::new();
        for (name, value) in pairs {
            let name = name.as_ref();
            if QUERY_OPTIONS.contains(&name) || LEGACY_OPTIONS.contains(&name) {
                params.insert(name, value);
            }
        }
        params
    }

    /// Build parameters from a JSON object
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(entries) => Ok(entries.into_iter().collect()),
            other => Err(QueryError::invalid_parameter(
                "params",
                format!("expected a JSON object, found {}", other),
            )),
        }
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Fluent builder for query options
#[derive(Debug, Clone, Default)]
pub struct QueryParamsBuilder {
    filters: Vec<String>,
    order_by: Vec<String>,
    top: Option<usize>,
    skip: Option<usize>,
    select: Vec<String>,
    expand: Vec<String>,
}

impl QueryParamsBuilder {
    /// Add a filter expression; multiple filters are combined with `and`
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.filters.push(expression.into());
        self
    }

    pub fn order(mut self, field: impl Into<String>, desc: bool) -> Self {
        let field = field.into();
        self.order_by
            .push(if desc { format!("{} desc", field) } else { field });
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.top = Some(count);
        self
    }

    pub fn offset(mut self, count: usize) -> Self {
        self.skip = Some(count);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn expand<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> QueryParams {
        let mut params = QueryParams::new();

        if !self.filters.is_empty() {
            let combined = self
                .filters
                .iter()
                .map(|f| format!("({})", f))
                .collect::<Vec<_>>()
                .join(" and ");
            params.insert("$filter", combined);
        }
        if !self.order_by.is_empty() {
            params.insert("$orderby", self.order_by.join(", "));
        }
        if let Some(top) = self.top {
            params.insert("$top", top.to_string());
        }
        if let Some(skip) = self.skip {
            params.insert("$skip", skip.to_string());
        }
        if !self.select.is_empty() {
            params.insert("$select", self.select.join(","));
        }
        if !self.expand.is_empty() {
            params.insert("$expand", self.expand.join(","));
        }

        params
    }
}
