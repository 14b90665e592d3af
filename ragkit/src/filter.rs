//! Metadata predicates used to pre-filter search candidates.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Metadata;

/// A predicate over chunk metadata.
///
/// Comparisons against a missing field are always false, including `Ne`.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::MetadataFilter;
///
/// let filter = MetadataFilter::and(vec![
///     MetadataFilter::eq("topic", "rust"),
///     MetadataFilter::gte("page", 3),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MetadataFilter {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field exists and differs from value.
    Ne { field: String, value: Value },
    /// Field is greater than value.
    Gt { field: String, value: Value },
    /// Field is greater than or equal to value.
    Gte { field: String, value: Value },
    /// Field is less than value.
    Lt { field: String, value: Value },
    /// Field is less than or equal to value.
    Lte { field: String, value: Value },
    /// Field equals one of the values.
    In { field: String, values: Vec<Value> },
    /// All nested filters match.
    And { filters: Vec<MetadataFilter> },
    /// At least one nested filter matches.
    Or { filters: Vec<MetadataFilter> },
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Eq { field: field.into(), value: value.into() }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Ne { field: field.into(), value: value.into() }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Gt { field: field.into(), value: value.into() }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Gte { field: field.into(), value: value.into() }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Lt { field: field.into(), value: value.into() }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Lte { field: field.into(), value: value.into() }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        MetadataFilter::In { field: field.into(), values }
    }

    pub fn and(filters: Vec<MetadataFilter>) -> Self {
        MetadataFilter::And { filters }
    }

    pub fn or(filters: Vec<MetadataFilter>) -> Self {
        MetadataFilter::Or { filters }
    }

    /// Evaluate the predicate against a metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            MetadataFilter::And { filters } => filters.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or { filters } => filters.iter().any(|f| f.matches(metadata)),
            MetadataFilter::In { field, values } => {
                metadata.get(field).is_some_and(|v| values.iter().any(|c| json_eq(v, c)))
            }
            MetadataFilter::Eq { field, value } => {
                metadata.get(field).is_some_and(|v| json_eq(v, value))
            }
            MetadataFilter::Ne { field, value } => {
                metadata.get(field).is_some_and(|v| !json_eq(v, value))
            }
            MetadataFilter::Gt { field, value } => compare(metadata, field, value, |o| o.is_gt()),
            MetadataFilter::Gte { field, value } => compare(metadata, field, value, |o| o.is_ge()),
            MetadataFilter::Lt { field, value } => compare(metadata, field, value, |o| o.is_lt()),
            MetadataFilter::Lte { field, value } => compare(metadata, field, value, |o| o.is_le()),
        }
    }

    /// Every field name this filter references, in first-seen order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            MetadataFilter::And { filters } | MetadataFilter::Or { filters } => {
                filters.iter().for_each(|f| f.collect_fields(out));
            }
            MetadataFilter::Eq { field, .. }
            | MetadataFilter::Ne { field, .. }
            | MetadataFilter::Gt { field, .. }
            | MetadataFilter::Gte { field, .. }
            | MetadataFilter::Lt { field, .. }
            | MetadataFilter::Lte { field, .. }
            | MetadataFilter::In { field, .. } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
        }
    }
}

fn compare(
    metadata: &Metadata,
    field: &str,
    value: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    metadata.get(field).and_then(|v| json_cmp(v, value)).is_some_and(accept)
}

/// Numbers compare by value so that `3` equals `3.0`.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn json_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
