//! Metadata filter predicates.
//!
//! Filters use the `{field, operator, value}` shape for comparisons and
//! `{operator: AND|OR|NOT, conditions: [...]}` for logical combinations.
//! Fields are `id`, `content`, or `meta.<key>`; a bare key is read from
//! the metadata.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ragpipe_shared::{Document, RagPipeError, Result};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
}

/// Logical combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// A filter predicate over documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    /// Compare one document field against a literal.
    Comparison {
        field: String,
        operator: ComparisonOp,
        value: Value,
    },
    /// Combine nested filters.
    Logical {
        operator: LogicalOp,
        conditions: Vec<Filter>,
    },
}

impl Filter {
    /// Parse a filter from its JSON form.
    pub fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| RagPipeError::Filter(format!("invalid filter {value}: {e}")))
    }

    pub fn comparison(field: impl Into<String>, operator: ComparisonOp, value: Value) -> Self {
        Self::Comparison {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Eq, value)
    }

    pub fn greater_than(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Gt, value)
    }

    pub fn less_than(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Lt, value)
    }

    pub fn and(conditions: Vec<Filter>) -> Self {
        Self::Logical {
            operator: LogicalOp::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<Filter>) -> Self {
        Self::Logical {
            operator: LogicalOp::Or,
            conditions,
        }
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Document) -> Result<bool> {
        match self {
            Self::Comparison {
                field,
                operator,
                value,
            } => {
                let actual = resolve_field(doc, field);
                compare(actual.as_ref(), *operator, value, field)
            }
            Self::Logical {
                operator,
                conditions,
            } => match operator {
                LogicalOp::And => all_match(conditions, doc),
                LogicalOp::Or => {
                    for condition in conditions {
                        if condition.matches(doc)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                LogicalOp::Not => Ok(!all_match(conditions, doc)?),
            },
        }
    }
}

fn all_match(conditions: &[Filter], doc: &Document) -> Result<bool> {
    for condition in conditions {
        if !condition.matches(doc)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Read the value a filter field refers to.
fn resolve_field(doc: &Document, field: &str) -> Option<Value> {
    match field {
        "id" => Some(Value::String(doc.id.to_string())),
        "content" => Some(Value::String(doc.content.clone())),
        _ => {
            let key = field.strip_prefix("meta.").unwrap_or(field);
            doc.meta.get(key).cloned()
        }
    }
}

fn compare(actual: Option<&Value>, op: ComparisonOp, expected: &Value, field: &str) -> Result<bool> {
    match op {
        ComparisonOp::Eq => Ok(values_equal(actual, expected)),
        ComparisonOp::Ne => Ok(!values_equal(actual, expected)),
        ComparisonOp::In | ComparisonOp::NotIn => {
            let Value::Array(candidates) = expected else {
                return Err(RagPipeError::Filter(format!(
                    "'{}' on {field} requires a list value, got {expected}",
                    if op == ComparisonOp::In { "in" } else { "not in" }
                )));
            };
            let found = candidates.iter().any(|c| values_equal(actual, c));
            Ok(if op == ComparisonOp::In { found } else { !found })
        }
        ComparisonOp::Gt | ComparisonOp::Ge | ComparisonOp::Lt | ComparisonOp::Le => {
            let Some(actual) = actual else {
                return Ok(false);
            };
            let Some(ordering) = order_values(actual, expected, field)? else {
                return Ok(false);
            };
            Ok(match op {
                ComparisonOp::Gt => ordering.is_gt(),
                ComparisonOp::Ge => ordering.is_ge(),
                ComparisonOp::Lt => ordering.is_lt(),
                _ => ordering.is_le(),
            })
        }
    }
}

fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(a), b) => a == b,
    }
}

/// Order two values for `>`/`<` comparisons.
///
/// Returns `Ok(None)` when either side is null. Operands of different
/// types are a filter error rather than a silent mismatch.
fn order_values(
    actual: &Value,
    expected: &Value,
    field: &str,
) -> Result<Option<std::cmp::Ordering>> {
    match (actual, expected) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            Err(RagPipeError::Filter(format!(
                "cannot order {field}: lists and objects are not comparable"
            )))
        }
        (Value::Number(a), Value::Number(b)) => {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                return Ok(None);
            };
            Ok(a.partial_cmp(&b))
        }
        (Value::String(a), Value::String(b)) => match (parse_date(a), parse_date(b)) {
            (Some(a), Some(b)) => Ok(Some(a.cmp(&b))),
            _ => Err(RagPipeError::Filter(format!(
                "cannot order {field}: strings must be ISO 8601 dates"
            ))),
        },
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        (actual, expected) => Err(RagPipeError::Filter(format!(
            "cannot order {field}: stored {} is not comparable with {}",
            type_name(actual),
            type_name(expected)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Parse an ISO 8601 date or datetime, normalised to naive UTC.
fn parse_date(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
