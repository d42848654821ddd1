//! Filter predicate tree
//!
//! A structured boolean expression over chunk metadata. Predicates are
//! validated against a [`MetadataSchema`] before use and can be evaluated
//! locally with [`FilterPredicate::matches`] or translated by a store
//! gateway into its own filter syntax.
//!
//! Array-valued fields (such as keyword lists) match when any element does.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::errors::{RagError, Result};
use crate::filter::schema::{FieldKind, MetadataSchema};
use crate::types::{lookup_field, Metadata};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Ordering comparisons need numbers or strings
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean expression over metadata fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterPredicate {
    /// `field op value`
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// String field matches a regular expression
    Regex { field: String, pattern: String },
    /// Numeric field within inclusive bounds
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Field equals one of the listed values
    In { field: String, values: Vec<Value> },
    And { predicates: Vec<FilterPredicate> },
    Or { predicates: Vec<FilterPredicate> },
    Not { predicate: Box<FilterPredicate> },
}

impl FilterPredicate {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range {
            field: field.into(),
            min,
            max,
        }
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    pub fn and(predicates: Vec<FilterPredicate>) -> Self {
        Self::And { predicates }
    }

    pub fn or(predicates: Vec<FilterPredicate>) -> Self {
        Self::Or { predicates }
    }

    pub fn negate(predicate: FilterPredicate) -> Self {
        Self::Not {
            predicate: Box::new(predicate),
        }
    }

    /// Every field path referenced, in order of appearance
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { field, .. }
            | Self::Regex { field, .. }
            | Self::Range { field, .. }
            | Self::In { field, .. } => out.push(field),
            Self::And { predicates } | Self::Or { predicates } => {
                for p in predicates {
                    p.collect_fields(out);
                }
            }
            Self::Not { predicate } => predicate.collect_fields(out),
        }
    }

    /// Structural well-formedness and schema check
    pub fn validate(&self, schema: &MetadataSchema) -> Result<()> {
        match self {
            Self::Compare { field, op, value } => {
                check_field(field, schema)?;
                let kind = schema.kind_of(field);
                match value {
                    Value::Number(_) if kind.is_textual() || kind == FieldKind::Bool => {
                        invalid(format!("field '{}' is {:?}, got a number", field, kind))
                    }
                    Value::String(_) if kind.is_numeric() || kind == FieldKind::Bool => {
                        invalid(format!("field '{}' is {:?}, got a string", field, kind))
                    }
                    Value::Bool(_) if op.is_ordering() => {
                        invalid(format!("operator {} cannot compare booleans", op))
                    }
                    Value::Bool(_) if kind != FieldKind::Bool && kind != FieldKind::Any => {
                        invalid(format!("field '{}' is {:?}, got a boolean", field, kind))
                    }
                    Value::Number(_) | Value::String(_) | Value::Bool(_) => Ok(()),
                    other => invalid(format!("comparison value for '{}' must be a scalar, got {}", field, other)),
                }
            }
            Self::Regex { field, pattern } => {
                check_field(field, schema)?;
                let kind = schema.kind_of(field);
                if !(kind.is_textual() || kind == FieldKind::Any) {
                    return invalid(format!("regex on non-text field '{}'", field));
                }
                if pattern.is_empty() {
                    return invalid(format!("empty regex for field '{}'", field));
                }
                Regex::new(pattern)
                    .map(|_| ())
                    .map_err(|e| RagError::InvalidFilter(format!("bad regex for '{}': {}", field, e)))
            }
            Self::Range { field, min, max } => {
                check_field(field, schema)?;
                let kind = schema.kind_of(field);
                if !(kind.is_numeric() || kind == FieldKind::Any) {
                    return invalid(format!("range on non-numeric field '{}'", field));
                }
                match (min, max) {
                    (None, None) => invalid(format!("range on '{}' has no bounds", field)),
                    (Some(lo), Some(hi)) if lo > hi => {
                        invalid(format!("range on '{}' has min {} > max {}", field, lo, hi))
                    }
                    (Some(b), _) | (_, Some(b)) if !b.is_finite() => {
                        invalid(format!("range on '{}' has a non-finite bound", field))
                    }
                    _ => Ok(()),
                }
            }
            Self::In { field, values } => {
                check_field(field, schema)?;
                if values.is_empty() {
                    return invalid(format!("empty value list for '{}'", field));
                }
                if let Some(bad) = values.iter().find(|v| !is_scalar(v)) {
                    return invalid(format!("list values for '{}' must be scalars, got {}", field, bad));
                }
                Ok(())
            }
            Self::And { predicates } | Self::Or { predicates } => {
                if predicates.is_empty() {
                    return invalid("logical operator with no operands".to_string());
                }
                predicates.iter().try_for_each(|p| p.validate(schema))
            }
            Self::Not { predicate } => predicate.validate(schema),
        }
    }

    /// Compile regexes once for repeated evaluation
    pub fn compile(&self) -> Result<CompiledPredicate<'_>> {
        let node = match self {
            Self::Regex { field, pattern } => CompiledPredicate::Regex {
                field,
                regex: Regex::new(pattern)
                    .map_err(|e| RagError::InvalidFilter(format!("bad regex for '{}': {}", field, e)))?,
            },
            Self::And { predicates } => {
                CompiledPredicate::And(predicates.iter().map(Self::compile).collect::<Result<_>>()?)
            }
            Self::Or { predicates } => {
                CompiledPredicate::Or(predicates.iter().map(Self::compile).collect::<Result<_>>()?)
            }
            Self::Not { predicate } => CompiledPredicate::Not(Box::new(predicate.compile()?)),
            other => CompiledPredicate::Plain(other),
        };
        Ok(node)
    }

    /// Evaluate against metadata. An uncompilable regex matches nothing.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.compile().map_or(false, |c| c.matches(metadata))
    }
}

fn invalid(message: String) -> Result<()> {
    Err(RagError::InvalidFilter(message))
}

fn check_field(field: &str, schema: &MetadataSchema) -> Result<()> {
    if field.is_empty() || field.split('.').any(str::is_empty) {
        return invalid(format!("malformed field path '{}'", field));
    }
    if !schema.knows(field) {
        return invalid(format!("unknown field '{}'", field));
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_) | Value::Bool(_))
}

/// Predicate with regexes compiled, borrowed from a [`FilterPredicate`]
#[derive(Debug)]
pub enum CompiledPredicate<'a> {
    Plain(&'a FilterPredicate),
    Regex { field: &'a str, regex: Regex },
    And(Vec<CompiledPredicate<'a>>),
    Or(Vec<CompiledPredicate<'a>>),
    Not(Box<CompiledPredicate<'a>>),
}

impl CompiledPredicate<'_> {
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::And(nodes) => nodes.iter().all(|n| n.matches(metadata)),
            Self::Or(nodes) => nodes.iter().any(|n| n.matches(metadata)),
            Self::Not(node) => !node.matches(metadata),
            Self::Regex { field, regex } => lookup_field(metadata, field).map_or(false, |v| {
                any_element(v, |item| item.as_str().map_or(false, |s| regex.is_match(s)))
            }),
            Self::Plain(predicate) => match *predicate {
                FilterPredicate::Compare { field, op, value } => match lookup_field(metadata, field) {
                    None => *op == CompareOp::Ne,
                    Some(actual) if *op == CompareOp::Ne => {
                        !any_element(actual, |item| compare_values(item, value) == Some(Ordering::Equal))
                    }
                    Some(actual) => any_element(actual, |item| {
                        compare_values(item, value).map_or(false, |ordering| op.holds(ordering))
                    }),
                },
                FilterPredicate::Range { field, min, max } => {
                    lookup_field(metadata, field).map_or(false, |actual| {
                        any_element(actual, |item| {
                            item.as_f64().map_or(false, |n| {
                                min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)
                            })
                        })
                    })
                }
                FilterPredicate::In { field, values } => {
                    lookup_field(metadata, field).map_or(false, |actual| {
                        any_element(actual, |item| {
                            values
                                .iter()
                                .any(|v| compare_values(item, v) == Some(Ordering::Equal))
                        })
                    })
                }
                // compile() never wraps these in Plain
                FilterPredicate::Regex { .. }
                | FilterPredicate::And { .. }
                | FilterPredicate::Or { .. }
                | FilterPredicate::Not { .. } => false,
            },
        }
    }
}

fn any_element(value: &Value, mut test: impl FnMut(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(test),
        other => test(other),
    }
}

/// Order two scalars of the same type; `None` for incomparable pairs
fn compare_values(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn fmt_value(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "{:?}", s),
        other => write!(f, "{}", other),
    }
}

fn fmt_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e15 {
        format!("{}", bound as i64)
    } else {
        format!("{}", bound)
    }
}

/// Renders the textual filter grammar accepted by the parser
impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { field, op, value } => {
                write!(f, "{} {} ", field, op)?;
                fmt_value(value, f)
            }
            Self::Regex { field, pattern } => write!(f, "{} regex {:?}", field, pattern),
            Self::Range { field, min, max } => match (min, max) {
                (Some(lo), Some(hi)) => write!(f, "{} between {} and {}", field, fmt_bound(*lo), fmt_bound(*hi)),
                (Some(lo), None) => write!(f, "{} >= {}", field, fmt_bound(*lo)),
                (None, Some(hi)) => write!(f, "{} <= {}", field, fmt_bound(*hi)),
                (None, None) => write!(f, "{} between - and -", field),
            },
            Self::In { field, values } => {
                write!(f, "{} in [", field)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt_value(value, f)?;
                }
                f.write_str("]")
            }
            Self::And { predicates } | Self::Or { predicates } => {
                let joiner = if matches!(self, Self::And { .. }) { " and " } else { " or " };
                f.write_str("(")?;
                for (i, p) in predicates.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{}", p)?;
                }
                f.write_str(")")
            }
            Self::Not { predicate } => write!(f, "not ({})", predicate),
        }
    }
}
