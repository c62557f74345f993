//! Value comparison and selectors.
//!
//! Values are `serde_json::Value`s coming from messages and literals, so
//! comparisons coerce loosely between numbers, strings and booleans the way
//! message-driven flows expect: `"5" == 5`, `true == 1`, `null < 1`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::engine::Engine;
use crate::error::{PropertyError, UnknownOperator};
use crate::property::{PropertyContext, PropertySource};

const SET_DELIMITERS: &[char] = &[',', ';', '|'];
const TRUE_WORDS: &[&str] = &["true", "on", "yes", "y", "1", "ok", "enable", "enabled", "high", "active", "open"];
const FALSE_WORDS: &[&str] = &["false", "off", "no", "n", "0", "nok", "disable", "disabled", "low", "inactive", "closed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Strictly the boolean `true`.
    True,
    /// Strictly the boolean `false`.
    False,
    Null,
    NotNull,
    Empty,
    NotEmpty,
    /// Truthy word, number or boolean.
    TrueExpr,
    FalseExpr,
    NotTrueExpr,
    NotFalseExpr,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contain,
    ContainSome,
    ContainEvery,
}

impl CompareOp {
    /// Whether the operator reads a second operand.
    pub fn needs_operand(self) -> bool {
        matches!(
            self,
            CompareOp::Equal
                | CompareOp::NotEqual
                | CompareOp::Less
                | CompareOp::LessOrEqual
                | CompareOp::Greater
                | CompareOp::GreaterOrEqual
                | CompareOp::Contain
                | CompareOp::ContainSome
                | CompareOp::ContainEvery
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::True => "true",
            CompareOp::False => "false",
            CompareOp::Null => "null",
            CompareOp::NotNull => "nnull",
            CompareOp::Empty => "empty",
            CompareOp::NotEmpty => "nempty",
            CompareOp::TrueExpr => "true_expr",
            CompareOp::FalseExpr => "false_expr",
            CompareOp::NotTrueExpr => "ntrue_expr",
            CompareOp::NotFalseExpr => "nfalse_expr",
            CompareOp::Equal => "equal",
            CompareOp::NotEqual => "nequal",
            CompareOp::Less => "lt",
            CompareOp::LessOrEqual => "lte",
            CompareOp::Greater => "gt",
            CompareOp::GreaterOrEqual => "gte",
            CompareOp::Contain => "contain",
            CompareOp::ContainSome => "containSome",
            CompareOp::ContainEvery => "containEvery",
        }
    }
}

impl FromStr for CompareOp {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim() {
            "true" => CompareOp::True,
            "false" => CompareOp::False,
            "null" => CompareOp::Null,
            "nnull" => CompareOp::NotNull,
            "empty" => CompareOp::Empty,
            "nempty" => CompareOp::NotEmpty,
            "true_expr" => CompareOp::TrueExpr,
            "false_expr" => CompareOp::FalseExpr,
            "ntrue_expr" => CompareOp::NotTrueExpr,
            "nfalse_expr" => CompareOp::NotFalseExpr,
            "equal" | "==" => CompareOp::Equal,
            "nequal" | "!=" => CompareOp::NotEqual,
            "lt" | "<" => CompareOp::Less,
            "lte" | "<=" => CompareOp::LessOrEqual,
            "gt" | ">" => CompareOp::Greater,
            "gte" | ">=" => CompareOp::GreaterOrEqual,
            "contain" => CompareOp::Contain,
            "containSome" => CompareOp::ContainSome,
            "containEvery" => CompareOp::ContainEvery,
            other => return Err(UnknownOperator(other.to_string())),
        };
        Ok(op)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Coercion ─────────────────────────────────────────────────────────

fn number_text(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Text form of a value as used by containment checks.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_text(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| if v.is_null() { String::new() } else { to_text(v) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".into(),
    }
}

/// Numeric form of a value; `NaN` when it has none.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => to_number(&Value::String(to_text(value))),
    }
}

fn is_compound(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Loose equality.
///
/// Arrays and objects compare structurally with each other and by their
/// text form with scalars.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(_), Value::Number(_)) => to_number(a) == to_number(b),
        (Value::Bool(_), _) => loose_eq(&Value::from(to_number(a)), b),
        (_, Value::Bool(_)) => loose_eq(a, &Value::from(to_number(b))),
        _ if is_compound(a) && is_compound(b) => a == b,
        _ if is_compound(a) => loose_eq(&Value::String(to_text(a)), b),
        _ if is_compound(b) => loose_eq(a, &Value::String(to_text(b))),
        _ => to_number(a) == to_number(b),
    }
}

/// Loose ordering: text against text compares lexicographically, anything
/// else numerically. `None` when a side has no numeric form.
pub fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    let a = if is_compound(a) { Value::String(to_text(a)) } else { a.clone() };
    let b = if is_compound(b) { Value::String(to_text(b)) } else { b.clone() };
    match (&a, &b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(&a).partial_cmp(&to_number(&b)),
    }
}

/// Truthy words (`on`, `yes`, `enabled` …), non-zero numbers and `true`.
pub fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            TRUE_WORDS.contains(&s.as_str()) || s.parse::<f64>().is_ok_and(|n| n != 0.0 && !n.is_nan())
        }
        _ => false,
    }
}

/// Falsy words (`off`, `no`, `disabled` …), zero and `false`.
pub fn is_false(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !*b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            FALSE_WORDS.contains(&s.as_str()) || s.parse::<f64>() == Ok(0.0)
        }
        _ => false,
    }
}

fn emptiness(value: &Value) -> Option<bool> {
    match value {
        Value::String(s) => Some(s.is_empty()),
        Value::Array(items) => Some(items.is_empty()),
        Value::Object(map) => Some(map.is_empty()),
        _ => None,
    }
}

fn set_members(value: &Value) -> Vec<String> {
    to_text(value)
        .split(SET_DELIMITERS)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply `op` to `a` and, for binary operators, `b`.
pub fn compare(a: &Value, op: CompareOp, b: &Value) -> bool {
    match op {
        CompareOp::True => *a == Value::Bool(true),
        CompareOp::False => *a == Value::Bool(false),
        CompareOp::Null => a.is_null(),
        CompareOp::NotNull => !a.is_null(),
        CompareOp::Empty => emptiness(a).unwrap_or(false),
        CompareOp::NotEmpty => emptiness(a).is_some_and(|empty| !empty),
        CompareOp::TrueExpr => is_true(a),
        CompareOp::FalseExpr => is_false(a),
        CompareOp::NotTrueExpr => !is_true(a),
        CompareOp::NotFalseExpr => !is_false(a),
        CompareOp::Equal => loose_eq(a, b),
        CompareOp::NotEqual => !loose_eq(a, b),
        CompareOp::Less => loose_cmp(a, b) == Some(Ordering::Less),
        CompareOp::LessOrEqual => matches!(loose_cmp(a, b), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Greater => loose_cmp(a, b) == Some(Ordering::Greater),
        CompareOp::GreaterOrEqual => {
            matches!(loose_cmp(a, b), Some(Ordering::Greater | Ordering::Equal))
        }
        CompareOp::Contain => to_text(a).contains(&to_text(b)),
        CompareOp::ContainSome => {
            let text = to_text(a);
            set_members(b).iter().any(|v| text.contains(v.as_str()))
        }
        CompareOp::ContainEvery => {
            let text = to_text(a);
            set_members(b).iter().all(|v| text.contains(v.as_str()))
        }
    }
}

// ── Selectors ────────────────────────────────────────────────────────

/// A predicate deciding whether an alternate time source is active.
///
/// The operator is kept as text so an unknown verb surfaces at evaluation
/// time, where it is logged and falls back to the truthiness of `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub source: PropertySource,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub threshold: Option<PropertySource>,
}

fn default_operator() -> String {
    CompareOp::TrueExpr.as_str().into()
}

impl Selector {
    pub fn new(source: PropertySource, op: CompareOp, threshold: Option<PropertySource>) -> Self {
        Self {
            source,
            operator: op.as_str().into(),
            threshold,
        }
    }
}

impl Engine {
    /// Evaluate a selector against `ctx`.
    pub fn evaluate_selector(
        &self,
        selector: &Selector,
        ctx: &PropertyContext<'_>,
    ) -> Result<bool, PropertyError> {
        if selector.source == PropertySource::None {
            return Ok(false);
        }
        let a = self.fetch(&selector.source, ctx)?;
        let op = if selector.source.is_predicate() {
            CompareOp::True
        } else {
            match selector.operator.parse::<CompareOp>() {
                Ok(op) => op,
                Err(err) => {
                    error!(%err, "falling back to truthiness of the selector value");
                    return Ok(is_true(&a));
                }
            }
        };
        let b = match (&selector.threshold, op.needs_operand()) {
            (Some(threshold), true) => self.fetch(threshold, ctx)?,
            _ => Value::Null,
        };
        Ok(compare(&a, op, &b))
    }
}
