//! Type coercion for externally supplied parameter values
//!
//! A `$param` node may declare `$coerce` to convert the raw criteria value
//! (always a string-ish scalar when it arrives from input bindings) into an
//! array, boolean, object, or number. Coercion never applies to a node's
//! `$default`, which is assumed to be authored with the right type already.

use regex::Regex;
use serde_json::{Number, Value};

/// How a `$param` value is split when coerced to an array.
#[derive(Debug, Clone)]
pub enum SplitToken {
    /// Split on a literal separator string.
    Literal(String),
    /// Split on a regular expression (`{"$regex": "..."}` in the document).
    Pattern(Regex),
}

impl Default for SplitToken {
    fn default() -> Self {
        SplitToken::Literal(",".to_string())
    }
}

/// Coercion kind declared by a `$param` node via `$coerce`.
#[derive(Debug, Clone)]
pub enum Coercion {
    /// Split the raw string into an array of strings.
    Array { split: SplitToken },
    /// Case-insensitive `"true"`/`"false"`; anything else is `true`.
    Boolean,
    /// Parse the raw string as a JSON number.
    Number,
    /// Parse the raw string as a JSON object literal.
    Object,
}

/// Apply a coercion to a raw criteria value.
///
/// Returns `None` when the input cannot be coerced (non-scalar input,
/// malformed JSON for `object`, unparseable `number`); the resolver then
/// falls back to the param's `$default`. `array` and `boolean` have no
/// failure case for string input by design: every string maps to a value.
pub fn coerce(raw: &Value, kind: &Coercion) -> Option<Value> {
    if let Coercion::Number = kind {
        return coerce_number(raw);
    }

    let text = scalar_text(raw)?;
    match kind {
        Coercion::Array { split } => Some(Value::Array(split_text(&text, split))),
        Coercion::Boolean => Some(Value::Bool(!text.eq_ignore_ascii_case("false"))),
        Coercion::Object => match serde_json::from_str::<Value>(&text) {
            Ok(parsed @ Value::Object(_)) => Some(parsed),
            _ => None,
        },
        Coercion::Number => unreachable!("handled above"),
    }
}

fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn split_text(text: &str, split: &SplitToken) -> Vec<Value> {
    // An empty input is an empty list, not a list with one empty element.
    if text.is_empty() {
        return Vec::new();
    }

    let parts: Vec<&str> = match split {
        SplitToken::Literal(token) => text.split(token.as_str()).collect(),
        SplitToken::Pattern(pattern) => pattern.split(text).collect(),
    };
    parts
        .into_iter()
        .map(|part| Value::String(part.to_string()))
        .collect()
}

fn coerce_number(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => {
            let parsed = s.parse::<f64>().ok().filter(|n| n.is_finite())?;
            Some(Value::Number(number_from_f64(parsed)?))
        }
        _ => None,
    }
}

fn number_from_f64(value: f64) -> Option<Number> {
    // Integral results materialize as JSON integers so they compare equal
    // to authored integer literals.
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}
