//! Typed extraction of leaf values from a nested JSON document.
//!
//! [`extract`] walks a path of object keys and coerces whatever it finds to the
//! requested [`FieldKind`]. A missing key anywhere along the path, a JSON
//! `null`, an empty string, or the agent sentinel `"N/A"` all mean "absent"
//! and yield `None`; callers persist that as SQL `NULL`.
//!
//! Text is HTML-escaped on the way in so that later read surfaces (dashboards,
//! CSV opened in a browser) never see raw markup from an agent.

use serde::Serialize;
use serde_json::Value;

/// Sentinel agents send when a test produced no measurement.
const NOT_AVAILABLE: &str = "N/A";

/// How a leaf value is coerced after it has been found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// HTML-escaped string.
    Text,
    /// 64-bit float; strings contribute their leading numeric prefix.
    Float,
    /// 64-bit integer; fractional values truncate toward zero.
    Int,
    /// The JSON value, unchanged. No [`crate::SAMPLE_FIELDS`] column uses it
    /// today; it exists for measurements whose shape varies between agents.
    Raw,
}

/// A coerced leaf value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Float(f64),
    Int(i64),
    Raw(Value),
}

impl FieldValue {
    /// The value as a float, for `Float` and `Int` variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Follow `path` through nested objects in `root` and coerce the leaf to `kind`.
///
/// Returns `None` when any key along the path is missing, when an intermediate
/// value is not an object, or when the leaf is blank (see module docs). Arrays
/// and objects cannot be coerced to numbers and also yield `None` for
/// [`FieldKind::Float`] and [`FieldKind::Int`].
pub fn extract(root: &Value, path: &[&str], kind: FieldKind) -> Option<FieldValue> {
    let mut current = root;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }

    if is_blank(current) {
        return None;
    }

    match kind {
        FieldKind::Text => text_of(current).map(|t| FieldValue::Text(escape_html(&t))),
        FieldKind::Float => coerce_f64(current).map(FieldValue::Float),
        FieldKind::Int => coerce_f64(current)
            .map(|f| match current.as_i64() {
                Some(i) => i,
                None => f as i64,
            })
            .map(FieldValue::Int),
        FieldKind::Raw => Some(FieldValue::Raw(current.clone())),
    }
}

/// Escape the five characters that are significant in HTML text and
/// attribute values. Single quotes become `&#039;`.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

// --- helpers -----------------------------------------------------------------

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s == NOT_AVAILABLE,
        _ => false,
    }
}

/// `true` reads as `"1"`; `false` reads as empty text and so is absent.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".into()),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(numeric_prefix(s)),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Parse the longest leading decimal number in `s` (after leading whitespace),
/// e.g. `"45.2 ms"` → `45.2`. A string with no numeric prefix is `0.0`.
fn numeric_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return 0.0;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().unwrap_or(0.0)
}

// --- tests -------------------------------------------------------------------
