//! Read-only JSON lookups in a gjson-flavoured dotted syntax.
//!
//! This is the query dialect used everywhere a configuration string selects
//! a node out of a response body: `@this` for the whole document, dotted
//! object keys (`a.b.c`, `\.` escapes a literal dot), decimal array indices
//! (`items.0`), and first-match array filters (`items.#(id==3).name`).

use serde_json::Value;

/// Looks up `path` inside `value`. Returns `None` when any step finds
/// nothing.
pub fn find<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path == "@this" {
        return Some(value);
    }
    let mut current = value;
    for step in split_steps(path) {
        current = apply_step(current, &step)?;
    }
    Some(current)
}

/// Renders a queried value for use inside a path, query string, or header.
///
/// Strings come out bare, numbers and booleans in their display form, null
/// as the empty string, and objects or arrays as compact JSON.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Splits a path on unescaped dots, keeping filter expressions and quoted
/// literals intact.
fn split_steps(path: &str) -> Vec<String> {
    let mut steps = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_quotes => {
                buf.push('\\');
                if let Some(next) = chars.next() {
                    buf.push(next);
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                buf.push('"');
            }
            '(' if !in_quotes => {
                depth += 1;
                buf.push('(');
            }
            ')' if !in_quotes && depth > 0 => {
                depth -= 1;
                buf.push(')');
            }
            '.' if !in_quotes && depth == 0 => {
                steps.push(std::mem::take(&mut buf));
            }
            _ => buf.push(c),
        }
    }
    steps.push(buf);
    steps
}

fn apply_step<'a>(value: &'a Value, raw: &str) -> Option<&'a Value> {
    if let Some(inner) = raw.strip_prefix("#(").and_then(|r| r.strip_suffix(')')) {
        return apply_filter(value, inner);
    }
    let key = unescape(raw);
    match value {
        Value::Object(map) => map.get(&key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// `key==literal` (or `key=literal`): first array element whose direct
/// member equals the literal.
fn apply_filter<'a>(value: &'a Value, expr: &str) -> Option<&'a Value> {
    let items = value.as_array()?;
    let (key, literal) = split_filter(expr)?;
    let wanted = parse_literal(literal);
    items
        .iter()
        .find(|item| item.get(&key).is_some_and(|v| literal_eq(v, &wanted)))
}

fn split_filter(expr: &str) -> Option<(String, &str)> {
    let (key, literal) = match expr.split_once("==") {
        Some(pair) => pair,
        None => expr.split_once('=')?,
    };
    Some((unescape(key.trim()), literal.trim()))
}

fn parse_literal(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn literal_eq(left: &Value, right: &Value) -> bool {
    if let (Value::Number(l), Value::Number(r)) = (left, right) {
        return l.as_f64() == r.as_f64();
    }
    left == right
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
