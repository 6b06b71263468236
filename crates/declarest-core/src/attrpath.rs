//! Escaped dotted attribute paths.
//!
//! An attribute path addresses a node inside a JSON document. Steps are
//! separated by `.`; a backslash escapes the next character so keys may
//! contain literal dots, hashes, and backslashes; a step consisting of a
//! single unescaped `#` fans out over every element of an array.
//!
//! `Display` renders the exact grammar `parse` accepts, so paths survive a
//! round trip through their string form.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// One step of an [`AttrPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrStep {
    /// A literal object key (or decimal array index).
    Value(String),
    /// `#`: every element of the array at this position.
    Splat,
}

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrPath(Vec<AttrStep>);

impl AttrPath {
    /// Parses the escaped dotted form.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidAttrPath {
            path: input.to_string(),
            reason: reason.to_string(),
        };

        let mut steps = Vec::new();
        let mut buf = String::new();
        // True while the step so far is exactly one unescaped '#'.
        let mut splat = false;
        let mut chars = input.chars();

        loop {
            match chars.next() {
                Some('\\') => {
                    let Some(next) = chars.next() else {
                        return Err(invalid("trailing backslash"));
                    };
                    splat = false;
                    buf.push(next);
                }
                Some('.') => {
                    if buf.is_empty() {
                        return Err(invalid("empty step"));
                    }
                    steps.push(take_step(&mut buf, &mut splat));
                }
                Some('#') => {
                    splat = buf.is_empty();
                    buf.push('#');
                }
                Some(c) => {
                    splat = false;
                    buf.push(c);
                }
                None => {
                    if buf.is_empty() {
                        return Err(invalid("empty step"));
                    }
                    steps.push(take_step(&mut buf, &mut splat));
                    return Ok(AttrPath(steps));
                }
            }
        }
    }

    /// The steps in order.
    #[must_use]
    pub fn steps(&self) -> &[AttrStep] {
        &self.0
    }

    /// Deletes the node(s) this path addresses inside `value`. Splat steps
    /// fan out over array elements; paths that address nothing are a no-op.
    pub fn remove(&self, value: &mut Value) {
        remove_steps(value, &self.0);
    }
}

fn take_step(buf: &mut String, splat: &mut bool) -> AttrStep {
    let value = std::mem::take(buf);
    if *splat && value == "#" {
        *splat = false;
        AttrStep::Splat
    } else {
        *splat = false;
        AttrStep::Value(value)
    }
}

fn remove_steps(value: &mut Value, steps: &[AttrStep]) {
    let Some((head, rest)) = steps.split_first() else {
        return;
    };
    if rest.is_empty() {
        match (head, value) {
            (AttrStep::Value(key), Value::Object(map)) => {
                map.remove(key);
            }
            (AttrStep::Value(key), Value::Array(items)) => {
                if let Ok(idx) = key.parse::<usize>() {
                    if idx < items.len() {
                        items.remove(idx);
                    }
                }
            }
            (AttrStep::Splat, Value::Array(items)) => items.clear(),
            _ => {}
        }
        return;
    }
    match (head, value) {
        (AttrStep::Value(key), Value::Object(map)) => {
            if let Some(child) = map.get_mut(key) {
                remove_steps(child, rest);
            }
        }
        (AttrStep::Value(key), Value::Array(items)) => {
            if let Ok(idx) = key.parse::<usize>() {
                if let Some(child) = items.get_mut(idx) {
                    remove_steps(child, rest);
                }
            }
        }
        (AttrStep::Splat, Value::Array(items)) => {
            for child in items.iter_mut() {
                remove_steps(child, rest);
            }
        }
        _ => {}
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match step {
                AttrStep::Splat => f.write_str("#")?,
                AttrStep::Value(v) => {
                    for c in v.chars() {
                        if matches!(c, '.' | '#' | '\\') {
                            write!(f, "\\{c}")?;
                        } else {
                            write!(f, "{c}")?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for AttrPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        AttrPath::parse(s)
    }
}

impl Serialize for AttrPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AttrPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AttrPath::parse(&raw).map_err(D::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================
