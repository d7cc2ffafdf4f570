//! Typed attribute values carried by capabilities and requirements

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::module::model::filter::CompareOp;

/// Attribute value attached to a capability or requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Version(Version),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Compare this value against a filter literal using the value's own type
    ///
    /// A literal that does not parse as the attribute's type never matches.
    pub fn compare(&self, op: CompareOp, literal: &str) -> bool {
        match self {
            AttributeValue::String(value) => match op {
                CompareOp::Equal => value == literal,
                CompareOp::Approx => normalize(value) == normalize(literal),
                CompareOp::GreaterEq => value.as_str() >= literal,
                CompareOp::LessEq => value.as_str() <= literal,
            },
            AttributeValue::Long(value) => match literal.trim().parse::<i64>() {
                Ok(other) => ordered(op, value.cmp(&other)),
                Err(_) => false,
            },
            AttributeValue::Double(value) => match literal.trim().parse::<f64>() {
                Ok(other) => value
                    .partial_cmp(&other)
                    .map(|ordering| ordered(op, ordering))
                    .unwrap_or(false),
                Err(_) => false,
            },
            AttributeValue::Boolean(value) => match op {
                CompareOp::Equal | CompareOp::Approx => {
                    match literal.trim().to_ascii_lowercase().as_str() {
                        "true" => *value,
                        "false" => !*value,
                        _ => false,
                    }
                }
                _ => false,
            },
            AttributeValue::Version(value) => match parse_version(literal) {
                Some(other) => ordered(op, value.cmp(&other)),
                None => false,
            },
            AttributeValue::List(values) => values.iter().any(|v| v.compare(op, literal)),
        }
    }

    /// Substring match; only string values (or lists of them) take part
    pub fn matches_substring(&self, parts: &[String]) -> bool {
        match self {
            AttributeValue::String(value) => substring_match(value, parts),
            AttributeValue::List(values) => values.iter().any(|v| v.matches_substring(parts)),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            AttributeValue::Version(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(v) => write!(f, "{}", v),
            AttributeValue::Long(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::Boolean(v) => write!(f, "{}", v),
            AttributeValue::Version(v) => write!(f, "{}", v),
            AttributeValue::List(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(","))
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Long(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<Version> for AttributeValue {
    fn from(value: Version) -> Self {
        AttributeValue::Version(value)
    }
}

/// Parse a version literal, padding short forms (`1` -> `1.0.0`, `1.2` -> `1.2.0`)
pub fn parse_version(literal: &str) -> Option<Version> {
    let literal = literal.trim();
    if let Ok(version) = Version::parse(literal) {
        return Some(version);
    }
    let parts: Vec<&str> = literal.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
        *slot = part.parse().ok()?;
    }
    Some(Version::new(numbers[0], numbers[1], numbers[2]))
}

fn ordered(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Equal | CompareOp::Approx => ordering == Ordering::Equal,
        CompareOp::GreaterEq => ordering != Ordering::Less,
        CompareOp::LessEq => ordering != Ordering::Greater,
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `parts` are the literal pieces between `*` wildcards
fn substring_match(value: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    let Some((last, middle)) = rest.split_last() else {
        return value == first;
    };
    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut remaining = &value[first.len()..];
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}
