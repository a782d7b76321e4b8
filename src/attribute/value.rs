//! Attribute values and attribute bags.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute bag of a study, series or image.
///
/// A `BTreeMap` keeps iteration order stable, which the case-insensitive
/// lookup in [`find_attribute`] relies on for determinism.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A resolved attribute value.
///
/// DICOM attributes arrive as text, numbers or multi-valued lists. Values
/// compare loosely: a numeric constraint accepts text that parses as a
/// number, and a text constraint accepts the textual form of a number.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Multi-valued attribute (DICOM value multiplicity > 1).
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Numeric view of the value.
    ///
    /// Text is trimmed and parsed; a single-element list unwraps.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse::<f64>().ok(),
            AttributeValue::List(items) if items.len() == 1 => items[0].as_number(),
            _ => None,
        }
    }

    /// Textual view of the value.
    ///
    /// Integral numbers render without a fractional part and lists are
    /// joined with the DICOM value separator `\`.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            AttributeValue::Text(s) => Cow::Borrowed(s.as_str()),
            AttributeValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            AttributeValue::Number(n) => Cow::Owned(format_number(*n)),
            AttributeValue::List(items) => Cow::Owned(
                items
                    .iter()
                    .map(|item| item.to_text().into_owned())
                    .collect::<Vec<_>>()
                    .join("\\"),
            ),
        }
    }

    /// Elements of a multi-valued attribute, or the value itself.
    pub fn items(&self) -> &[AttributeValue] {
        match self {
            AttributeValue::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Returns `true` for blank text and empty lists.
    pub fn is_blank(&self) -> bool {
        match self {
            AttributeValue::Text(s) => s.trim().is_empty(),
            AttributeValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Equality with numeric coercion.
    ///
    /// If `other` is numeric and `self` parses as a number the comparison
    /// is numeric, otherwise the trimmed textual forms are compared. A list
    /// equals a scalar when it has exactly that one element.
    pub fn loosely_equals(&self, other: &AttributeValue) -> bool {
        if let (AttributeValue::List(a), AttributeValue::List(b)) = (self, other) {
            return a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y));
        }
        if let AttributeValue::Number(expected) = other {
            if let Some(actual) = self.as_number() {
                return (actual - expected).abs() <= f64::EPSILON * expected.abs().max(1.0);
            }
        }
        if let AttributeValue::Bool(expected) = other {
            if let AttributeValue::Bool(actual) = self {
                return actual == expected;
            }
        }
        self.to_text().trim() == other.to_text().trim()
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(value: Vec<AttributeValue>) -> Self {
        AttributeValue::List(value)
    }
}

/// Looks up `name` in an attribute bag.
///
/// Exact key first, then the first ASCII-case-insensitive match in key
/// order, so `modality` finds a `Modality` entry.
pub fn find_attribute<'a>(attributes: &'a AttributeMap, name: &str) -> Option<&'a AttributeValue> {
    attributes.get(name).or_else(|| {
        attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}
