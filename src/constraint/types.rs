//! Constraint kinds.

use regex::Regex;

use crate::attribute::AttributeValue;

/// A compiled `matches` pattern.
///
/// Compilation happens once, when the constraint is built. An invalid
/// pattern is kept (so it still shows up in diagnostics) and makes the
/// owning rule malformed.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub struct Pattern {
    source: String,
    compiled: Result<Regex, String>,
}

impl Pattern {
    /// Compiles `source`, keeping any compile error.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source).map_err(|err| err.to_string());
        Self { source, compiled }
    }

    /// The pattern source.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The compiled expression, or the compile error.
    pub fn regex(&self) -> Result<&Regex, &str> {
        self.compiled.as_ref().map_err(String::as_str)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Pattern::new(source)
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Pattern::new(source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

/// Comparison applied to a resolved attribute value.
///
/// In documents a constraint is an object keyed by its kind:
///
/// ```json
/// { "equals": "CT" }
/// { "range": { "min": 1, "max": 3 } }
/// { "matches": "^T1" }
/// "notPresent"
/// ```
///
/// Exact kinds score 1.0 on pass. `Range` and `Approximately` are soft:
/// they score the closeness of the value to the ideal, so a near miss of
/// the ideal still contributes partial credit.
///
/// A missing value fails every kind except [`Constraint::NotPresent`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Constraint {
    Equals(AttributeValue),
    NotEquals(AttributeValue),
    /// Substring match on text, or membership for multi-valued attributes.
    Contains(AttributeValue),
    /// Case-insensitive substring match.
    #[cfg_attr(feature = "serde", serde(rename = "containsI"))]
    ContainsI(String),
    DoesNotContain(AttributeValue),
    StartsWith(String),
    EndsWith(String),
    /// Inclusive numeric range. Either bound may be omitted.
    Range {
        #[cfg_attr(feature = "serde", serde(default))]
        min: Option<f64>,
        #[cfg_attr(feature = "serde", serde(default))]
        max: Option<f64>,
    },
    GreaterThan(f64),
    LessThan(f64),
    /// Numeric closeness: passes within `tolerance`, scores `1 - d / tolerance`.
    Approximately { value: f64, tolerance: f64 },
    /// Regular-expression match on the textual value.
    Matches(Pattern),
    /// Passes when the attribute resolves to a non-blank value.
    Present,
    /// Passes when the attribute is missing or blank.
    NotPresent,
    /// A constraint kind the engine does not understand.
    ///
    /// Rules carrying it are malformed: they always fail and never veto.
    #[cfg_attr(feature = "serde", serde(skip_deserializing))]
    Unsupported { kind: String, reason: String },
}

impl Constraint {
    /// Loose equality with `value`.
    pub fn equals(value: impl Into<AttributeValue>) -> Self {
        Constraint::Equals(value.into())
    }

    /// Loose inequality with `value`.
    pub fn not_equals(value: impl Into<AttributeValue>) -> Self {
        Constraint::NotEquals(value.into())
    }

    /// Substring or element match.
    pub fn contains(value: impl Into<AttributeValue>) -> Self {
        Constraint::Contains(value.into())
    }

    /// Inclusive two-sided range.
    pub fn range(min: f64, max: f64) -> Self {
        Constraint::Range {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Regular-expression match; the pattern is compiled here.
    pub fn matches(pattern: impl Into<Pattern>) -> Self {
        Constraint::Matches(pattern.into())
    }

    /// Document name of the constraint kind.
    pub fn kind(&self) -> &str {
        match self {
            Constraint::Equals(_) => "equals",
            Constraint::NotEquals(_) => "notEquals",
            Constraint::Contains(_) => "contains",
            Constraint::ContainsI(_) => "containsI",
            Constraint::DoesNotContain(_) => "doesNotContain",
            Constraint::StartsWith(_) => "startsWith",
            Constraint::EndsWith(_) => "endsWith",
            Constraint::Range { .. } => "range",
            Constraint::GreaterThan(_) => "greaterThan",
            Constraint::LessThan(_) => "lessThan",
            Constraint::Approximately { .. } => "approximately",
            Constraint::Matches(_) => "matches",
            Constraint::Present => "present",
            Constraint::NotPresent => "notPresent",
            Constraint::Unsupported { kind, .. } => kind.as_str(),
        }
    }

    /// Why this constraint cannot be evaluated, if it cannot.
    pub fn defect(&self) -> Option<String> {
        match self {
            Constraint::Unsupported { kind, reason } => {
                Some(format!("unsupported constraint `{kind}`: {reason}"))
            }
            Constraint::Matches(pattern) => pattern
                .regex()
                .err()
                .map(|err| format!("invalid pattern `{}`: {err}", pattern.as_str())),
            Constraint::Range {
                min: Some(min),
                max: Some(max),
            } if min > max => Some(format!("empty range [{min}, {max}]")),
            Constraint::Range { min, max } if min.is_some_and(f64::is_nan) || max.is_some_and(f64::is_nan) => {
                Some("range bound is NaN".into())
            }
            Constraint::Approximately { value, tolerance } if value.is_nan() || !(*tolerance >= 0.0) => {
                Some(format!("invalid tolerance {tolerance} around {value}"))
            }
            _ => None,
        }
    }

    /// Parses a constraint document leniently.
    ///
    /// Anything that does not parse as a known kind becomes
    /// [`Constraint::Unsupported`] instead of an error.
    #[cfg(feature = "serde")]
    pub fn from_document(document: serde_json::Value) -> Self {
        match serde_json::from_value::<Constraint>(document.clone()) {
            Ok(constraint) => constraint,
            Err(err) => {
                let kind = match &document {
                    serde_json::Value::Object(map) => map
                        .keys()
                        .next()
                        .cloned()
                        .unwrap_or_else(|| "<empty>".to_string()),
                    serde_json::Value::String(kind) => kind.clone(),
                    other => other.to_string(),
                };
                Constraint::Unsupported {
                    kind,
                    reason: err.to_string(),
                }
            }
        }
    }
}
