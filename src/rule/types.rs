//! Rule definitions.

use crate::constraint::Constraint;

/// The kind of entity a rule is evaluated against.
///
/// A single tag replaces a hierarchy of rule subtypes: dispatch is a
/// `match` on the level, so every consumer handles every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum RuleLevel {
    /// Evaluated against the whole loaded study set.
    #[default]
    Protocol,
    Study,
    Series,
    Image,
}

/// An attribute name, a constraint, a weight and a required flag.
///
/// A failing required rule vetoes its candidate outright, regardless of
/// the scores of other rules.
///
/// # Examples
///
/// ```
/// use hanging_protocol::constraint::Constraint;
/// use hanging_protocol::rule::{Rule, RuleLevel};
///
/// let rule = Rule::series("Modality", Constraint::equals("CT"))
///     .with_weight(3.0)
///     .with_required(true);
/// assert_eq!(rule.level, RuleLevel::Series);
/// assert!(rule.defect().is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Rule {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id: Option<String>,
    pub attribute: String,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "lenient_constraint"))]
    pub constraint: Constraint,
    #[cfg_attr(feature = "serde", serde(default = "default_weight"))]
    pub weight: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub required: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub level: RuleLevel,
}

#[cfg(feature = "serde")]
fn default_weight() -> f64 {
    1.0
}

#[cfg(feature = "serde")]
fn lenient_constraint<'de, D>(deserializer: D) -> Result<Constraint, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let document = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
    Ok(Constraint::from_document(document))
}

impl Rule {
    /// Creates an optional rule with weight 1.
    pub fn new(level: RuleLevel, attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            id: None,
            attribute: attribute.into(),
            constraint,
            weight: 1.0,
            required: false,
            level,
        }
    }

    /// A protocol-level rule, evaluated against the study set.
    pub fn protocol(attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self::new(RuleLevel::Protocol, attribute, constraint)
    }

    /// A study-level rule.
    pub fn study(attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self::new(RuleLevel::Study, attribute, constraint)
    }

    /// A series-level rule.
    pub fn series(attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self::new(RuleLevel::Series, attribute, constraint)
    }

    /// An image-level rule.
    pub fn image(attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self::new(RuleLevel::Image, attribute, constraint)
    }

    /// Sets the weight added to the score on pass.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Sets whether a failure vetoes the candidate.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the diagnostic id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Label used in diagnostics: the id if set, else the attribute name.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.attribute)
    }

    /// Why this rule cannot be evaluated, if it cannot.
    ///
    /// Malformed rules always fail and are never treated as required.
    pub fn defect(&self) -> Option<String> {
        if self.attribute.trim().is_empty() {
            return Some("rule has no attribute name".into());
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Some(format!("weight {} is not a finite non-negative number", self.weight));
        }
        self.constraint.defect()
    }
}
