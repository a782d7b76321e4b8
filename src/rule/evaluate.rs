//! Rule evaluation and per-candidate aggregation.

use crate::attribute::{AttributeResolver, AttributeValue, Entity};
use crate::constraint::evaluate;

use super::types::Rule;

/// Result of evaluating one rule against one entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RuleOutcome {
    pub rule: Rule,
    /// The resolved attribute value, if any.
    pub value: Option<AttributeValue>,
    pub passed: bool,
    /// `constraint_score * weight` when passed, else 0.
    pub score: f64,
    /// Set when the rule is malformed and was skipped.
    pub warning: Option<String>,
}

impl RuleOutcome {
    /// Returns `true` if this outcome vetoes its candidate.
    ///
    /// Malformed rules never veto, even when marked required.
    pub fn vetoes(&self) -> bool {
        self.rule.required && !self.passed && self.warning.is_none()
    }
}

/// Evaluates `rule` against `entity`.
pub fn evaluate_rule(rule: &Rule, entity: Entity<'_>, resolver: &AttributeResolver) -> RuleOutcome {
    let value = resolver.resolve(entity, &rule.attribute);

    if let Some(defect) = rule.defect() {
        log::warn!("skipping malformed rule `{}`: {defect}", rule.label());
        return RuleOutcome {
            rule: rule.clone(),
            value,
            passed: false,
            score: 0.0,
            warning: Some(defect),
        };
    }

    let evaluation = evaluate(&rule.constraint, value.as_ref());
    let score = if evaluation.passed {
        evaluation.score * rule.weight
    } else {
        0.0
    };
    log::trace!(
        "{} rule `{}` {} on {}: value={:?} score={score}",
        rule.constraint.kind(),
        rule.label(),
        if evaluation.passed { "passed" } else { "failed" },
        entity.kind(),
        value,
    );

    RuleOutcome {
        rule: rule.clone(),
        value,
        passed: evaluation.passed,
        score,
        warning: None,
    }
}

/// Rule-by-rule diagnostics for one candidate.
///
/// Built fresh on every pass; never updated in place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MatchDetails {
    pub outcomes: Vec<RuleOutcome>,
    /// Sum of passing rule scores.
    pub total_score: f64,
    pub required_rules_all_passed: bool,
}

impl MatchDetails {
    /// Details of a candidate with no rules: eligible, score 0.
    pub fn empty() -> Self {
        Self {
            outcomes: Vec::new(),
            total_score: 0.0,
            required_rules_all_passed: true,
        }
    }

    pub fn from_outcomes(outcomes: Vec<RuleOutcome>) -> Self {
        let total_score = outcomes.iter().map(|o| o.score).sum();
        let required_rules_all_passed = !outcomes.iter().any(RuleOutcome::vetoes);
        Self {
            outcomes,
            total_score,
            required_rules_all_passed,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.required_rules_all_passed
    }

    /// Score used for ranking: the total, or `-inf` when vetoed.
    pub fn ranking_score(&self) -> f64 {
        if self.is_eligible() {
            self.total_score
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Warnings of skipped malformed rules.
    pub fn warnings(&self) -> Vec<&str> {
        self.outcomes.iter().filter_map(|o| o.warning.as_deref()).collect()
    }

    pub fn passed(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

impl Default for MatchDetails {
    fn default() -> Self {
        Self::empty()
    }
}

/// Evaluates every rule against `entity` and aggregates with veto semantics.
pub fn match_rules(rules: &[Rule], entity: Entity<'_>, resolver: &AttributeResolver) -> MatchDetails {
    MatchDetails::from_outcomes(
        rules
            .iter()
            .map(|rule| evaluate_rule(rule, entity, resolver))
            .collect(),
    )
}
