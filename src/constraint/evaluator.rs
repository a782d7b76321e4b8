//! Constraint evaluation.

use super::types::Constraint;
use crate::attribute::AttributeValue;

/// Outcome of evaluating one constraint against one value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub passed: bool,
    /// Normalized score in `[0, 1]`; always 0.0 when `passed` is false.
    pub score: f64,
}

impl Evaluation {
    /// A full pass, scoring 1.0.
    pub fn pass() -> Self {
        Self::partial(1.0)
    }

    /// A failure, scoring 0.0.
    pub fn fail() -> Self {
        Self {
            passed: false,
            score: 0.0,
        }
    }

    /// A pass with partial credit, clamped to `[0, 1]`.
    pub fn partial(score: f64) -> Self {
        Self {
            passed: true,
            score: if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) },
        }
    }

    fn exact(passed: bool) -> Self {
        if passed {
            Self::pass()
        } else {
            Self::fail()
        }
    }
}

/// Evaluates `constraint` against a resolved attribute value.
///
/// `None` means the attribute could not be resolved. It fails every
/// constraint except `NotPresent`. Malformed constraints always fail.
///
/// # Examples
///
/// ```
/// use hanging_protocol::attribute::AttributeValue;
/// use hanging_protocol::constraint::{evaluate, Constraint};
///
/// let ct = AttributeValue::from("CT");
/// assert!(evaluate(&Constraint::equals("CT"), Some(&ct)).passed);
/// assert!(!evaluate(&Constraint::equals("CT"), None).passed);
///
/// // Soft constraint: 2.5 lies halfway between the center (2.0) and the edge.
/// let thickness = AttributeValue::from(2.5);
/// let result = evaluate(&Constraint::range(1.0, 3.0), Some(&thickness));
/// assert!(result.passed);
/// assert!((result.score - 0.5).abs() < 1e-10);
/// ```
pub fn evaluate(constraint: &Constraint, value: Option<&AttributeValue>) -> Evaluation {
    if constraint.defect().is_some() {
        return Evaluation::fail();
    }

    let Some(value) = value else {
        return Evaluation::exact(matches!(constraint, Constraint::NotPresent));
    };

    match constraint {
        Constraint::Equals(expected) => Evaluation::exact(value.loosely_equals(expected)),
        Constraint::NotEquals(expected) => Evaluation::exact(!value.loosely_equals(expected)),
        Constraint::Contains(needle) => Evaluation::exact(contains(value, needle)),
        Constraint::DoesNotContain(needle) => Evaluation::exact(!contains(value, needle)),
        Constraint::ContainsI(needle) => {
            let needle = needle.to_lowercase();
            Evaluation::exact(
                value
                    .items()
                    .iter()
                    .any(|item| item.to_text().to_lowercase().contains(&needle)),
            )
        }
        Constraint::StartsWith(prefix) => Evaluation::exact(value.to_text().starts_with(prefix.as_str())),
        Constraint::EndsWith(suffix) => Evaluation::exact(value.to_text().trim_end().ends_with(suffix.as_str())),
        Constraint::Range { min, max } => match value.as_number() {
            Some(n) => range_score(n, *min, *max),
            None => Evaluation::fail(),
        },
        Constraint::GreaterThan(bound) => Evaluation::exact(value.as_number().is_some_and(|n| n > *bound)),
        Constraint::LessThan(bound) => Evaluation::exact(value.as_number().is_some_and(|n| n < *bound)),
        Constraint::Approximately { value: ideal, tolerance } => match value.as_number() {
            Some(n) => {
                let distance = (n - ideal).abs();
                if distance > *tolerance {
                    Evaluation::fail()
                } else if *tolerance > 0.0 {
                    Evaluation::partial(1.0 - distance / tolerance)
                } else {
                    Evaluation::pass()
                }
            }
            None => Evaluation::fail(),
        },
        Constraint::Matches(pattern) => match pattern.regex() {
            Ok(regex) => Evaluation::exact(regex.is_match(&value.to_text())),
            Err(_) => Evaluation::fail(),
        },
        Constraint::Present => Evaluation::exact(!value.is_blank()),
        Constraint::NotPresent => Evaluation::exact(value.is_blank()),
        Constraint::Unsupported { .. } => Evaluation::fail(),
    }
}

/// Substring match on the textual value, or element membership.
fn contains(value: &AttributeValue, needle: &AttributeValue) -> bool {
    let needle_text = needle.to_text();
    value
        .items()
        .iter()
        .any(|item| item.loosely_equals(needle) || item.to_text().contains(&*needle_text))
}

/// Inclusive range check with closeness-to-center scoring.
///
/// Two-sided ranges score `1 - |n - center| / half_width`; one-sided and
/// degenerate ranges score 1.0 on pass.
fn range_score(n: f64, min: Option<f64>, max: Option<f64>) -> Evaluation {
    let above_min = min.map_or(true, |m| n >= m);
    let below_max = max.map_or(true, |m| n <= m);
    if !(above_min && below_max) {
        return Evaluation::fail();
    }
    match (min, max) {
        (Some(lo), Some(hi)) if hi > lo => {
            let center = (lo + hi) / 2.0;
            let half_width = (hi - lo) / 2.0;
            Evaluation::partial(1.0 - (n - center).abs() / half_width)
        }
        _ => Evaluation::pass(),
    }
}
