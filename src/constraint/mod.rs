//! Constraints: typed comparisons between a resolved attribute value and
//! an expected value, pattern or numeric range.
//!
//! Every evaluation yields a pass flag and a normalized score in `[0, 1]`.
//! Exact kinds score 1.0 on pass; soft kinds ([`Constraint::Range`],
//! [`Constraint::Approximately`]) grade how close the value is to ideal.

mod evaluator;
mod types;

pub use evaluator::{evaluate, Evaluation};
pub use types::{Constraint, Pattern};
