//! Rules: an attribute, a constraint, a weight and a required flag.
//!
//! A rule scores `constraint_score * weight` when it passes and 0 when it
//! fails. A failing required rule vetoes the whole candidate. Malformed
//! rules are skipped with a warning and never veto.

mod evaluate;
mod rank;
mod types;

pub use evaluate::{evaluate_rule, match_rules, MatchDetails, RuleOutcome};
pub use rank::Ranker;
pub use types::{Rule, RuleLevel};
