//! Deterministic ranking of scored candidates.

use std::cmp::Ordering;

use super::evaluate::MatchDetails;

/// Orders candidates by aggregate score with deterministic tie-breaking.
///
/// Scores are compared on a grid of `epsilon`: two scores that round to
/// the same multiple of `epsilon` tie. Vetoed candidates are dropped.
/// Ties go to the caller's tie-breaker, then to the lower index
/// (declaration or load order).
///
/// # Examples
///
/// ```
/// use hanging_protocol::rule::{MatchDetails, Ranker};
///
/// let mut vetoed = MatchDetails::empty();
/// vetoed.required_rules_all_passed = false;
/// vetoed.total_score = 50.0;
///
/// let mut strong = MatchDetails::empty();
/// strong.total_score = 3.0;
///
/// let candidates = vec![vetoed, MatchDetails::empty(), strong];
/// let ranker = Ranker::new();
/// assert_eq!(ranker.rank(&candidates, |_, _| std::cmp::Ordering::Equal), vec![2, 1]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranker {
    epsilon: f64,
}

impl Ranker {
    pub fn new() -> Self {
        Self { epsilon: 1e-9 }
    }

    /// Sets the score resolution. Non-positive values are ignored.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        if epsilon > 0.0 && epsilon.is_finite() {
            self.epsilon = epsilon;
        }
        self
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Quantized score used as the primary sort key.
    ///
    /// Keys are whole multiples of `epsilon` compared with
    /// [`f64::total_cmp`], so the sort stays consistent even when three
    /// scores are pairwise within `epsilon` but not all equal. Keys are not
    /// narrowed to an integer type and never saturate on large weights.
    pub fn score_key(&self, score: f64) -> f64 {
        let key = (score / self.epsilon).round();
        if key.is_nan() {
            f64::NEG_INFINITY
        } else {
            // Folds -0.0 into 0.0.
            key + 0.0
        }
    }

    /// Indices of eligible candidates, best first.
    ///
    /// `tie_break(a, b)` orders equal-score candidates; it returns
    /// `Ordering::Less` when `a` should come first.
    pub fn rank<F>(&self, candidates: &[MatchDetails], tie_break: F) -> Vec<usize>
    where
        F: Fn(usize, usize) -> Ordering,
    {
        let keys: Vec<f64> = candidates
            .iter()
            .map(|d| self.score_key(d.total_score))
            .collect();

        let mut indices: Vec<usize> = (0..candidates.len())
            .filter(|&i| candidates[i].is_eligible())
            .collect();

        indices.sort_by(|&a, &b| {
            keys[b]
                .total_cmp(&keys[a])
                .then_with(|| tie_break(a, b))
                .then_with(|| a.cmp(&b))
        });

        indices
    }

    /// Index of the best eligible candidate.
    ///
    /// Returns `None` if no candidate is eligible.
    pub fn select_best<F>(&self, candidates: &[MatchDetails], tie_break: F) -> Option<usize>
    where
        F: Fn(usize, usize) -> Ordering,
    {
        self.rank(candidates, tie_break).first().copied()
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new()
    }
}
