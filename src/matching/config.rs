//! Matching configuration and stage policies.

/// How the active stage of the selected protocol is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum StagePolicy {
    /// Among stages with at least as many slots as there are distinct
    /// series, the one with the fewest slots. Ties go to declaration
    /// order.
    #[default]
    SmallestCovering,

    /// The first stage with no more slots than there are distinct series.
    FirstFillable,

    /// The first stage whose bound slot count reaches its
    /// `minViewportsMatched`. Runs assignment once per stage.
    FirstActivated,
}

/// Configuration for protocol matching and viewport assignment.
///
/// # Examples
///
/// ```
/// use hanging_protocol::matching::{MatchingConfig, StagePolicy};
///
/// let config = MatchingConfig::default()
///     .with_default_protocol_id("fallback")
///     .with_stage_policy(StagePolicy::FirstActivated)
///     .with_study_fallthrough(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct MatchingConfig {
    /// Id of the protocol used when no protocol is eligible.
    pub default_protocol_id: String,

    /// Stage selection policy.
    pub stage_policy: StagePolicy,

    /// Score resolution: scores closer than this tie.
    pub epsilon: f64,

    /// When the best study of a slot has no eligible series, try the
    /// next-ranked studies before leaving the slot unbound.
    pub study_fallthrough: bool,

    /// Score protocols on the rayon pool (requires the `parallel` feature).
    pub parallel: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_protocol_id: "default".to_string(),
            stage_policy: StagePolicy::default(),
            epsilon: 1e-9,
            study_fallthrough: false,
            parallel: false,
        }
    }
}

impl MatchingConfig {
    /// Sets the id of the fallback protocol.
    pub fn with_default_protocol_id(mut self, id: impl Into<String>) -> Self {
        self.default_protocol_id = id.into();
        self
    }

    /// Sets the stage selection policy.
    pub fn with_stage_policy(mut self, policy: StagePolicy) -> Self {
        self.stage_policy = policy;
        self
    }

    /// Sets the score tie resolution.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets whether a slot may fall through to lower-ranked studies.
    pub fn with_study_fallthrough(mut self, enabled: bool) -> Self {
        self.study_fallthrough = enabled;
        self
    }

    /// Enables parallel protocol scoring (requires the `parallel` feature).
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_protocol_id.trim().is_empty() {
            return Err("default_protocol_id must not be empty".into());
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(format!("epsilon must be positive and finite, got {}", self.epsilon));
        }
        Ok(())
    }
}
