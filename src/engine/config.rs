//! Orchestrator configuration.

use crate::matching::MatchingConfig;

/// Configuration for [`ProtocolEngine`](super::ProtocolEngine).
///
/// # Examples
///
/// ```
/// use hanging_protocol::engine::EngineConfig;
/// use hanging_protocol::matching::MatchingConfig;
///
/// // Coalesce triggers; the host calls `settle()` once per batch.
/// let config = EngineConfig::default()
///     .with_auto_settle(false)
///     .with_matching(MatchingConfig::default().with_default_protocol_id("fallback"));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct EngineConfig {
    /// Matching and assignment settings.
    pub matching: MatchingConfig,

    /// Run a pass immediately on every trigger.
    ///
    /// When `false`, triggers only mark the engine pending and the host
    /// runs one coalesced pass with `settle()`.
    pub auto_settle: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            auto_settle: true,
        }
    }
}

impl EngineConfig {
    /// Sets the matching configuration.
    pub fn with_matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = matching;
        self
    }

    /// Sets whether triggers run a pass immediately.
    pub fn with_auto_settle(mut self, enabled: bool) -> Self {
        self.auto_settle = enabled;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.matching.validate()
    }
}
