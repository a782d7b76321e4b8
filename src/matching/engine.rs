//! Protocol scoring and selection.

use crate::attribute::AttributeResolver;
use crate::context::MatchingContext;
use crate::error::EngineError;
use crate::model::Protocol;
use crate::rule::{match_rules, MatchDetails, Ranker};

use super::config::MatchingConfig;

/// Protocol-level diagnostics of one protocol.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ProtocolMatch {
    /// Declaration index in the protocol list.
    pub index: usize,
    pub protocol_id: String,
    pub details: MatchDetails,
    /// Why the protocol was ineligible beyond its rules, if anything.
    pub note: Option<String>,
}

impl ProtocolMatch {
    pub fn is_eligible(&self) -> bool {
        self.details.is_eligible()
    }
}

/// Outcome of protocol selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolSelection {
    /// Index of the selected protocol.
    pub protocol_index: usize,
    /// `true` when no protocol other than the default was eligible.
    pub fallback: bool,
    /// Diagnostics of every protocol, in declaration order.
    pub matches: Vec<ProtocolMatch>,
}

/// Scores protocols against the loaded study set and selects one.
///
/// The selected protocol is the eligible one with the highest aggregate
/// score; ties go to the protocol declared first. When none is eligible
/// the default protocol is used. A missing or malformed default is the
/// only error.
///
/// # Examples
///
/// ```
/// use hanging_protocol::attribute::AttributeResolver;
/// use hanging_protocol::constraint::Constraint;
/// use hanging_protocol::context::MatchingContext;
/// use hanging_protocol::matching::{MatchingConfig, ProtocolMatcher};
/// use hanging_protocol::model::{Protocol, Stage, Study, ViewportSlot, ViewportStructure};
/// use hanging_protocol::rule::Rule;
///
/// let one_by_one = Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new());
/// let protocols = vec![
///     Protocol::new("followup", "Follow-up")
///         .with_rule(Rule::protocol("timepointType", Constraint::equals("followup")).with_required(true))
///         .with_stage(one_by_one.clone()),
///     Protocol::new("default", "Default").with_stage(one_by_one),
/// ];
/// let studies = vec![Study::new("1.2.3").with_attribute("timepointType", "baseline")];
///
/// let resolver = AttributeResolver::new();
/// let config = MatchingConfig::default();
/// let selection = ProtocolMatcher::new(&resolver, &config)
///     .select(&protocols, &MatchingContext::build(&studies))
///     .unwrap();
/// assert_eq!(selection.protocol_index, 1);
/// assert!(!selection.matches[0].is_eligible());
/// ```
pub struct ProtocolMatcher<'r> {
    resolver: &'r AttributeResolver,
    config: &'r MatchingConfig,
    ranker: Ranker,
}

impl<'r> ProtocolMatcher<'r> {
    pub fn new(resolver: &'r AttributeResolver, config: &'r MatchingConfig) -> Self {
        Self {
            resolver,
            config,
            ranker: Ranker::new().with_epsilon(config.epsilon),
        }
    }

    /// Evaluates the protocol rules of one protocol against the study set.
    ///
    /// A protocol without stages cannot be displayed and is reported
    /// ineligible, as is one that references more prior studies than are
    /// loaded besides the active study.
    pub fn score_protocol(&self, index: usize, protocol: &Protocol, ctx: &MatchingContext<'_>) -> ProtocolMatch {
        let mut details = match_rules(&protocol.protocol_rules, ctx.study_set(), self.resolver);
        let priors = ctx.studies().len().saturating_sub(1);
        let note = if protocol.stages.is_empty() {
            Some("protocol declares no stages".to_string())
        } else {
            protocol
                .required_priors()
                .filter(|&needed| priors < needed)
                .map(|needed| format!("protocol references {needed} prior studies, {priors} loaded"))
        };
        if note.is_some() {
            details.required_rules_all_passed = false;
        }
        log::debug!(
            "protocol `{}`: score={} eligible={}",
            protocol.id,
            details.total_score,
            details.is_eligible()
        );
        ProtocolMatch {
            index,
            protocol_id: protocol.id.clone(),
            details,
            note,
        }
    }

    /// Scores every protocol, in declaration order.
    pub fn score_protocols(&self, protocols: &[Protocol], ctx: &MatchingContext<'_>) -> Vec<ProtocolMatch> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            if self.config.parallel {
                return protocols
                    .par_iter()
                    .enumerate()
                    .map(|(index, protocol)| self.score_protocol(index, protocol, ctx))
                    .collect();
            }
        }

        protocols
            .iter()
            .enumerate()
            .map(|(index, protocol)| self.score_protocol(index, protocol, ctx))
            .collect()
    }

    /// Index of the configured default protocol, validated.
    pub fn default_index(&self, protocols: &[Protocol]) -> Result<usize, EngineError> {
        let id = &self.config.default_protocol_id;
        let index = protocols
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| EngineError::MissingDefaultProtocol { id: id.clone() })?;
        protocols[index]
            .validate_as_default()
            .map_err(|reason| EngineError::MalformedDefaultProtocol {
                id: id.clone(),
                reason,
            })?;
        Ok(index)
    }

    /// Selects the protocol for the study set in `ctx`.
    pub fn select(&self, protocols: &[Protocol], ctx: &MatchingContext<'_>) -> Result<ProtocolSelection, EngineError> {
        let default_index = self.default_index(protocols)?;
        let matches = self.score_protocols(protocols, ctx);

        let details: Vec<MatchDetails> = matches.iter().map(|m| m.details.clone()).collect();
        let best = self.ranker.select_best(&details, |_, _| std::cmp::Ordering::Equal);

        // The validated default is always eligible, so `best` is only
        // `None` for an empty list, which `default_index` already rejected.
        let protocol_index = best.unwrap_or(default_index);
        let fallback = !matches
            .iter()
            .any(|m| m.index != default_index && m.is_eligible());
        if fallback {
            log::warn!(
                "no eligible protocol among {}; falling back to `{}`",
                protocols.len(),
                protocols[default_index].id
            );
        }

        Ok(ProtocolSelection {
            protocol_index,
            fallback,
            matches,
        })
    }
}
