//! Assignment results.

use crate::model::ViewportSettings;
use crate::rule::MatchDetails;

/// Concrete data bound to a viewport slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct BindingTarget {
    pub study_id: String,
    pub series_id: String,
    /// Representative image, when the series has one.
    pub image_id: Option<String>,
}

/// Output for one viewport slot: a target, or unbound.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ViewportBinding {
    pub slot_index: usize,
    pub target: Option<BindingTarget>,
    /// The slot's settings, normalized and passed through.
    pub viewport_settings: ViewportSettings,
}

impl ViewportBinding {
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }
}

/// Why a slot was left unbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum UnboundReason {
    NoEligibleStudy,
    NoEligibleSeries,
}

/// Diagnostics of one candidate within a slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CandidateScore {
    pub candidate_id: String,
    pub details: MatchDetails,
}

/// Per-slot diagnostics: every candidate considered at each level.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SlotMatch {
    pub slot_index: usize,
    pub studies: Vec<CandidateScore>,
    pub series: Vec<CandidateScore>,
    pub images: Vec<CandidateScore>,
    pub unbound_reason: Option<UnboundReason>,
}

/// Bindings and diagnostics for every slot of a stage, in slot order.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StageAssignment {
    pub bindings: Vec<ViewportBinding>,
    pub slots: Vec<SlotMatch>,
}

impl StageAssignment {
    /// Number of slots that received a binding.
    pub fn bound_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_bound()).count()
    }
}
