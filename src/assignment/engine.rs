//! Viewport assignment engine.

use std::collections::HashSet;

use crate::attribute::{AttributeResolver, Entity};
use crate::context::{MatchingContext, SeriesCandidate, SeriesKey};
use crate::matching::MatchingConfig;
use crate::model::{Image, Stage, ViewportSlot};
use crate::rule::{match_rules, MatchDetails, Ranker};

use super::types::{BindingTarget, CandidateScore, SlotMatch, StageAssignment, UnboundReason, ViewportBinding};

/// Binds studies, series and images to the slots of a stage.
///
/// Slots are processed in declaration order. Studies may be shared by
/// several slots; a series (and therefore its images) is bound to at most
/// one slot per pass. A slot with no eligible candidate is left unbound
/// and assignment continues with the next slot.
pub struct ViewportAssigner<'r> {
    resolver: &'r AttributeResolver,
    config: &'r MatchingConfig,
    ranker: Ranker,
    active_study_only: bool,
}

struct SeriesChoice<'c, 'a> {
    candidate: &'c SeriesCandidate<'a>,
    image: Option<&'a Image>,
}

impl<'r> ViewportAssigner<'r> {
    pub fn new(resolver: &'r AttributeResolver, config: &'r MatchingConfig) -> Self {
        Self {
            resolver,
            config,
            ranker: Ranker::new().with_epsilon(config.epsilon),
            active_study_only: false,
        }
    }

    /// Restricts every slot to the active (first loaded) study.
    pub fn with_active_study_only(mut self, enabled: bool) -> Self {
        self.active_study_only = enabled;
        self
    }

    /// Assigns every slot of `stage`.
    pub fn assign(&self, stage: &Stage, ctx: &MatchingContext<'_>) -> StageAssignment {
        let mut used: HashSet<SeriesKey> = HashSet::new();
        let mut assignment = StageAssignment::default();

        for (slot_index, slot) in stage.viewport_slots.iter().enumerate() {
            let (binding, slot_match) = self.assign_slot(slot_index, slot, ctx, &mut used);
            match &binding.target {
                Some(target) => log::debug!(
                    "slot {slot_index}: bound to study {} series {}",
                    target.study_id,
                    target.series_id
                ),
                None => log::debug!("slot {slot_index}: unbound ({:?})", slot_match.unbound_reason),
            }
            assignment.bindings.push(binding);
            assignment.slots.push(slot_match);
        }

        assignment
    }

    fn assign_slot(
        &self,
        slot_index: usize,
        slot: &ViewportSlot,
        ctx: &MatchingContext<'_>,
        used: &mut HashSet<SeriesKey>,
    ) -> (ViewportBinding, SlotMatch) {
        let studies = match ctx.studies() {
            [active, ..] if self.active_study_only => std::slice::from_ref(active),
            all => all,
        };
        let study_details: Vec<MatchDetails> = studies
            .iter()
            .map(|c| match_rules(&slot.study_rules, Entity::Study(c.study), self.resolver))
            .collect();

        // Most recent study first on equal score; undated studies last.
        let ranked = self
            .ranker
            .rank(&study_details, |a, b| studies[b].recency.cmp(&studies[a].recency));

        let mut slot_match = SlotMatch {
            slot_index,
            studies: studies
                .iter()
                .zip(&study_details)
                .map(|(c, details)| CandidateScore {
                    candidate_id: c.study.id.clone(),
                    details: details.clone(),
                })
                .collect(),
            series: Vec::new(),
            images: Vec::new(),
            unbound_reason: None,
        };
        let mut binding = ViewportBinding {
            slot_index,
            target: None,
            viewport_settings: slot.normalized_settings(),
        };

        if ranked.is_empty() {
            slot_match.unbound_reason = Some(UnboundReason::NoEligibleStudy);
            return (binding, slot_match);
        }

        let tried = if self.config.study_fallthrough {
            &ranked[..]
        } else {
            &ranked[..1]
        };

        for &study_index in tried {
            let study = &studies[study_index];
            let available: Vec<&SeriesCandidate<'_>> =
                study.series.iter().filter(|s| !used.contains(&s.key)).collect();

            if let Some(choice) = self.choose_series(slot, &available, &mut slot_match) {
                used.insert(choice.candidate.key.clone());
                binding.target = Some(BindingTarget {
                    study_id: study.study.id.clone(),
                    series_id: choice.candidate.series.id.clone(),
                    image_id: choice.image.map(|i| i.id.clone()),
                });
                return (binding, slot_match);
            }
        }

        slot_match.unbound_reason = Some(UnboundReason::NoEligibleSeries);
        (binding, slot_match)
    }

    fn choose_series<'c, 'a>(
        &self,
        slot: &ViewportSlot,
        available: &[&'c SeriesCandidate<'a>],
        slot_match: &mut SlotMatch,
    ) -> Option<SeriesChoice<'c, 'a>> {
        let details: Vec<MatchDetails> = available
            .iter()
            .map(|c| match_rules(&slot.series_rules, Entity::Series(c.series), self.resolver))
            .collect();
        let best = self.ranker.select_best(&details, |_, _| std::cmp::Ordering::Equal);

        slot_match
            .series
            .extend(available.iter().zip(details).map(|(c, details)| CandidateScore {
                candidate_id: c.series.id.clone(),
                details,
            }));

        let candidate = available[best?];
        let image = self.choose_image(slot, candidate, slot_match);
        Some(SeriesChoice { candidate, image })
    }

    /// Best image of the series; the first in order when there are no image rules.
    fn choose_image<'a>(
        &self,
        slot: &ViewportSlot,
        candidate: &SeriesCandidate<'a>,
        slot_match: &mut SlotMatch,
    ) -> Option<&'a Image> {
        if slot.image_rules.is_empty() {
            return candidate.images.first().copied();
        }
        let details: Vec<MatchDetails> = candidate
            .images
            .iter()
            .map(|&image| match_rules(&slot.image_rules, Entity::Image(image), self.resolver))
            .collect();
        let best = self.ranker.select_best(&details, |_, _| std::cmp::Ordering::Equal);

        slot_match
            .images
            .extend(candidate.images.iter().zip(details).map(|(image, details)| CandidateScore {
                candidate_id: image.id.clone(),
                details,
            }));

        best.map(|i| candidate.images[i])
    }
}
