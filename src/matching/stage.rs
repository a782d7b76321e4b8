//! Stage selection within the chosen protocol.

use crate::assignment::ViewportAssigner;
use crate::context::MatchingContext;
use crate::model::Protocol;

use super::config::StagePolicy;

/// Index of the stage to activate for `protocol`.
///
/// Falls back to the first declared stage when no stage satisfies the
/// policy. Returns 0 for a protocol without stages; callers never select
/// such a protocol.
pub fn select_stage(
    protocol: &Protocol,
    ctx: &MatchingContext<'_>,
    policy: StagePolicy,
    assigner: &ViewportAssigner<'_>,
) -> usize {
    let series = ctx.distinct_series_count();
    let stages = &protocol.stages;

    let chosen = match policy {
        StagePolicy::SmallestCovering => stages
            .iter()
            .enumerate()
            .filter(|(_, stage)| stage.slot_count() >= series)
            .min_by_key(|(index, stage)| (stage.slot_count(), *index))
            .map(|(index, _)| index),
        StagePolicy::FirstFillable => stages.iter().position(|stage| stage.slot_count() <= series),
        StagePolicy::FirstActivated => stages.iter().position(|stage| {
            let bound = assigner.assign(stage, ctx).bound_count();
            log::trace!(
                "stage `{}`: {bound} of {} slots bound, {} needed",
                stage.name,
                stage.slot_count(),
                stage.min_viewports_matched()
            );
            bound >= stage.min_viewports_matched()
        }),
    };

    match chosen {
        Some(index) => {
            log::debug!("protocol `{}`: stage {index} chosen by {policy:?}", protocol.id);
            index
        }
        None => {
            log::debug!(
                "protocol `{}`: no stage satisfies {policy:?} for {series} series, using the first",
                protocol.id
            );
            0
        }
    }
}
