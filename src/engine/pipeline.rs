//! One complete matching pass.

use crate::assignment::{SlotMatch, ViewportAssigner, ViewportBinding};
use crate::attribute::AttributeResolver;
use crate::context::MatchingContext;
use crate::error::EngineError;
use crate::matching::{select_stage, MatchingConfig, ProtocolMatch, ProtocolMatcher, ProtocolSelection};
use crate::model::{Protocol, Study, ViewportStructure};

/// Result of one matching pass: the chosen protocol and stage, the
/// bindings of every slot and the full diagnostics.
///
/// A new value is built on every pass; results are never updated in
/// place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MatchResult {
    pub protocol_index: usize,
    pub protocol_id: String,
    pub protocol_name: String,
    pub stage_index: usize,
    pub stage_name: String,
    pub stage_count: usize,
    /// `true` when the default protocol was used because nothing else was
    /// eligible.
    pub fallback: bool,
    pub viewport_structure: ViewportStructure,
    /// One entry per slot of the active stage, in slot order.
    pub bindings: Vec<ViewportBinding>,
    pub protocol_matches: Vec<ProtocolMatch>,
    pub slot_matches: Vec<SlotMatch>,
}

impl MatchResult {
    pub fn binding(&self, slot_index: usize) -> Option<&ViewportBinding> {
        self.bindings.get(slot_index)
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_bound()).count()
    }
}

/// Runs context building, protocol selection, stage selection and
/// viewport assignment as one pure computation.
///
/// # Examples
///
/// ```
/// use hanging_protocol::attribute::AttributeResolver;
/// use hanging_protocol::engine::MatchingPipeline;
/// use hanging_protocol::matching::MatchingConfig;
/// use hanging_protocol::model::{Image, Protocol, Series, Stage, Study, ViewportSlot, ViewportStructure};
///
/// let protocols = vec![Protocol::new("default", "Default")
///     .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new()))];
/// let studies = vec![Study::new("st").with_series(Series::new("se").with_image(Image::new("im")))];
///
/// let resolver = AttributeResolver::new();
/// let config = MatchingConfig::default();
/// let result = MatchingPipeline::new(&resolver, &config).run(&protocols, &studies).unwrap();
///
/// let target = result.bindings[0].target.as_ref().unwrap();
/// assert_eq!(target.series_id, "se");
/// assert_eq!(target.image_id.as_deref(), Some("im"));
/// ```
pub struct MatchingPipeline<'r> {
    resolver: &'r AttributeResolver,
    config: &'r MatchingConfig,
}

impl<'r> MatchingPipeline<'r> {
    pub fn new(resolver: &'r AttributeResolver, config: &'r MatchingConfig) -> Self {
        Self { resolver, config }
    }

    /// Selects a protocol and stage for `studies` and binds every slot.
    pub fn run(&self, protocols: &[Protocol], studies: &[Study]) -> Result<MatchResult, EngineError> {
        let ctx = MatchingContext::build(studies);
        let selection = ProtocolMatcher::new(self.resolver, self.config).select(protocols, &ctx)?;
        let protocol = &protocols[selection.protocol_index];
        let assigner =
            ViewportAssigner::new(self.resolver, self.config).with_active_study_only(protocol.active_study_only());
        let stage_index = select_stage(protocol, &ctx, self.config.stage_policy, &assigner);
        Ok(self.finish(protocols, &ctx, &assigner, selection, stage_index))
    }

    /// Like [`run`](Self::run), with the protocol and stage fixed.
    ///
    /// Used for stage navigation: protocol diagnostics are recomputed but
    /// the selection is overridden.
    pub fn run_stage(
        &self,
        protocols: &[Protocol],
        studies: &[Study],
        protocol_index: usize,
        stage_index: usize,
    ) -> Result<MatchResult, EngineError> {
        let protocol = protocols.get(protocol_index).ok_or(EngineError::ProtocolOutOfRange {
            index: protocol_index,
            protocols: protocols.len(),
        })?;
        if stage_index >= protocol.stages.len() {
            return Err(EngineError::StageOutOfRange {
                protocol_id: protocol.id.clone(),
                index: stage_index,
                stages: protocol.stages.len(),
            });
        }

        let ctx = MatchingContext::build(studies);
        let mut selection = ProtocolMatcher::new(self.resolver, self.config).select(protocols, &ctx)?;
        selection.fallback &= selection.protocol_index == protocol_index;
        selection.protocol_index = protocol_index;

        let assigner =
            ViewportAssigner::new(self.resolver, self.config).with_active_study_only(protocol.active_study_only());
        Ok(self.finish(protocols, &ctx, &assigner, selection, stage_index))
    }

    fn finish(
        &self,
        protocols: &[Protocol],
        ctx: &MatchingContext<'_>,
        assigner: &ViewportAssigner<'_>,
        selection: ProtocolSelection,
        stage_index: usize,
    ) -> MatchResult {
        let protocol = &protocols[selection.protocol_index];
        let stage = &protocol.stages[stage_index];

        if !stage.viewport_structure.is_grid() {
            log::warn!(
                "stage `{}` of `{}` uses unknown layout `{}`; passing it through",
                stage.name,
                protocol.id,
                stage.viewport_structure.layout_type
            );
        } else if stage.slot_count() > stage.viewport_structure.capacity() {
            log::warn!(
                "stage `{}` of `{}` declares {} slots for a {}x{} grid",
                stage.name,
                protocol.id,
                stage.slot_count(),
                stage.viewport_structure.rows,
                stage.viewport_structure.columns
            );
        }

        let assignment = assigner.assign(stage, ctx);
        log::info!(
            "applied protocol `{}` stage {stage_index} (`{}`): {} of {} slots bound{}",
            protocol.id,
            stage.name,
            assignment.bound_count(),
            stage.slot_count(),
            if selection.fallback { ", fallback" } else { "" }
        );

        MatchResult {
            protocol_index: selection.protocol_index,
            protocol_id: protocol.id.clone(),
            protocol_name: protocol.name.clone(),
            stage_index,
            stage_name: stage.name.clone(),
            stage_count: protocol.stages.len(),
            fallback: selection.fallback,
            viewport_structure: stage.viewport_structure.clone(),
            bindings: assignment.bindings,
            protocol_matches: selection.matches,
            slot_matches: assignment.slots,
        }
    }
}
