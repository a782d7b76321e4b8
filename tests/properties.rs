//! Property tests for protocol selection and viewport assignment.

use std::collections::HashSet;

use hanging_protocol::attribute::AttributeResolver;
use hanging_protocol::constraint::Constraint;
use hanging_protocol::engine::{EngineConfig, MatchResult, MatchingPipeline, ProtocolEngine};
use hanging_protocol::matching::{MatchingConfig, StagePolicy};
use hanging_protocol::model::{Image, Protocol, Series, Stage, Study, ViewportSlot, ViewportStructure};
use hanging_protocol::rule::Rule;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
struct SeriesShape {
    modality: &'static str,
    number: Option<i64>,
    images: usize,
}

#[derive(Debug, Clone)]
struct StudyShape {
    timepoint: &'static str,
    date: Option<u32>,
    series: Vec<SeriesShape>,
}

/// A protocol rule: timepoint value, required flag, weight.
type RuleShape = (&'static str, bool, u8);

/// A slot: optional series modality rule with its required flag.
type SlotShape = Option<(&'static str, bool)>;

#[derive(Debug, Clone)]
struct ProtocolShape {
    rules: Vec<RuleShape>,
    stages: Vec<Vec<SlotShape>>,
}

fn arb_series() -> impl Strategy<Value = SeriesShape> {
    (
        prop::sample::select(vec!["CT", "MR", "PT"]),
        prop::option::of(1i64..20),
        0usize..3,
    )
        .prop_map(|(modality, number, images)| SeriesShape {
            modality,
            number,
            images,
        })
}

fn arb_studies() -> impl Strategy<Value = Vec<Study>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["baseline", "followup"]),
            prop::option::of(20200101u32..20241231),
            prop::collection::vec(arb_series(), 0..4),
        )
            .prop_map(|(timepoint, date, series)| StudyShape {
                timepoint,
                date,
                series,
            }),
        0..4,
    )
    .prop_map(|shapes| shapes.iter().enumerate().map(|(i, shape)| build_study(i, shape)).collect())
}

fn build_study(index: usize, shape: &StudyShape) -> Study {
    let id = format!("st{index}");
    let mut study = Study::new(&id).with_attribute("timepointType", shape.timepoint);
    if let Some(date) = shape.date {
        study = study.with_attribute("StudyDate", date.to_string());
    }
    for (s, series_shape) in shape.series.iter().enumerate() {
        let mut series = Series::new(format!("{id}-se{s}")).with_attribute("Modality", series_shape.modality);
        if let Some(number) = series_shape.number {
            series = series.with_attribute("SeriesNumber", number);
        }
        for i in 0..series_shape.images {
            series = series.with_image(Image::new(format!("{id}-se{s}-im{i}")).with_attribute("InstanceNumber", i + 1));
        }
        study = study.with_series(series);
    }
    study
}

fn arb_protocol() -> impl Strategy<Value = ProtocolShape> {
    let rule = (prop::sample::select(vec!["baseline", "followup"]), any::<bool>(), 0u8..4);
    let slot = prop::option::of((prop::sample::select(vec!["CT", "MR", "PT"]), any::<bool>()));
    (
        prop::collection::vec(rule, 0..3),
        prop::collection::vec(prop::collection::vec(slot, 0..4), 0..3),
    )
        .prop_map(|(rules, stages)| ProtocolShape { rules, stages })
}

fn build_protocol(id: String, shape: &ProtocolShape) -> Protocol {
    let mut protocol = Protocol::new(id.clone(), id);
    for &(timepoint, required, weight) in &shape.rules {
        protocol = protocol.with_rule(
            Rule::protocol("timepointType", Constraint::equals(timepoint))
                .with_required(required)
                .with_weight(f64::from(weight)),
        );
    }
    for (i, slots) in shape.stages.iter().enumerate() {
        let mut stage = Stage::new(format!("stage{i}"), ViewportStructure::grid(1, slots.len().max(1)));
        for slot in slots {
            let mut viewport = ViewportSlot::new();
            if let Some((modality, required)) = slot {
                viewport = viewport.with_rule(Rule::series("Modality", Constraint::equals(*modality)).with_required(*required));
            }
            stage = stage.with_slot(viewport);
        }
        protocol = protocol.with_stage(stage);
    }
    protocol
}

fn default_protocol(weight: u8) -> Protocol {
    Protocol::new("default", "Default")
        .with_rule(Rule::protocol("timepointType", Constraint::equals("baseline")).with_weight(f64::from(weight)))
        .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new()))
}

fn arb_protocols() -> impl Strategy<Value = Vec<Protocol>> {
    (prop::collection::vec(arb_protocol(), 0..5), 0usize..6, 0u8..3).prop_map(|(shapes, position, weight)| {
        let mut protocols: Vec<Protocol> = shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| build_protocol(format!("p{i}"), shape))
            .collect();
        let position = position.min(protocols.len());
        protocols.insert(position, default_protocol(weight));
        protocols
    })
}

fn arb_policy() -> impl Strategy<Value = StagePolicy> {
    prop::sample::select(vec![
        StagePolicy::SmallestCovering,
        StagePolicy::FirstFillable,
        StagePolicy::FirstActivated,
    ])
}

fn run(protocols: &[Protocol], studies: &[Study], policy: StagePolicy) -> MatchResult {
    let resolver = AttributeResolver::new();
    let config = MatchingConfig::default().with_stage_policy(policy);
    MatchingPipeline::new(&resolver, &config)
        .run(protocols, studies)
        .expect("default protocol is always present")
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_matching_is_deterministic(
        protocols in arb_protocols(),
        studies in arb_studies(),
        policy in arb_policy(),
    ) {
        let first = run(&protocols, &studies, policy);
        let second = run(&protocols, &studies, policy);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_vetoed_protocol_never_selected(
        protocols in arb_protocols(),
        studies in arb_studies(),
    ) {
        let result = run(&protocols, &studies, StagePolicy::default());
        let selected = &result.protocol_matches[result.protocol_index];
        prop_assert!(selected.is_eligible());
        for m in &result.protocol_matches {
            if !m.is_eligible() {
                prop_assert_ne!(m.index, result.protocol_index);
            }
        }
    }

    #[test]
    fn prop_highest_score_then_earliest_wins(
        protocols in arb_protocols(),
        studies in arb_studies(),
    ) {
        let result = run(&protocols, &studies, StagePolicy::default());
        let best = result.protocol_matches[result.protocol_index].details.total_score;
        for m in result.protocol_matches.iter().filter(|m| m.is_eligible()) {
            // Weights are integral, so scores are exact.
            prop_assert!(m.details.total_score <= best);
            if m.details.total_score == best {
                prop_assert!(m.index >= result.protocol_index);
            }
        }
    }

    #[test]
    fn prop_default_used_when_nothing_else_eligible(
        protocols in arb_protocols(),
        studies in arb_studies(),
    ) {
        let result = run(&protocols, &studies, StagePolicy::default());
        let others = result
            .protocol_matches
            .iter()
            .any(|m| m.protocol_id != "default" && m.is_eligible());
        if !others {
            prop_assert_eq!(result.protocol_id.as_str(), "default");
            prop_assert!(result.fallback);
        } else {
            prop_assert!(!result.fallback);
        }
    }

    #[test]
    fn prop_series_and_images_never_shared(
        protocols in arb_protocols(),
        studies in arb_studies(),
        policy in arb_policy(),
    ) {
        let result = run(&protocols, &studies, policy);
        let targets: Vec<_> = result.bindings.iter().filter_map(|b| b.target.as_ref()).collect();

        let series: HashSet<_> = targets.iter().map(|t| (&t.study_id, &t.series_id)).collect();
        prop_assert_eq!(series.len(), targets.len());

        let images: Vec<_> = targets.iter().filter_map(|t| t.image_id.as_ref()).collect();
        let unique: HashSet<_> = images.iter().collect();
        prop_assert_eq!(unique.len(), images.len());
    }

    #[test]
    fn prop_one_binding_per_slot(
        protocols in arb_protocols(),
        studies in arb_studies(),
        policy in arb_policy(),
    ) {
        let result = run(&protocols, &studies, policy);
        let stage = &protocols[result.protocol_index].stages[result.stage_index];
        prop_assert_eq!(result.bindings.len(), stage.viewport_slots.len());
        for (i, binding) in result.bindings.iter().enumerate() {
            prop_assert_eq!(binding.slot_index, i);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn prop_noop_pass_is_byte_identical(
        protocols in arb_protocols(),
        studies in arb_studies(),
    ) {
        let first = run(&protocols, &studies, StagePolicy::default());
        let second = run(&protocols, &studies, StagePolicy::default());
        let a = serde_json::to_vec(&first.bindings).expect("bindings serialize");
        let b = serde_json::to_vec(&second.bindings).expect("bindings serialize");
        prop_assert_eq!(a, b);
    }
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn test_required_timepoint_falls_back_to_default() {
    let _ = env_logger::builder().is_test(true).try_init();
    let protocols = vec![
        Protocol::new("ProtoA", "Proto A")
            .with_rule(Rule::protocol("timepointType", Constraint::equals("followup")).with_required(true))
            .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new())),
        Protocol::new("ProtoDefault", "Default")
            .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new())),
    ];
    let studies = vec![Study::new("st")
        .with_attribute("timepointType", "baseline")
        .with_series(Series::new("se2").with_attribute("SeriesNumber", 2).with_image(Image::new("im-b")))
        .with_series(
            Series::new("se1")
                .with_attribute("SeriesNumber", 1)
                .with_image(Image::new("im-2").with_attribute("InstanceNumber", 2))
                .with_image(Image::new("im-1").with_attribute("InstanceNumber", 1)),
        )];

    let resolver = AttributeResolver::new();
    let config = MatchingConfig::default().with_default_protocol_id("ProtoDefault");
    let result = MatchingPipeline::new(&resolver, &config)
        .run(&protocols, &studies)
        .expect("default present");

    assert!(!result.protocol_matches[0].is_eligible());
    assert_eq!(result.protocol_id, "ProtoDefault");
    assert!(result.fallback);

    let target = result.bindings[0].target.as_ref().expect("slot bound");
    assert_eq!(target.study_id, "st");
    assert_eq!(target.series_id, "se1");
    assert_eq!(target.image_id.as_deref(), Some("im-1"));
}

#[test]
fn test_modality_slots_bind_regardless_of_load_order() {
    let ct = Series::new("ct").with_attribute("Modality", "CT").with_image(Image::new("ct-1"));
    let mr = Series::new("mr").with_attribute("Modality", "MR").with_image(Image::new("mr-1"));
    let protocols = vec![Protocol::new("default", "CT/MR").with_stage(
        Stage::new("1x2", ViewportStructure::grid(1, 2))
            .with_slot(ViewportSlot::new().with_rule(Rule::series("Modality", Constraint::equals("CT")).with_required(true)))
            .with_slot(ViewportSlot::new().with_rule(Rule::series("Modality", Constraint::equals("MR")).with_required(true))),
    )];

    for studies in [
        vec![Study::new("st").with_series(ct.clone()).with_series(mr.clone())],
        vec![Study::new("st").with_series(mr.clone()).with_series(ct.clone())],
    ] {
        let result = run(&protocols, &studies, StagePolicy::default());
        let series: Vec<Option<&str>> = result
            .bindings
            .iter()
            .map(|b| b.target.as_ref().map(|t| t.series_id.as_str()))
            .collect();
        assert_eq!(series, vec![Some("ct"), Some("mr")]);
    }
}

#[test]
fn test_engine_noop_pass_republishes_identical_bindings() {
    let protocols = vec![default_protocol(1)];
    let studies = vec![build_study(
        0,
        &StudyShape {
            timepoint: "baseline",
            date: Some(20240105),
            series: vec![
                SeriesShape {
                    modality: "CT",
                    number: Some(2),
                    images: 2,
                },
                SeriesShape {
                    modality: "MR",
                    number: None,
                    images: 1,
                },
            ],
        },
    )];

    let mut engine = ProtocolEngine::new(studies, protocols, EngineConfig::default()).expect("valid engine");
    let before = engine.current().expect("applied");
    engine.on_study_set_changed().expect("pass");
    let after = engine.current().expect("applied");

    assert_eq!(engine.passes(), 2);
    assert_eq!(before.bindings, after.bindings);
    assert_eq!(before.protocol_id, after.protocol_id);
}
