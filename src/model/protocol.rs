//! Protocol documents: protocols, stages and viewport slots.

use std::collections::BTreeMap;

use crate::attribute::AttributeValue;
use crate::rule::{Rule, RuleLevel};

/// Opaque per-slot configuration passed through to the layout consumer.
pub type ViewportSettings = BTreeMap<String, AttributeValue>;

/// Grid descriptor of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct ViewportStructure {
    /// Only `"grid"` is understood; other layouts are passed through.
    pub layout_type: String,
    pub rows: usize,
    pub columns: usize,
}

impl ViewportStructure {
    /// A `rows` x `columns` grid.
    pub fn grid(rows: usize, columns: usize) -> Self {
        Self {
            layout_type: "grid".to_string(),
            rows,
            columns,
        }
    }

    /// Number of viewports the grid can show.
    pub fn capacity(&self) -> usize {
        self.rows * self.columns
    }

    /// Whether the layout type is `grid`.
    pub fn is_grid(&self) -> bool {
        self.layout_type == "grid"
    }
}

impl Default for ViewportStructure {
    fn default() -> Self {
        Self::grid(1, 1)
    }
}

/// Matching criteria for one on-screen viewport.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ViewportSlot {
    #[cfg_attr(
        feature = "serde",
        serde(default, alias = "studyMatchingRules", deserialize_with = "leveled::study")
    )]
    pub study_rules: Vec<Rule>,
    #[cfg_attr(
        feature = "serde",
        serde(default, alias = "seriesMatchingRules", deserialize_with = "leveled::series")
    )]
    pub series_rules: Vec<Rule>,
    #[cfg_attr(
        feature = "serde",
        serde(default, alias = "imageMatchingRules", deserialize_with = "leveled::image")
    )]
    pub image_rules: Vec<Rule>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub viewport_settings: ViewportSettings,
}

impl ViewportSlot {
    /// A slot with no rules and no settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule to the list matching its level.
    ///
    /// Protocol-level rules have no meaning on a slot and are dropped.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        match rule.level {
            RuleLevel::Study => self.study_rules.push(rule),
            RuleLevel::Series => self.series_rules.push(rule),
            RuleLevel::Image => self.image_rules.push(rule),
            RuleLevel::Protocol => {
                log::warn!("dropping protocol-level rule `{}` added to a viewport slot", rule.label());
            }
        }
        self
    }

    /// Sets a viewport setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.viewport_settings.insert(key.into(), value.into());
        self
    }

    /// Rules of one level; empty for `Protocol`.
    pub fn rules(&self, level: RuleLevel) -> &[Rule] {
        match level {
            RuleLevel::Study => &self.study_rules,
            RuleLevel::Series => &self.series_rules,
            RuleLevel::Image => &self.image_rules,
            RuleLevel::Protocol => &[],
        }
    }

    /// Settings with `"YES"`/`"NO"` strings converted to booleans.
    pub fn normalized_settings(&self) -> ViewportSettings {
        self.viewport_settings
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    AttributeValue::Text(s) if s.trim().eq_ignore_ascii_case("yes") => AttributeValue::Bool(true),
                    AttributeValue::Text(s) if s.trim().eq_ignore_ascii_case("no") => AttributeValue::Bool(false),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Conditions under which a stage may be activated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct StageActivation {
    /// Minimum number of slots that must bind; 1 when unset.
    pub min_viewports_matched: Option<usize>,
}

/// One concrete layout of a protocol.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Stage {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub viewport_structure: ViewportStructure,
    #[cfg_attr(feature = "serde", serde(default, alias = "viewports"))]
    pub viewport_slots: Vec<ViewportSlot>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stage_activation: StageActivation,
}

impl Stage {
    /// A stage with no slots.
    pub fn new(name: impl Into<String>, viewport_structure: ViewportStructure) -> Self {
        Self {
            name: name.into(),
            viewport_structure,
            ..Self::default()
        }
    }

    /// Sets the stage id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Appends a viewport slot.
    pub fn with_slot(mut self, slot: ViewportSlot) -> Self {
        self.viewport_slots.push(slot);
        self
    }

    /// Sets the activation threshold.
    pub fn with_min_viewports_matched(mut self, min: usize) -> Self {
        self.stage_activation.min_viewports_matched = Some(min);
        self
    }

    pub fn slot_count(&self) -> usize {
        self.viewport_slots.len()
    }

    pub fn min_viewports_matched(&self) -> usize {
        self.stage_activation.min_viewports_matched.unwrap_or(1)
    }
}

/// A named layout template with protocol-level rules and stages.
///
/// `locked` marks built-in protocols; it has no effect on matching.
///
/// `number_of_priors_referenced` gates the protocol on the study set: a
/// value `n >= 0` requires at least `n` studies besides the active one,
/// and `-1` restricts every slot to the active (first loaded) study.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Protocol {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub locked: bool,
    #[cfg_attr(
        feature = "serde",
        serde(default, alias = "protocolMatchingRules", deserialize_with = "leveled::protocol")
    )]
    pub protocol_rules: Vec<Rule>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stages: Vec<Stage>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub number_of_priors_referenced: Option<i64>,
}

impl Protocol {
    /// An unlocked protocol with no rules or stages.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Marks the protocol as built in.
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Sets the number of prior studies the protocol needs.
    pub fn with_priors_referenced(mut self, priors: i64) -> Self {
        self.number_of_priors_referenced = Some(priors);
        self
    }

    /// Prior studies required beyond the active one, if any.
    pub fn required_priors(&self) -> Option<usize> {
        self.number_of_priors_referenced
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n > 0)
    }

    /// Whether slots may only bind the active study.
    pub fn active_study_only(&self) -> bool {
        self.number_of_priors_referenced == Some(-1)
    }

    /// Adds a protocol rule. The rule's level is forced to `Protocol`.
    pub fn with_rule(mut self, mut rule: Rule) -> Self {
        rule.level = RuleLevel::Protocol;
        self.protocol_rules.push(rule);
        self
    }

    /// Appends a stage.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Checks that this protocol can serve as the fallback.
    ///
    /// A default protocol must have a stage, no required protocol rules
    /// and no prior-study requirement, so that it is eligible for every
    /// study set.
    pub fn validate_as_default(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err("default protocol declares no stages".into());
        }
        if let Some(priors) = self.required_priors() {
            return Err(format!("default protocol requires {priors} prior studies"));
        }
        if let Some(rule) = self.protocol_rules.iter().find(|r| r.required) {
            return Err(format!(
                "default protocol carries required rule `{}`",
                rule.label()
            ));
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    /// Parses one protocol document.
    pub fn from_json(json: &str) -> Result<Protocol, crate::error::EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "serde")]
    /// Parses a list of protocol documents.
    pub fn list_from_json(json: &str) -> Result<Vec<Protocol>, crate::error::EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Rule-list deserializers that stamp the level of the list they read.
#[cfg(feature = "serde")]
mod leveled {
    use serde::{Deserialize, Deserializer};

    use crate::rule::{Rule, RuleLevel};

    fn with_level<'de, D>(deserializer: D, level: RuleLevel) -> Result<Vec<Rule>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut rules = Vec::<Rule>::deserialize(deserializer)?;
        for rule in &mut rules {
            rule.level = level;
        }
        Ok(rules)
    }

    pub fn protocol<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Rule>, D::Error> {
        with_level(deserializer, RuleLevel::Protocol)
    }

    pub fn study<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Rule>, D::Error> {
        with_level(deserializer, RuleLevel::Study)
    }

    pub fn series<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Rule>, D::Error> {
        with_level(deserializer, RuleLevel::Series)
    }

    pub fn image<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Rule>, D::Error> {
        with_level(deserializer, RuleLevel::Image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;

    #[test]
    fn test_slot_dispatches_by_level() {
        let slot = ViewportSlot::new()
            .with_rule(Rule::study("timepointType", Constraint::equals("baseline")))
            .with_rule(Rule::series("Modality", Constraint::equals("CT")))
            .with_rule(Rule::image("InstanceNumber", Constraint::equals(1)))
            .with_rule(Rule::protocol("numberOfStudies", Constraint::equals(1)));
        assert_eq!(slot.rules(RuleLevel::Study).len(), 1);
        assert_eq!(slot.rules(RuleLevel::Series).len(), 1);
        assert_eq!(slot.rules(RuleLevel::Image).len(), 1);
        assert!(slot.rules(RuleLevel::Protocol).is_empty());
    }

    #[test]
    fn test_normalized_settings() {
        let slot = ViewportSlot::new()
            .with_setting("invert", "YES")
            .with_setting("cine", "no")
            .with_setting("voi", "LUNG");
        let settings = slot.normalized_settings();
        assert_eq!(settings["invert"], AttributeValue::Bool(true));
        assert_eq!(settings["cine"], AttributeValue::Bool(false));
        assert_eq!(settings["voi"], AttributeValue::from("LUNG"));
    }

    #[test]
    fn test_protocol_rule_level_forced() {
        let protocol = Protocol::new("p", "P").with_rule(Rule::study("x", Constraint::Present));
        assert_eq!(protocol.protocol_rules[0].level, RuleLevel::Protocol);
    }

    #[test]
    fn test_validate_as_default() {
        let no_stage = Protocol::new("default", "Default");
        assert!(no_stage.validate_as_default().is_err());

        let required = Protocol::new("default", "Default")
            .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new()))
            .with_rule(Rule::protocol("numberOfStudies", Constraint::equals(1)).with_required(true));
        assert!(required.validate_as_default().is_err());

        let ok = Protocol::new("default", "Default")
            .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new()));
        assert!(ok.validate_as_default().is_ok());
    }

    #[test]
    fn test_priors_referenced() {
        let plain = Protocol::new("p", "P");
        assert_eq!(plain.required_priors(), None);
        assert!(!plain.active_study_only());

        let comparison = Protocol::new("p", "P").with_priors_referenced(2);
        assert_eq!(comparison.required_priors(), Some(2));

        let current = Protocol::new("p", "P").with_priors_referenced(-1);
        assert_eq!(current.required_priors(), None);
        assert!(current.active_study_only());
        assert_eq!(Protocol::new("p", "P").with_priors_referenced(0).required_priors(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_priors_referenced_document() {
        let protocol = Protocol::from_json(r#"{ "id": "cmp", "numberOfPriorsReferenced": 1, "stages": [] }"#)
            .expect("valid protocol");
        assert_eq!(protocol.number_of_priors_referenced, Some(1));

        let bare = Protocol::from_json(r#"{ "id": "bare" }"#).expect("valid protocol");
        assert_eq!(bare.number_of_priors_referenced, None);
        let json = serde_json::to_string(&bare).expect("serializable");
        assert!(!json.contains("numberOfPriorsReferenced"));
    }

    #[test]
    fn test_stage_activation_default() {
        let stage = Stage::new("2x1", ViewportStructure::grid(1, 2));
        assert_eq!(stage.min_viewports_matched(), 1);
        assert_eq!(stage.with_min_viewports_matched(2).min_viewports_matched(), 2);
        assert_eq!(ViewportStructure::grid(2, 3).capacity(), 6);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_protocol_document() {
        let json = r#"{
            "id": "ctChest",
            "name": "CT Chest",
            "locked": true,
            "protocolMatchingRules": [
                { "attribute": "modalitiesInStudy", "constraint": { "contains": "CT" }, "required": true }
            ],
            "stages": [
                {
                    "name": "1x2",
                    "viewportStructure": { "layoutType": "grid", "rows": 1, "columns": 2 },
                    "stageActivation": { "minViewportsMatched": 2 },
                    "viewports": [
                        {
                            "seriesMatchingRules": [
                                { "attribute": "SeriesDescription", "constraint": { "containsI": "lung" }, "weight": 2 }
                            ],
                            "viewportSettings": { "invert": "NO" }
                        },
                        {}
                    ]
                }
            ]
        }"#;
        let protocol = Protocol::from_json(json).expect("valid protocol");
        assert!(protocol.locked);
        assert_eq!(protocol.protocol_rules[0].level, RuleLevel::Protocol);
        assert!(protocol.protocol_rules[0].required);

        let stage = &protocol.stages[0];
        assert_eq!(stage.viewport_structure.capacity(), 2);
        assert_eq!(stage.min_viewports_matched(), 2);
        assert_eq!(stage.slot_count(), 2);

        let rule = &stage.viewport_slots[0].series_rules[0];
        assert_eq!(rule.level, RuleLevel::Series);
        assert!((rule.weight - 2.0).abs() < 1e-10);
        assert!(stage.viewport_slots[1].series_rules.is_empty());
    }
}
