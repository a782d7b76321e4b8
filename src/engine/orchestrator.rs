//! The protocol engine: owns the current result and reacts to triggers.

use std::sync::Arc;

use crate::assignment::ViewportBinding;
use crate::attribute::AttributeResolver;
use crate::error::EngineError;

use super::config::EngineConfig;
use super::pipeline::{MatchResult, MatchingPipeline};
use super::source::{ProtocolStore, StudySource};

/// Orchestrator state.
///
/// `Idle` and `Applied` are the rest states; `Matching` is only observed
/// while a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No studies loaded.
    Idle,
    Matching,
    /// A result is published.
    Applied,
}

/// Handle returned by [`ProtocolEngine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

type Subscriber = Box<dyn FnMut(Option<&Arc<MatchResult>>)>;

/// Coordinates matching passes for one viewer session.
///
/// Collaborators are injected: `S` supplies the loaded studies and `P` the
/// protocol list. The host calls the `on_*` hooks when they change. With
/// `auto_settle` each hook runs a pass at once; otherwise hooks only mark
/// the engine pending and [`settle`](Self::settle) runs one coalesced
/// pass.
///
/// Every completed pass replaces the current [`MatchResult`] as a whole
/// and notifies each subscriber exactly once. Emptying the study set
/// clears the result and notifies subscribers with `None`.
///
/// # Examples
///
/// ```
/// use hanging_protocol::engine::{EngineConfig, EngineState, ProtocolEngine};
/// use hanging_protocol::model::{Protocol, Series, Stage, Study, ViewportSlot, ViewportStructure};
///
/// let protocols = vec![Protocol::new("default", "Default")
///     .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new()))];
///
/// let mut engine = ProtocolEngine::new(Vec::<Study>::new(), protocols, EngineConfig::default()).unwrap();
/// assert_eq!(engine.state(), EngineState::Idle);
///
/// engine.source_mut().push(Study::new("st").with_series(Series::new("se")));
/// engine.on_study_set_changed().unwrap();
/// assert_eq!(engine.state(), EngineState::Applied);
/// assert_eq!(engine.current().unwrap().protocol_id, "default");
/// ```
pub struct ProtocolEngine<S, P> {
    source: S,
    store: P,
    resolver: AttributeResolver,
    config: EngineConfig,
    state: EngineState,
    pending: bool,
    current: Option<Arc<MatchResult>>,
    active_viewport: usize,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: usize,
    passes: u64,
}

impl<S: StudySource, P: ProtocolStore> ProtocolEngine<S, P> {
    /// Creates an engine with the built-in derived attributes.
    pub fn new(source: S, store: P, config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_resolver(source, store, AttributeResolver::new(), config)
    }

    /// Creates an engine with a custom attribute resolver.
    ///
    /// With `auto_settle` the first pass runs immediately, so a missing
    /// default protocol is reported here.
    pub fn with_resolver(
        source: S,
        store: P,
        resolver: AttributeResolver,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let mut engine = Self {
            source,
            store,
            resolver,
            config,
            state: EngineState::Idle,
            pending: true,
            current: None,
            active_viewport: 0,
            subscribers: Vec::new(),
            next_subscriber: 0,
            passes: 0,
        };
        if engine.config.auto_settle {
            engine.settle()?;
        }
        Ok(engine)
    }

    /// The loaded study set changed.
    pub fn on_study_set_changed(&mut self) -> Result<(), EngineError> {
        self.trigger("study set changed")
    }

    /// The protocol list changed.
    pub fn on_protocols_changed(&mut self) -> Result<(), EngineError> {
        self.trigger("protocols changed")
    }

    /// A protocol's rules were edited. Same as a protocol-list change.
    pub fn on_rules_edited(&mut self) -> Result<(), EngineError> {
        self.trigger("rules edited")
    }

    fn trigger(&mut self, reason: &str) -> Result<(), EngineError> {
        log::debug!("trigger: {reason}");
        self.pending = true;
        if self.config.auto_settle {
            self.settle()?;
        }
        Ok(())
    }

    /// Returns `true` if a trigger has not been settled yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Runs one matching pass if any trigger is pending.
    ///
    /// Returns `Ok(true)` when a new result was published. An empty study
    /// set clears the result, leaves the engine `Idle` and, if a result was
    /// showing, notifies subscribers with `None`. On error the
    /// previous result and rest state are kept and the trigger stays
    /// pending.
    pub fn settle(&mut self) -> Result<bool, EngineError> {
        if self.state == EngineState::Matching {
            return Err(EngineError::ReentrantPass);
        }
        if !self.pending {
            return Ok(false);
        }

        let rest = self.state;
        self.state = EngineState::Matching;
        self.pending = false;

        let studies = self.source.studies();
        if studies.is_empty() {
            log::info!("no studies loaded; engine idle");
            self.state = EngineState::Idle;
            if self.current.take().is_some() {
                self.notify(None);
            }
            return Ok(false);
        }

        let pipeline = MatchingPipeline::new(&self.resolver, &self.config.matching);
        match pipeline.run(self.store.protocols(), studies) {
            Ok(result) => {
                self.publish(result);
                Ok(true)
            }
            Err(err) => {
                log::warn!("matching pass failed: {err}");
                self.state = rest;
                self.pending = true;
                Err(err)
            }
        }
    }

    /// Activates a stage of the current protocol and rebinds its slots.
    ///
    /// Returns `Ok(false)` when there is no current result.
    pub fn set_stage(&mut self, stage_index: usize) -> Result<bool, EngineError> {
        if self.state == EngineState::Matching {
            return Err(EngineError::ReentrantPass);
        }
        if self.pending {
            self.settle()?;
        }
        let Some(protocol_index) = self.current.as_ref().map(|c| c.protocol_index) else {
            return Ok(false);
        };

        let rest = self.state;
        self.state = EngineState::Matching;
        let pipeline = MatchingPipeline::new(&self.resolver, &self.config.matching);
        match pipeline.run_stage(self.store.protocols(), self.source.studies(), protocol_index, stage_index) {
            Ok(result) => {
                self.publish(result);
                Ok(true)
            }
            Err(err) => {
                self.state = rest;
                Err(err)
            }
        }
    }

    /// Moves to the next stage. Returns `Ok(false)` at the last stage.
    pub fn next_stage(&mut self) -> Result<bool, EngineError> {
        let target = self
            .current
            .as_deref()
            .and_then(|c| (c.stage_index + 1 < c.stage_count).then_some(c.stage_index + 1));
        match target {
            Some(index) => self.set_stage(index),
            None => Ok(false),
        }
    }

    /// Moves to the previous stage. Returns `Ok(false)` at the first stage.
    pub fn previous_stage(&mut self) -> Result<bool, EngineError> {
        let target = self.current.as_deref().and_then(|c| c.stage_index.checked_sub(1));
        match target {
            Some(index) => self.set_stage(index),
            None => Ok(false),
        }
    }

    fn publish(&mut self, result: MatchResult) {
        self.passes += 1;
        let result = Arc::new(result);
        self.current = Some(Arc::clone(&result));
        self.state = EngineState::Applied;
        log::debug!("pass {} published to {} subscribers", self.passes, self.subscribers.len());
        self.notify(Some(&result));
    }

    fn notify(&mut self, result: Option<&Arc<MatchResult>>) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(result);
        }
    }

    /// Registers a callback invoked once per published result.
    ///
    /// The callback receives `None` when the result is cleared because
    /// the study set became empty.
    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriberId
    where
        F: FnMut(Option<&Arc<MatchResult>>) + 'static,
    {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Highlights a viewport. Never triggers a pass.
    pub fn set_active_viewport(&mut self, index: usize) {
        self.active_viewport = index;
    }

    pub fn active_viewport(&self) -> usize {
        self.active_viewport
    }

    /// Binding of the active viewport in the current result.
    pub fn active_binding(&self) -> Option<&ViewportBinding> {
        self.current.as_ref()?.binding(self.active_viewport)
    }

    /// The last published result.
    pub fn current(&self) -> Option<Arc<MatchResult>> {
        self.current.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of results published so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the study source. Call
    /// [`on_study_set_changed`](Self::on_study_set_changed) afterwards.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Mutable access to the protocol store. Call
    /// [`on_protocols_changed`](Self::on_protocols_changed) afterwards.
    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    /// Mutable access to the resolver, e.g. to register derived attributes.
    pub fn resolver_mut(&mut self) -> &mut AttributeResolver {
        &mut self.resolver
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::attribute::{AttributeValue, Entity};
    use crate::constraint::Constraint;
    use crate::model::{Protocol, Series, Stage, Study, ViewportSlot, ViewportStructure};
    use crate::rule::Rule;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn protocols() -> Vec<Protocol> {
        vec![
            Protocol::new("followup", "Follow-up")
                .with_rule(Rule::protocol("timepointType", Constraint::equals("followup")).with_required(true))
                .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new())),
            Protocol::new("default", "Default")
                .with_stage(
                    Stage::new("1x2", ViewportStructure::grid(1, 2))
                        .with_slot(ViewportSlot::new())
                        .with_slot(ViewportSlot::new()),
                )
                .with_stage(Stage::new("1x1", ViewportStructure::grid(1, 1)).with_slot(ViewportSlot::new())),
        ]
    }

    fn study(id: &str) -> Study {
        Study::new(id)
            .with_series(Series::new(format!("{id}-a")))
            .with_series(Series::new(format!("{id}-b")))
    }

    #[test]
    fn test_starts_idle_without_studies() {
        let engine = ProtocolEngine::new(Vec::<Study>::new(), protocols(), EngineConfig::default()).expect("valid");
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.current().is_none());
        assert_eq!(engine.passes(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig::default()
            .with_matching(crate::matching::MatchingConfig::default().with_epsilon(0.0));
        let err = ProtocolEngine::new(Vec::<Study>::new(), protocols(), config).err();
        assert!(matches!(err, Some(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_default_is_reported() {
        let only = vec![protocols().remove(0)];
        let err = ProtocolEngine::new(vec![study("st")], only, EngineConfig::default()).err();
        assert!(matches!(err, Some(EngineError::MissingDefaultProtocol { .. })));
    }

    #[test]
    fn test_notifies_once_per_pass() {
        init_logging();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut engine = ProtocolEngine::new(Vec::<Study>::new(), protocols(), EngineConfig::default()).expect("valid");
        let sink = Rc::clone(&seen);
        engine.subscribe(move |result| sink.borrow_mut().push(result.map(|r| r.protocol_id.clone())));

        engine.source_mut().push(study("st"));
        engine.on_study_set_changed().expect("pass");
        engine.on_protocols_changed().expect("pass");

        let default = Some("default".to_string());
        assert_eq!(*seen.borrow(), vec![default.clone(), default]);
        assert_eq!(engine.passes(), 2);
        assert_eq!(engine.state(), EngineState::Applied);
    }

    #[test]
    fn test_manual_settle_coalesces() {
        let count = Rc::new(RefCell::new(0));
        let config = EngineConfig::default().with_auto_settle(false);
        let mut engine = ProtocolEngine::new(Vec::<Study>::new(), protocols(), config).expect("valid");
        let sink = Rc::clone(&count);
        engine.subscribe(move |_| *sink.borrow_mut() += 1);

        engine.source_mut().push(study("a"));
        engine.on_study_set_changed().expect("recorded");
        engine.source_mut().push(study("b"));
        engine.on_study_set_changed().expect("recorded");
        engine.on_rules_edited().expect("recorded");
        assert!(engine.is_pending());
        assert_eq!(*count.borrow(), 0);

        assert!(engine.settle().expect("pass"));
        assert!(!engine.settle().expect("nothing pending"));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_emptied_study_set_returns_to_idle() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut engine = ProtocolEngine::new(vec![study("st")], protocols(), EngineConfig::default()).expect("valid");
        assert_eq!(engine.state(), EngineState::Applied);
        let sink = Rc::clone(&seen);
        engine.subscribe(move |result| sink.borrow_mut().push(result.is_some()));

        engine.source_mut().clear();
        engine.on_study_set_changed().expect("pass");
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.current().is_none());
        assert_eq!(*seen.borrow(), vec![false]);

        // Already idle: nothing more to clear.
        engine.on_study_set_changed().expect("pass");
        assert_eq!(*seen.borrow(), vec![false]);
    }

    #[test]
    fn test_active_viewport_does_not_rematch() {
        let mut engine = ProtocolEngine::new(vec![study("st")], protocols(), EngineConfig::default()).expect("valid");
        let before = engine.current().expect("applied");
        engine.set_active_viewport(1);

        assert_eq!(engine.passes(), 1);
        let after = engine.current().expect("applied");
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(
            engine.active_binding().and_then(|b| b.target.as_ref()).map(|t| t.series_id.as_str()),
            Some("st-b")
        );
    }

    #[test]
    fn test_stage_navigation() {
        let mut engine = ProtocolEngine::new(vec![study("st")], protocols(), EngineConfig::default()).expect("valid");
        assert_eq!(engine.current().map(|c| c.stage_index), Some(0));

        assert!(engine.next_stage().expect("stage 1 exists"));
        assert_eq!(engine.current().map(|c| c.stage_index), Some(1));
        assert!(!engine.next_stage().expect("at last stage"));

        assert!(engine.previous_stage().expect("stage 0 exists"));
        assert_eq!(engine.current().map(|c| c.stage_index), Some(0));
        assert!(!engine.previous_stage().expect("at first stage"));

        let err = engine.set_stage(5).unwrap_err();
        assert!(matches!(err, EngineError::StageOutOfRange { .. }));
        assert_eq!(engine.state(), EngineState::Applied);
        assert_eq!(engine.passes(), 3);
    }

    #[test]
    fn test_reentrant_pass_refused() {
        let mut engine = ProtocolEngine::new(vec![study("st")], protocols(), EngineConfig::default()).expect("valid");
        engine.state = EngineState::Matching;
        engine.pending = true;
        assert!(matches!(engine.settle(), Err(EngineError::ReentrantPass)));
        assert!(matches!(engine.set_stage(0), Err(EngineError::ReentrantPass)));
    }

    #[test]
    fn test_derived_attribute_selects_protocol() {
        let mut engine = ProtocolEngine::new(vec![study("st")], protocols(), EngineConfig::default()).expect("valid");
        assert_eq!(engine.current().map(|c| c.protocol_id.clone()).as_deref(), Some("default"));

        engine.resolver_mut().register_fn("timepointType", |entity| match entity {
            Entity::Study(_) => Some(AttributeValue::from("followup")),
            _ => None,
        });
        engine.on_rules_edited().expect("pass");
        assert_eq!(engine.current().map(|c| c.protocol_id.clone()).as_deref(), Some("followup"));
    }

    #[test]
    fn test_failed_pass_keeps_previous_result() {
        init_logging();
        let mut engine = ProtocolEngine::new(vec![study("st")], protocols(), EngineConfig::default()).expect("valid");
        engine.store_mut().retain(|p| p.id != "default");
        let err = engine.on_protocols_changed().unwrap_err();

        assert!(matches!(err, EngineError::MissingDefaultProtocol { .. }));
        assert_eq!(engine.state(), EngineState::Applied);
        assert!(engine.current().is_some());
        assert!(engine.is_pending());
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut engine = ProtocolEngine::new(vec![study("st")], protocols(), EngineConfig::default()).expect("valid");
        let sink = Rc::clone(&count);
        let id = engine.subscribe(move |_| *sink.borrow_mut() += 1);
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));

        engine.on_study_set_changed().expect("pass");
        assert_eq!(*count.borrow(), 0);
    }
}
