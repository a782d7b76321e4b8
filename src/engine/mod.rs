//! The protocol engine: pipeline and orchestrator.
//!
//! [`MatchingPipeline`] is the pure computation: studies and protocols in,
//! a [`MatchResult`] out. [`ProtocolEngine`] wraps it with state, trigger
//! hooks, stage navigation and change notification.

mod config;
mod orchestrator;
mod pipeline;
mod source;

pub use config::EngineConfig;
pub use orchestrator::{EngineState, ProtocolEngine, SubscriberId};
pub use pipeline::{MatchResult, MatchingPipeline};
pub use source::{ProtocolStore, StudySource};
