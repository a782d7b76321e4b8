//! Hanging protocol matching engine.
//!
//! Given the loaded imaging studies (with nested series and image
//! metadata) and a catalog of declarative layout templates ("protocols"),
//! decides which protocol and stage best fit the data and binds concrete
//! studies, series and images to the stage's viewport slots.
//!
//! - **Attributes**: resolves named attributes on studies, series, images
//!   and the whole study set, including registered derived attributes.
//! - **Constraints**: typed comparisons returning pass/fail and a
//!   normalized score in `[0, 1]`.
//! - **Rules**: attribute + constraint + weight + required flag, with hard
//!   veto semantics for failing required rules.
//! - **Matching**: scores every protocol, selects the best eligible one
//!   (declaration order breaks ties) or the mandatory default, and picks
//!   its stage.
//! - **Assignment**: binds each viewport slot in order; series are never
//!   shared between slots, studies may be.
//! - **Engine**: the orchestrator that reacts to study and protocol
//!   changes and publishes each result exactly once.
//!
//! # Architecture
//!
//! Matching is a pure, synchronous computation over in-memory metadata.
//! Study loading, protocol persistence and rendering belong to the host;
//! they reach the engine through [`engine::StudySource`],
//! [`engine::ProtocolStore`] and result subscriptions.

pub mod assignment;
pub mod attribute;
pub mod constraint;
pub mod context;
pub mod engine;
pub mod error;
pub mod matching;
pub mod model;
pub mod rule;

pub use error::EngineError;
