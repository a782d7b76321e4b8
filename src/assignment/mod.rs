//! Stage and viewport assignment.
//!
//! For the chosen stage, every declared slot is bound to a study, a
//! series and a representative image, or reported unbound.

mod engine;
mod types;

pub use engine::ViewportAssigner;
pub use types::{BindingTarget, CandidateScore, SlotMatch, StageAssignment, UnboundReason, ViewportBinding};
