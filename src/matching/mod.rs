//! Protocol matching: scores every protocol against the loaded study
//! set, selects the best eligible one (or the default) and chooses its
//! active stage.

mod config;
mod engine;
mod stage;

pub use config::{MatchingConfig, StagePolicy};
pub use engine::{ProtocolMatch, ProtocolMatcher, ProtocolSelection};
pub use stage::select_stage;
