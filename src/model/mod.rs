//! Data model: loaded study metadata and protocol documents.

mod protocol;
mod study;

pub use protocol::{Protocol, Stage, StageActivation, ViewportSettings, ViewportSlot, ViewportStructure};
pub use study::{Image, Series, Study};
