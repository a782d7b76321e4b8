//! Matching context: the ordered candidate lists of one pass.

mod builder;

pub use builder::{MatchingContext, SeriesCandidate, SeriesKey, StudyCandidate};
