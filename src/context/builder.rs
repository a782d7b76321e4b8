//! Candidate lists for one matching pass.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::attribute::{AttributeValue, Entity};
use crate::model::{Image, Series, Study};

/// Identifies a series within the loaded study set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub study_id: String,
    pub series_id: String,
}

/// A series candidate with its images in default order.
#[derive(Debug, Clone)]
pub struct SeriesCandidate<'a> {
    pub key: SeriesKey,
    pub series: &'a Series,
    pub images: Vec<&'a Image>,
}

/// A study candidate with its series in default order.
#[derive(Debug, Clone)]
pub struct StudyCandidate<'a> {
    /// Position in the loaded study set.
    pub load_index: usize,
    pub study: &'a Study,
    /// `StudyDate` + `StudyTime`, if parseable.
    pub recency: Option<NaiveDateTime>,
    pub series: Vec<SeriesCandidate<'a>>,
}

/// Ordered candidate lists built from the loaded study set.
///
/// Studies keep load order. Series are ordered by `SeriesNumber` and
/// images by `InstanceNumber`, ascending and stable on load order, with
/// unnumbered entries last.
#[derive(Debug, Clone)]
pub struct MatchingContext<'a> {
    studies: &'a [Study],
    candidates: Vec<StudyCandidate<'a>>,
}

impl<'a> MatchingContext<'a> {
    pub fn build(studies: &'a [Study]) -> Self {
        let candidates = studies
            .iter()
            .enumerate()
            .map(|(load_index, study)| StudyCandidate {
                load_index,
                study,
                recency: study_recency(study),
                series: ordered_series(study),
            })
            .collect::<Vec<_>>();

        log::debug!(
            "matching context: {} studies, {} series",
            candidates.len(),
            candidates.iter().map(|c| c.series.len()).sum::<usize>()
        );

        Self { studies, candidates }
    }

    /// The whole study set, as seen by protocol-level rules.
    pub fn study_set(&self) -> Entity<'a> {
        Entity::StudySet(self.studies)
    }

    pub fn studies(&self) -> &[StudyCandidate<'a>] {
        &self.candidates
    }

    /// Number of series across all studies.
    pub fn distinct_series_count(&self) -> usize {
        self.candidates.iter().map(|c| c.series.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn ordered_series(study: &Study) -> Vec<SeriesCandidate<'_>> {
    let mut series: Vec<&Series> = study.series.iter().collect();
    series.sort_by_key(|s| {
        ordering_key(
            s.attribute("SeriesNumber")
                .or_else(|| s.first_image().and_then(|i| i.attribute("SeriesNumber"))),
        )
    });

    series
        .into_iter()
        .map(|series| {
            let mut images: Vec<&Image> = series.images.iter().collect();
            images.sort_by_key(|i| ordering_key(i.attribute("InstanceNumber")));
            SeriesCandidate {
                key: SeriesKey {
                    study_id: study.id.clone(),
                    series_id: series.id.clone(),
                },
                series,
                images,
            }
        })
        .collect()
}

/// Sort key placing numbered entries first, ascending; unnumbered last.
fn ordering_key(value: Option<&AttributeValue>) -> (bool, i64) {
    match value.and_then(AttributeValue::as_number) {
        Some(n) if n.is_finite() => (false, n.round() as i64),
        _ => (true, 0),
    }
}

fn digits(value: &AttributeValue) -> String {
    value.to_text().chars().filter(char::is_ascii_digit).collect()
}

/// Parses DICOM `StudyDate` (`YYYYMMDD`) and `StudyTime` (`HHMMSS[.frac]`).
fn study_recency(study: &Study) -> Option<NaiveDateTime> {
    let lookup = |name| {
        study
            .attribute(name)
            .or_else(|| study.first_image().and_then(|i| i.attribute(name)))
    };

    let date = NaiveDate::parse_from_str(&digits(lookup("StudyDate")?), "%Y%m%d").ok()?;
    let time = lookup("StudyTime")
        .and_then(|value| {
            let text = value.to_text();
            let whole = text.split('.').next().unwrap_or_default();
            let mut hhmmss: String = whole.chars().filter(char::is_ascii_digit).collect();
            if hhmmss.is_empty() {
                return None;
            }
            while hhmmss.len() < 6 {
                hhmmss.push('0');
            }
            NaiveTime::parse_from_str(&hhmmss[..6], "%H%M%S").ok()
        })
        .unwrap_or(NaiveTime::MIN);

    Some(date.and_time(time))
}
