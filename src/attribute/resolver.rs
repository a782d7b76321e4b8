//! Attribute resolution over studies, series, images and the study set.

use std::collections::{BTreeSet, HashMap};

use super::value::{find_attribute, AttributeValue};
use crate::model::{Image, Series, Study};

/// Something rules can be evaluated against.
///
/// Protocol-level rules see the whole loaded study set; study, series and
/// image rules see one record each.
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    StudySet(&'a [Study]),
    Study(&'a Study),
    Series(&'a Series),
    Image(&'a Image),
}

impl<'a> Entity<'a> {
    /// Short label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::StudySet(_) => "study set",
            Entity::Study(_) => "study",
            Entity::Series(_) => "series",
            Entity::Image(_) => "image",
        }
    }

    fn direct(&self, name: &str) -> Option<&'a AttributeValue> {
        match *self {
            Entity::StudySet(_) => None,
            Entity::Study(study) => find_attribute(&study.attributes, name),
            Entity::Series(series) => find_attribute(&series.attributes, name),
            Entity::Image(image) => find_attribute(&image.attributes, name),
        }
    }

    /// The entity an unresolved lookup falls back to.
    ///
    /// The study set inherits from its first (active) study. Studies and
    /// series inherit from their first image, which in DICOM carries the
    /// attributes of every level.
    fn parent_fallback(&self) -> Option<Entity<'a>> {
        match *self {
            Entity::StudySet(studies) => studies.first().map(Entity::Study),
            Entity::Study(study) => study.first_image().map(Entity::Image),
            Entity::Series(series) => series.first_image().map(Entity::Image),
            Entity::Image(_) => None,
        }
    }
}

/// A computed attribute, registered by name.
///
/// # Examples
///
/// ```
/// use hanging_protocol::attribute::{AttributeResolver, AttributeValue, Entity};
/// use hanging_protocol::model::Study;
///
/// let mut resolver = AttributeResolver::new();
/// resolver.register_fn("timepointType", |entity| match entity {
///     Entity::Study(study) if study.id.ends_with(".prior") => Some("followup".into()),
///     Entity::Study(_) => Some("baseline".into()),
///     _ => None,
/// });
///
/// let study = Study::new("1.2.3");
/// assert_eq!(
///     resolver.resolve(Entity::Study(&study), "timepointType"),
///     Some(AttributeValue::from("baseline"))
/// );
/// ```
pub trait DerivedAttribute: Send + Sync {
    /// Computes the attribute for `entity`, or `None` if it does not apply.
    fn resolve(&self, entity: Entity<'_>) -> Option<AttributeValue>;
}

impl<F> DerivedAttribute for F
where
    F: Fn(Entity<'_>) -> Option<AttributeValue> + Send + Sync,
{
    fn resolve(&self, entity: Entity<'_>) -> Option<AttributeValue> {
        self(entity)
    }
}

/// Resolves named attributes, including derived ones.
///
/// Resolution order for `resolve(entity, name)`:
///
/// 1. the entity's own attribute bag (exact, then case-insensitive key),
/// 2. a derived attribute registered under `name`,
/// 3. the same two steps on the fallback entity (see [`Entity`]).
///
/// Unresolvable attributes yield `None`; resolution never fails.
pub struct AttributeResolver {
    derived: HashMap<String, Box<dyn DerivedAttribute>>,
}

impl AttributeResolver {
    /// Creates a resolver with the built-in derived attributes.
    ///
    /// Built-ins: `numberOfStudies`, `numberOfSeries`, `numberOfImages`
    /// (alias `numImages`) and `modalitiesInStudy`.
    pub fn new() -> Self {
        let mut resolver = Self::empty();
        resolver.register_fn("numberOfStudies", number_of_studies);
        resolver.register_fn("numberOfSeries", number_of_series);
        resolver.register_fn("numberOfImages", number_of_images);
        resolver.register_fn("numImages", number_of_images);
        resolver.register_fn("modalitiesInStudy", modalities_in_study);
        resolver
    }

    /// Creates a resolver with no derived attributes.
    pub fn empty() -> Self {
        Self {
            derived: HashMap::new(),
        }
    }

    /// Registers (or replaces) a derived attribute.
    pub fn register<D: DerivedAttribute + 'static>(&mut self, name: impl Into<String>, attribute: D) {
        let name = name.into();
        log::debug!("registering derived attribute `{name}`");
        self.derived.insert(name, Box::new(attribute));
    }

    /// Registers a closure as a derived attribute.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Entity<'_>) -> Option<AttributeValue> + Send + Sync + 'static,
    {
        self.register(name, f);
    }

    /// Returns `true` if a derived attribute is registered under `name`.
    pub fn is_derived(&self, name: &str) -> bool {
        self.derived.contains_key(name)
    }

    /// Names of all registered derived attributes, sorted.
    pub fn derived_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.derived.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolves `name` on `entity`.
    pub fn resolve(&self, entity: Entity<'_>, name: &str) -> Option<AttributeValue> {
        let mut current = Some(entity);
        while let Some(entity) = current {
            if let Some(value) = entity.direct(name) {
                return Some(value.clone());
            }
            if let Some(value) = self.derived.get(name).and_then(|d| d.resolve(entity)) {
                return Some(value);
            }
            current = entity.parent_fallback();
        }
        None
    }
}

impl Default for AttributeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AttributeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeResolver")
            .field("derived", &self.derived_names())
            .finish()
    }
}

fn number_of_studies(entity: Entity<'_>) -> Option<AttributeValue> {
    match entity {
        Entity::StudySet(studies) => Some(studies.len().into()),
        _ => None,
    }
}

fn number_of_series(entity: Entity<'_>) -> Option<AttributeValue> {
    match entity {
        Entity::StudySet(studies) => Some(studies.iter().map(|s| s.series.len()).sum::<usize>().into()),
        Entity::Study(study) => Some(study.series.len().into()),
        _ => None,
    }
}

fn number_of_images(entity: Entity<'_>) -> Option<AttributeValue> {
    match entity {
        Entity::StudySet(studies) => Some(studies.iter().map(Study::image_count).sum::<usize>().into()),
        Entity::Study(study) => Some(study.image_count().into()),
        Entity::Series(series) => Some(series.images.len().into()),
        Entity::Image(_) => None,
    }
}

fn modalities_in_study(entity: Entity<'_>) -> Option<AttributeValue> {
    let Entity::Study(study) = entity else {
        return None;
    };
    let modalities: BTreeSet<String> = study
        .series
        .iter()
        .filter_map(|series| {
            series
                .attribute("Modality")
                .or_else(|| series.first_image().and_then(|i| i.attribute("Modality")))
        })
        .map(|value| value.to_text().trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    Some(AttributeValue::List(
        modalities.into_iter().map(AttributeValue::Text).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Image, Series, Study};

    fn studies() -> Vec<Study> {
        vec![
            Study::new("st1")
                .with_attribute("timepointType", "baseline")
                .with_series(
                    Series::new("ct")
                        .with_attribute("Modality", "CT")
                        .with_image(Image::new("i1").with_attribute("SliceThickness", 1.25))
                        .with_image(Image::new("i2")),
                )
                .with_series(Series::new("mr").with_attribute("Modality", "MR")),
            Study::new("st2"),
        ]
    }

    #[test]
    fn test_direct_lookup() {
        let studies = studies();
        let resolver = AttributeResolver::new();
        assert_eq!(
            resolver.resolve(Entity::Study(&studies[0]), "timepointType"),
            Some(AttributeValue::from("baseline"))
        );
    }

    #[test]
    fn test_unresolvable_is_none() {
        let studies = studies();
        let resolver = AttributeResolver::new();
        assert_eq!(resolver.resolve(Entity::Study(&studies[1]), "Modality"), None);
        assert_eq!(resolver.resolve(Entity::StudySet(&[]), "timepointType"), None);
    }

    #[test]
    fn test_builtin_counts() {
        let studies = studies();
        let resolver = AttributeResolver::new();
        let set = Entity::StudySet(&studies);
        assert_eq!(resolver.resolve(set, "numberOfStudies"), Some(AttributeValue::from(2usize)));
        assert_eq!(resolver.resolve(set, "numberOfSeries"), Some(AttributeValue::from(2usize)));
        assert_eq!(resolver.resolve(set, "numberOfImages"), Some(AttributeValue::from(2usize)));

        let series = Entity::Series(&studies[0].series[0]);
        assert_eq!(resolver.resolve(series, "numImages"), Some(AttributeValue::from(2usize)));
    }

    #[test]
    fn test_modalities_in_study() {
        let studies = studies();
        let resolver = AttributeResolver::new();
        let value = resolver
            .resolve(Entity::Study(&studies[0]), "modalitiesInStudy")
            .expect("derived value");
        assert_eq!(value.to_text(), "CT\\MR");
    }

    #[test]
    fn test_study_set_inherits_from_first_study() {
        let studies = studies();
        let resolver = AttributeResolver::new();
        assert_eq!(
            resolver.resolve(Entity::StudySet(&studies), "timepointType"),
            Some(AttributeValue::from("baseline"))
        );
    }

    #[test]
    fn test_series_inherits_from_first_image() {
        let studies = studies();
        let resolver = AttributeResolver::new();
        assert_eq!(
            resolver.resolve(Entity::Series(&studies[0].series[0]), "SliceThickness"),
            Some(AttributeValue::from(1.25))
        );
        assert_eq!(
            resolver.resolve(Entity::Study(&studies[0]), "SliceThickness"),
            Some(AttributeValue::from(1.25))
        );
    }

    #[test]
    fn test_direct_attribute_wins_over_derived() {
        let studies = studies();
        let mut resolver = AttributeResolver::new();
        resolver.register_fn("timepointType", |_entity| Some("followup".into()));

        assert_eq!(
            resolver.resolve(Entity::Study(&studies[0]), "timepointType"),
            Some(AttributeValue::from("baseline"))
        );
        assert_eq!(
            resolver.resolve(Entity::Study(&studies[1]), "timepointType"),
            Some(AttributeValue::from("followup"))
        );
    }

    #[test]
    fn test_empty_resolver_has_no_builtins() {
        let studies = studies();
        let resolver = AttributeResolver::empty();
        assert!(resolver.derived_names().is_empty());
        assert_eq!(resolver.resolve(Entity::StudySet(&studies), "numberOfStudies"), None);
    }
}
