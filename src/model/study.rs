//! Study, series and image metadata records.
//!
//! Records are owned by the external metadata source and handed to the
//! engine as a read-only snapshot. Nesting expresses ownership: a series
//! belongs to exactly one study and an image to exactly one series.

use crate::attribute::{find_attribute, AttributeMap, AttributeValue};

/// A single image (DICOM instance).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Image {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: AttributeMap,
}

impl Image {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: AttributeMap::new(),
        }
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Direct attribute lookup (no derived or inherited values).
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        find_attribute(&self.attributes, name)
    }
}

/// A series: an ordered set of images plus series-level attributes.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Series {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: AttributeMap,
    #[cfg_attr(feature = "serde", serde(default))]
    pub images: Vec<Image>,
}

impl Series {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: AttributeMap::new(),
            images: Vec::new(),
        }
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Appends an image.
    pub fn with_image(mut self, image: Image) -> Self {
        self.images.push(image);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        find_attribute(&self.attributes, name)
    }

    /// First image in load order.
    pub fn first_image(&self) -> Option<&Image> {
        self.images.first()
    }
}

/// A study: an ordered set of series plus patient/study-level attributes.
///
/// Studies are immutable once loaded. A reload replaces the whole record.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Study {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: AttributeMap,
    #[cfg_attr(feature = "serde", serde(default))]
    pub series: Vec<Series>,
}

impl Study {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: AttributeMap::new(),
            series: Vec::new(),
        }
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Appends a series.
    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        find_attribute(&self.attributes, name)
    }

    /// First image of the first series that has one.
    pub fn first_image(&self) -> Option<&Image> {
        self.series.iter().find_map(Series::first_image)
    }

    /// Total number of images across all series.
    pub fn image_count(&self) -> usize {
        self.series.iter().map(|s| s.images.len()).sum()
    }

    /// Parses a study list from a JSON array.
    #[cfg(feature = "serde")]
    pub fn list_from_json(json: &str) -> Result<Vec<Study>, crate::error::EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}
