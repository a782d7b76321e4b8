//! Attribute access for rule evaluation.
//!
//! Rules name attributes (`Modality`, `SeriesDescription`,
//! `numberOfImages`, ...) and the [`AttributeResolver`] turns a name plus an
//! [`Entity`] into an [`AttributeValue`]. Direct attributes come from the
//! record's attribute bag; derived attributes are computed by callbacks
//! registered on the resolver.
//!
//! Resolution never fails. An attribute that cannot be found resolves to
//! `None`, and the constraint evaluating it fails.

mod resolver;
mod value;

pub use resolver::{AttributeResolver, DerivedAttribute, Entity};
pub use value::{find_attribute, AttributeMap, AttributeValue};
