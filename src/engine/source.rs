//! Collaborators supplying studies and protocols.

use crate::model::{Protocol, Study};

/// Read-only snapshot of the currently loaded studies.
pub trait StudySource {
    /// Loaded studies, in load order.
    fn studies(&self) -> &[Study];
}

/// Ordered list of protocol documents.
///
/// Declaration order matters: it breaks score ties between protocols.
pub trait ProtocolStore {
    fn protocols(&self) -> &[Protocol];
}

impl StudySource for Vec<Study> {
    fn studies(&self) -> &[Study] {
        self
    }
}

impl ProtocolStore for Vec<Protocol> {
    fn protocols(&self) -> &[Protocol] {
        self
    }
}
