//! Errors surfaced to the caller.
//!
//! Only broken deployments and contract violations become an
//! [`EngineError`]. Data conditions (an attribute that cannot be resolved,
//! a protocol whose required rules fail, a viewport slot with no
//! candidate) are reported inside the match results instead.

use thiserror::Error;

/// Errors returned by the matching pipeline and the orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configured default protocol is not in the protocol store.
    #[error("default protocol `{id}` is missing from the protocol store")]
    MissingDefaultProtocol { id: String },

    /// The default protocol exists but can never be applied.
    #[error("default protocol `{id}` is malformed: {reason}")]
    MalformedDefaultProtocol { id: String, reason: String },

    /// A configuration object failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A protocol index does not exist in the protocol store.
    #[error("protocol index {index} is out of range ({protocols} protocols)")]
    ProtocolOutOfRange { index: usize, protocols: usize },

    /// A stage index does not exist in the protocol.
    #[error("stage index {index} is out of range for protocol `{protocol_id}` ({stages} stages)")]
    StageOutOfRange {
        protocol_id: String,
        index: usize,
        stages: usize,
    },

    /// A matching pass was requested while another one was running.
    #[error("a matching pass is already in progress")]
    ReentrantPass,

    /// A protocol or study document could not be parsed.
    #[cfg(feature = "serde")]
    #[error("invalid document: {0}")]
    Document(#[from] serde_json::Error),
}
