//! Orchestrator error taxonomy.

use foundry_sdk::client::RemoteError;
use foundry_sdk::types::ResourceId;

use crate::sequencer::SequencerError;

/// Remote operation names used in timeout reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Create,
    Delete,
    Get,
    Relocate,
    List,
}

impl std::fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteOp::Create => write!(f, "create"),
            RemoteOp::Delete => write!(f, "delete"),
            RemoteOp::Get => write!(f, "get"),
            RemoteOp::Relocate => write!(f, "relocate"),
            RemoteOp::List => write!(f, "list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a factory named {name:?} already exists")]
    DuplicateFactory { name: String },
    #[error("no factory registered under {0}")]
    UnknownFactory(ResourceId),
    #[error("no factory matches {name:?}")]
    FactoryNotFound { name: String },
    #[error("invalid factory name {0:?}")]
    InvalidName(String),
    #[error("remote create of {name:?} failed: {source}")]
    RemoteCreateFailed { name: String, source: RemoteError },
    #[error("remote delete of {id} failed: {source}")]
    RemoteDeleteFailed { id: ResourceId, source: RemoteError },
    #[error("moving member into {id} failed: {source}")]
    RemoteMoveFailed { id: ResourceId, source: RemoteError },
    #[error("remote {op} timed out after {after_ms}ms")]
    RemoteTimeout { op: RemoteOp, after_ms: u64 },
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// The remote call never answered within the configured bound.
    pub fn is_timeout(&self) -> bool {
        matches!(self, OrchestratorError::RemoteTimeout { .. })
    }
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
