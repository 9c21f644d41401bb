//! Error taxonomy of the client.
//!
//! Nothing here is fatal: the engine recovers locally (rollback or defer) and hands
//! these values back to the caller so the UI can show feedback or offer a retry.

use std::time::Duration;

use thiserror::Error;

use crate::model::{Attempt, ItemId};

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The server answered but refused the request (validation, not found, not authorized...).
    #[error("rejected by server ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Server-provided explanation, for callers that want to show e.g. "user not found".
    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::Rejected { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::Rejected { status: 404, .. })
    }
}

/// A remote call failed or timed out; the optimistic mutation it backed has been rolled back.
///
/// `attempt` carries everything needed to replay the operation through
/// [`Engine::retry`](crate::Engine::retry).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} failed: {source}", .attempt.operation())]
pub struct SyncError {
    pub attempt: Attempt,
    #[source]
    pub source: GatewayError,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Bad local input; never reaches the network.
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("no item with id {0}")]
    NotFound(ItemId),
    #[error("{0} is still being created")]
    Unconfirmed(ItemId),
}

impl SyncError {
    pub fn operation(&self) -> &'static str {
        self.attempt.operation()
    }
}

impl EngineError {
    pub fn as_sync(&self) -> Option<&SyncError> {
        match self {
            EngineError::Sync(err) => Some(err),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A refresh met a remote entity whose local copy has a mutation in flight.
/// The local version is kept; the next refresh after the call resolves reconciles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub id: ItemId,
    /// Owning task when the conflict is on a subtask.
    pub parent: Option<ItemId>,
}

impl std::fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "subtask {} of {} has a pending change", self.id, parent),
            None => write!(f, "task {} has a pending change", self.id),
        }
    }
}
