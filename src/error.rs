//! Error taxonomy for the debate engine.
//!
//! Local recovery is preferred over propagation: transient agent faults are
//! retried inside a round, and a debate only moves to `failed` when no
//! further progress is possible.

use thiserror::Error;

/// Everything that can go wrong across the debate surface.
#[derive(Debug, Error)]
pub enum DebateError {
    /// Caller input rejected before any work happened. Not retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Agent call failed in a retryable way (network, timeout, throttling).
    #[error("agent call failed transiently: {0}")]
    AgentTransient(String),

    /// Agent refused the content. Never retried; the turn is skipped.
    #[error("agent rejected content: {0}")]
    AgentContentRejected(String),

    /// Caller is not the owner of the debate. No partial data is returned.
    #[error("debate {0} does not belong to the caller")]
    OwnershipViolation(String),

    /// A round loop is already running for this debate id.
    #[error("debate {0} already has a running round loop")]
    ConcurrentStartConflict(String),

    /// The loop cannot make progress (e.g. zero experts responded).
    #[error("orchestrator fault: {0}")]
    OrchestratorFatal(String),

    #[error("debate {0} not found")]
    NotFound(String),

    /// Command not valid for the debate's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DebateError>;
