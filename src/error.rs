//! Error taxonomy for the effect-stack model.
//!
//! Precondition violations and bad arguments are rejected before anything
//! observable is mutated; `ServiceUnavailable` in the middle of a multi-step
//! graph sync triggers a rollback of the steps already performed.

use thiserror::Error;

use crate::entities::tree::NodeId;

/// Model-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("node {0} is not registered in the model")]
    NotFound(NodeId),

    #[error("unknown effect kind: {0}")]
    UnknownKind(String),

    #[error("node {0} already has a live parent")]
    AlreadyParented(NodeId),

    #[error("node {0} is an ancestor of the target, append would create a cycle")]
    CycleRejected(NodeId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("detached payload outlived the model state it refers to")]
    DanglingModelReference,

    #[error("render service is gone or rejected the operation")]
    ServiceUnavailable,
}

pub type ModelResult<T> = Result<T, ModelError>;
