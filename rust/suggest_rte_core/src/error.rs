//! Error types for the suggestion engine.

use std::sync::Arc;

use thiserror::Error;

use crate::doc::NodeKey;
use crate::store::StoreError;

/// Errors raised by tree operations and builders.
///
/// Builders report a missing precondition by returning `Ok(false)`; an `Err`
/// means the tree and the builder disagree about what is there.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Node key is not present in the arena.
    #[error("node not found: {0}")]
    NodeNotFound(NodeKey),

    /// Node exists but is the wrong kind for the requested operation.
    #[error("invalid target {key}: expected {expected}")]
    InvalidTarget { key: NodeKey, expected: &'static str },

    /// The builder produced a tree it cannot have produced.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("thread store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Sink for errors that are reported and then swallowed.
///
/// Thread-store failures must never block editing, so the engine hands them
/// here instead of returning them.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &EngineError);
}

/// Default reporter: logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &EngineError) {
        tracing::error!(context, %error, "suggestion engine error");
    }
}

pub type SharedReporter = Arc<dyn ErrorReporter>;
