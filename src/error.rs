//! Error handling module for PyDSL
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Faults raised by executed programs are NOT errors in this sense: they travel
//! back to the caller as [`crate::types::ExecutionFault`] values. The types here
//! cover everything that prevents an invocation from being attempted at all.

use thiserror::Error;

use crate::models::{CollectionId, FragmentId};

/// Reasons an invocation request cannot be turned into a program.
///
/// Always detected before dispatch; a request that fails assembly never
/// reaches a worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Entry point is not an ASCII identifier
    #[error("entry point {0:?} is not a valid identifier")]
    InvalidEntryPoint(String),

    /// Entry point is a hard keyword of the target language
    #[error("entry point {0:?} is a reserved keyword")]
    ReservedEntryPoint(String),

    /// Argument value outside the transport-safe model
    #[error("value at {path} cannot be embedded as a literal: {reason}")]
    UnrepresentableValue { path: String, reason: &'static str },

    /// Argument value nested deeper than the configured limit
    #[error("value at {path} exceeds the maximum nesting depth of {max}")]
    NestingTooDeep { path: String, max: usize },
}

/// Main error type for PyDSL
#[derive(Error, Debug)]
pub enum PyDslError {
    /// Request could not be assembled into a program
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// The worker pool was shut down before the submission got a worker
    #[error("Worker pool is closed")]
    PoolClosed,

    /// A worker process could not be started
    #[error("Failed to spawn worker: {0}")]
    WorkerSpawn(String),

    /// Collection lookup failed
    #[error("Collection \"{0}\" not found")]
    CollectionNotFound(CollectionId),

    /// Fragment lookup failed
    #[error("Fragment \"{0}\" not found")]
    FragmentNotFound(FragmentId),

    /// Validation errors (titles, fragment sources, paging)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors (pool sizing, interpreter)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for PyDSL operations
pub type Result<T> = std::result::Result<T, PyDslError>;

// Convenient error constructors
impl PyDslError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a worker spawn error
    pub fn worker_spawn(msg: impl Into<String>) -> Self {
        Self::WorkerSpawn(msg.into())
    }

    /// True when the caller is at fault (bad request) rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Assembly(_)
                | Self::Validation(_)
                | Self::CollectionNotFound(_)
                | Self::FragmentNotFound(_)
        )
    }
}
