//! Error types for GBN operations.

use thiserror::Error;

use crate::graph::VertexId;

/// Errors that can occur while building, rewriting or evaluating a GBN.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GbnError {
    /// Structural invariant of the graph is violated (missing or duplicated
    /// predecessor, arity mismatch between a matrix and its wiring).
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Matrix width exceeds the number of places a bit assignment can hold.
    #[error("Dimension overflow: {n} x {m} exceeds the maximum of {max} places")]
    DimensionOverflow { n: usize, m: usize, max: usize },

    /// Serialized matrix could not be read.
    #[error("Malformed matrix at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Probability vector of a weighted choice does not sum to one.
    #[error("Probabilities do not add up to 1 (sum = {sum})")]
    ProbabilityMass { sum: f64 },

    /// Attempted to write into a read-only matrix variant.
    #[error("Unsupported mutation of read-only {kind} matrix")]
    UnsupportedMutation { kind: &'static str },

    /// Vertex id is unknown or was removed.
    #[error("Vertex {0} not found")]
    VertexNotFound(VertexId),

    /// No edge connects the given ports.
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// Filter/diagonal chain feeds back into itself.
    #[error("Cyclic filter chain through vertex {0}")]
    CyclicDependency(VertexId),

    /// Invalid argument passed to a graph operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GbnError {
    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result type for GBN operations.
pub type Result<T> = std::result::Result<T, GbnError>;
