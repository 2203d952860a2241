//! Error type shared across the crate.
//!
//! All fallible constructors and operator entry points report one of the
//! variants below; nothing is retried internally.

use thiserror::Error;

/// Error type for fluid-queue model construction and generator operations.
#[derive(Debug, Error)]
pub enum FluidQueueError {
    /// Operand or block dimensions are inconsistent.
    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// What was being sized (block, vector, operand).
        what: &'static str,
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        got: usize,
    },

    /// An index exceeds the bounds of the entity it addresses.
    #[error("{what} index {index} out of range (limit {limit})")]
    OutOfRange {
        /// Which index space (phase, cell, basis, row, col, axis).
        what: &'static str,
        /// Offending index.
        index: usize,
        /// Exclusive upper bound.
        limit: usize,
    },

    /// An index labelled as boundary refers to a non-member phase, or an
    /// interior index was used where a boundary index is required.
    #[error("invalid boundary reference: {0}")]
    InvalidBoundary(String),

    /// The mesh scheme has no lazy-generator construction.
    #[error("unsupported mesh scheme: {0}")]
    Unsupported(&'static str),

    /// Structural violation (non-positive cell width, bad row sums, ...).
    #[error("domain error: {0}")]
    Domain(String),
}
