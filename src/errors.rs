//! Errors returned by the estimator and its builders.

use thiserror::Error;

/// Enum for errors in this crate
#[derive(Error, Debug)]
pub enum UwhamError {
    /// Error returned when UwhamBuilder.build() was called improperly
    #[error("Could not build Uwham: {0}")]
    BuilderError(String),

    /// Error returned when an array is the wrong length
    #[error("Array of length {0} is incorrect; length should be {1}")]
    ArrayLengthMismatch(usize, usize),

    /// Error returned when the inputs are inconsistent with each other
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Error returned when the requested baseline is not a state index
    #[error("Baseline state {0} is out of range for {1} states")]
    BaselineOutOfRange(usize, usize),

    /// Error returned when the requested baseline state has no samples
    #[error("Observations from baseline state {0} are required")]
    UnsampledBaseline(usize),

    /// Error returned when a linear system in the variance estimate cannot be solved
    #[error("Linear system {0} is numerically singular")]
    Singular(&'static str),

    /// Error returned when the objective is not finite at the initial guess
    #[error("Objective is not finite at the initial free energies")]
    NonFiniteObjective,

    /// Error returned when variances were requested from a fit that did not compute them
    #[error("Variances were not computed for this fit")]
    VarianceNotComputed,
}

impl From<String> for UwhamError {
    fn from(s: String) -> Self {
        Self::BuilderError(s)
    }
}

/// Result type for the uwham-rs crate
pub type Result<T> = std::result::Result<T, UwhamError>;
