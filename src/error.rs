//! Error types for ODE integration.

use std::fmt;

/// Result type for integration operations.
pub type OdeResult<T> = Result<T, OdeError>;

/// Errors that can occur while setting up or running an integration.
#[derive(Debug, Clone)]
pub enum OdeError {
    /// The integration interval is too small to resolve.
    ///
    /// `integrate` requires the span between the initial and target times to
    /// exceed 1000 ulps of the larger of the two, otherwise adaptive step
    /// control cannot do anything meaningful.
    TooSmallInterval { dt: f64, threshold: f64 },

    /// An array does not have the dimension the equations settings require.
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    /// An equation index is outside the registered range.
    IndexOutOfRange { index: usize, max: usize },

    /// The budget of right-hand-side evaluations was exhausted.
    MaxEvaluationsExceeded { max: usize },

    /// Maximum number of steps exceeded.
    MaxStepsExceeded { steps: usize, t: f64 },

    /// Step size became too small during adaptive integration.
    StepSizeTooSmall { step: f64, t: f64 },

    /// A root finding bracket has the same sign at both endpoints.
    SameSignBracket { a: f64, b: f64, ga: f64, gb: f64 },

    /// A root finder did not converge within its iteration budget.
    DidNotConverge {
        iterations: usize,
        tolerance: f64,
        context: String,
    },

    /// A user callback reported a failure.
    ///
    /// The engine performs no recovery; the error surfaces unchanged to the
    /// caller of `integrate`.
    UserCallback { context: String },
}

impl fmt::Display for OdeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmallInterval { dt, threshold } => {
                write!(
                    f,
                    "integration interval {:.3e} is below the resolvable threshold {:.3e}",
                    dt, threshold
                )
            }
            Self::DimensionMismatch {
                expected,
                actual,
                context,
            } => {
                write!(
                    f,
                    "{}: dimension mismatch, expected {} but got {}",
                    context, expected, actual
                )
            }
            Self::IndexOutOfRange { index, max } => {
                write!(f, "equation index {} out of range [0, {}]", index, max)
            }
            Self::MaxEvaluationsExceeded { max } => {
                write!(f, "maximum number of evaluations ({}) exceeded", max)
            }
            Self::MaxStepsExceeded { steps, t } => {
                write!(f, "exceeded maximum {} steps at t = {:.6}", steps, t)
            }
            Self::StepSizeTooSmall { step, t } => {
                write!(f, "step size {:.2e} too small at t = {:.6}", step, t)
            }
            Self::SameSignBracket { a, b, ga, gb } => {
                write!(
                    f,
                    "root not bracketed: g({}) = {:.3e}, g({}) = {:.3e} (same sign)",
                    a, ga, b, gb
                )
            }
            Self::DidNotConverge {
                iterations,
                tolerance,
                context,
            } => {
                write!(
                    f,
                    "{}: did not converge after {} iterations (tolerance: {:.2e})",
                    context, iterations, tolerance
                )
            }
            Self::UserCallback { context } => {
                write!(f, "user callback failed: {}", context)
            }
        }
    }
}

impl std::error::Error for OdeError {}
