use thiserror::Error;

use rewind_core::SolveError;

/// Errors that can occur during a Krylov solve.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Error {
    /// A denominator in the recurrence vanished.
    #[error("breakdown at iteration {iter}")]
    Breakdown { iter: usize },

    /// The residual stopped being finite.
    #[error("non-finite residual at iteration {iter}")]
    NonFinite { iter: usize },

    /// The right-hand side and initial guess have different lengths.
    #[error("right-hand side has length {found}, expected {expected}")]
    Shape { expected: usize, found: usize },
}

impl From<Error> for SolveError {
    fn from(err: Error) -> Self {
        match err {
            Error::Breakdown { iter } => Self::Breakdown { iter },
            Error::NonFinite { iter } => Self::NonFinite { iter },
            Error::Shape { expected, found } => Self::Shape { expected, found },
        }
    }
}
