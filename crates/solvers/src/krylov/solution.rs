use rewind_core::{SolveError, Vector};

/// Indicates how the solver terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The result of a Krylov solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Final solver status.
    pub status: Status,

    /// The final iterate.
    pub x: Vector,

    /// Residual norm at the final iterate.
    pub residual: f64,

    /// Iteration count when the solver finished.
    pub iters: usize,
}

impl Solution {
    /// Returns the iterate if the solve converged.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::NotConverged`] for any other status.
    pub fn into_result(self) -> Result<Vector, SolveError> {
        match self.status {
            Status::Converged => Ok(self.x),
            Status::MaxIters | Status::StoppedByObserver => Err(SolveError::NotConverged {
                iters: self.iters,
                residual: self.residual,
            }),
        }
    }
}
