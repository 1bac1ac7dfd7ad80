use std::fmt;

/// Event emitted by a Krylov solver after each iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// The iteration number, starting at 1.
    pub iter: usize,

    /// Norm of the residual `b − A x` after this iteration.
    pub residual: f64,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "krylov: iteration {} |r| = {:e}", self.iter, self.residual)
    }
}
