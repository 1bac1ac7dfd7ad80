use std::fmt;

use crate::{SolveError, Vector};

/// The action of a linear operator, `x -> A x`.
pub type OperatorAction<'a> = &'a dyn Fn(&Vector) -> Vector;

/// A square linear operator that is applied without forming a matrix.
///
/// The operator may depend on parameter values (coefficients that are
/// themselves variables on a tape). Parameters are always passed in; an
/// operator never stores them, so a taped solve can replay with the exact
/// parameter versions it was recorded with.
pub trait LinearOperator: fmt::Debug {
    /// A short, human-readable name used in diagnostics.
    fn name(&self) -> &str;

    /// The operator dimension.
    fn size(&self) -> usize;

    /// The number of parameter values the operator expects.
    fn parameter_count(&self) -> usize {
        0
    }

    /// Computes `A(params) x`.
    fn apply(&self, params: &[&Vector], x: &Vector) -> Vector;

    /// Computes `A(params)^T x`, or `None` if the transpose is unavailable.
    ///
    /// If the forward problem imposes Dirichlet-type constraints, the
    /// transpose must impose the homogeneous version of them.
    fn apply_transpose(&self, _params: &[&Vector], _x: &Vector) -> Option<Vector> {
        None
    }

    /// Differentiates `A(params) x` with respect to `params[index]`.
    ///
    /// With `transpose = false`, returns `(dA/dp seed) x` in the operator's
    /// range; with `transpose = true`, returns `(d(A x)/dp)^T seed` in the
    /// parameter's space. `None` means the derivative is unavailable.
    fn derivative_action(
        &self,
        _params: &[&Vector],
        _index: usize,
        _x: &Vector,
        _seed: &Vector,
        _transpose: bool,
    ) -> Option<Vector> {
        None
    }
}

/// Solves `A x = b` given only the action of `A`.
///
/// Implementations must be deterministic: identical inputs produce identical
/// outputs, which is what lets a replayed tape reproduce recorded values.
pub trait LinearSolver: fmt::Debug {
    /// Solves `operator(x) = rhs` starting from `guess`.
    ///
    /// `preconditioner`, when given, approximates the action of `A^-1`.
    ///
    /// # Errors
    ///
    /// Returns a [`SolveError`] if the solve does not converge.
    fn solve(
        &self,
        operator: OperatorAction<'_>,
        preconditioner: Option<OperatorAction<'_>>,
        rhs: &Vector,
        guess: Vector,
    ) -> Result<Vector, SolveError>;
}
