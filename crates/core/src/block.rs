use std::fmt;

use crate::{BlockError, ContractError, Variable, Vector};

/// The direction of a derivative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Jacobian-vector product (tangent-linear mode).
    Forward,

    /// Vector-Jacobian product (adjoint mode).
    Adjoint,
}

impl Direction {
    /// Returns the direction matching a `transpose` flag.
    #[must_use]
    pub fn from_transpose(transpose: bool) -> Self {
        if transpose {
            Self::Adjoint
        } else {
            Self::Forward
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => f.write_str("tangent-linear"),
            Self::Adjoint => f.write_str("adjoint"),
        }
    }
}

/// An opaque differentiable step recorded on a tape.
///
/// A block computes a contribution to its equation's target from the values of
/// its dependencies, and supplies the derivative actions the tape needs to
/// propagate tangents forward and adjoints backward. The tape never looks
/// inside a block.
///
/// `values` is always ordered like [`Block::dependencies`], which may list the
/// same variable more than once. Derivative actions with respect to a
/// variable must account for every position it occupies.
pub trait Block: fmt::Debug {
    /// A short, human-readable name used in diagnostics.
    fn name(&self) -> &str;

    /// The variables this block reads, in the order `values` are supplied.
    fn dependencies(&self) -> &[Variable];

    /// Scalar data captured by the block (weights, scale factors).
    ///
    /// Used for introspection only.
    fn coefficients(&self) -> &[f64] {
        &[]
    }

    /// Evaluates the block's contribution to the target.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::Contract`] if the values do not match the
    /// declared dependencies.
    fn evaluate(&self, values: &[&Vector]) -> Result<Vector, BlockError>;

    /// Applies the derivative with respect to `variable` to `seed`.
    ///
    /// With `transpose = false` the result is the Jacobian-vector product in
    /// the target's space; with `transpose = true` it is the vector-Jacobian
    /// product in `variable`'s space. The result must be linear in `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::NotImplemented`] if the direction is unsupported.
    fn derivative_action(
        &self,
        values: &[&Vector],
        variable: &Variable,
        seed: &Vector,
        transpose: bool,
    ) -> Result<Vector, BlockError>;

    /// Applies the transposed derivative with respect to each of `variables`.
    ///
    /// Returns one vector-Jacobian product per variable, in order. `output`
    /// is the block's own recorded value when the caller has it without
    /// recomputation. Blocks whose adjoint shares expensive work across
    /// dependencies, such as a linear solve, override this to do it once.
    ///
    /// # Errors
    ///
    /// See [`Block::derivative_action`].
    fn adjoint_actions(
        &self,
        values: &[&Vector],
        _output: Option<&Vector>,
        variables: &[&Variable],
        seed: &Vector,
    ) -> Result<Vec<Vector>, BlockError> {
        variables
            .iter()
            .map(|variable| self.derivative_action(values, variable, seed, true))
            .collect()
    }

    /// Applies the second derivative with respect to `inner` then `outer`.
    ///
    /// Computes `(d/d outer [(dF/d inner) inner_seed]) action`, or its
    /// transpose. `Ok(None)` means the contribution is zero or unsupported and
    /// callers treat it as a hard zero.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::Contract`] if the values do not match the
    /// declared dependencies.
    #[allow(clippy::too_many_arguments)]
    fn second_derivative_action(
        &self,
        _values: &[&Vector],
        _inner: &Variable,
        _inner_seed: &Vector,
        _outer: &Variable,
        _transpose: bool,
        _action: &Vector,
    ) -> Result<Option<Vector>, BlockError> {
        Ok(None)
    }
}

/// Checks that `values` matches the block's declared dependencies in number.
///
/// # Errors
///
/// Returns [`ContractError::ArityMismatch`] on mismatch.
pub fn check_arity<B: Block + ?Sized>(block: &B, values: &[&Vector]) -> Result<(), ContractError> {
    let expected = block.dependencies().len();
    if values.len() == expected {
        Ok(())
    } else {
        Err(ContractError::ArityMismatch {
            block: block.name().to_owned(),
            expected,
            found: values.len(),
        })
    }
}

/// Returns the positions `variable` occupies in the block's dependencies.
///
/// # Errors
///
/// Returns [`ContractError::UnknownDependency`] if it occupies none.
pub fn check_dependency<B: Block + ?Sized>(
    block: &B,
    variable: &Variable,
) -> Result<Vec<usize>, ContractError> {
    let positions: Vec<usize> = block
        .dependencies()
        .iter()
        .enumerate()
        .filter_map(|(i, dep)| (dep == variable).then_some(i))
        .collect();

    if positions.is_empty() {
        Err(ContractError::UnknownDependency {
            block: block.name().to_owned(),
            variable: variable.clone(),
        })
    } else {
        Ok(positions)
    }
}
