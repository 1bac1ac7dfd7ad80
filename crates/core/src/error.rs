use thiserror::Error;

use crate::{Direction, Variable};

/// A block, operator, or functional violated its declared interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The number of values does not match the declared dependencies.
    #[error("`{block}` expects {expected} values, found {found}")]
    ArityMismatch {
        block: String,
        expected: usize,
        found: usize,
    },

    /// Two values that must have the same length do not.
    #[error("shape mismatch: expected length {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// A linear operator cannot apply its transpose.
    #[error("operator `{operator}` is missing transpose")]
    MissingTranspose { operator: String },

    /// An equation was built without any blocks.
    #[error("equation for `{0}` has no blocks")]
    EmptyEquation(Variable),

    /// A derivative was requested with respect to a variable the block does
    /// not depend on.
    #[error("`{block}` does not depend on `{variable}`")]
    UnknownDependency { block: String, variable: Variable },
}

impl ContractError {
    /// Returns an error unless `found` equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::ShapeMismatch`] when the lengths differ.
    pub fn check_len(expected: usize, found: usize) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(Self::ShapeMismatch { expected, found })
        }
    }
}

/// An operation is not valid in the current tape or registry state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The tape has been replayed or differentiated and accepts no more
    /// equations until it is cleared.
    #[error("tape is frozen; clear it before registering equations")]
    Frozen,

    /// An equation targeting this variable is already registered.
    #[error("`{0}` is already known to the tape")]
    AlreadyKnown(Variable),

    /// The target is not the latest allocated version of its name.
    #[error("`{0}` is not the latest allocated version of its name")]
    Stale(Variable),

    /// Rolling back a version the tape already knows is forbidden.
    #[error("cannot forget `{0}`: it is known to the tape")]
    ForgetKnown(Variable),

    /// The timeline was marked finished by a previous increment.
    #[error("timeline is finished at timestep {0}")]
    TimelineFinished(usize),

    /// The start time can only be set before the first increment.
    #[error("timeline already advanced to timestep {0}")]
    TimelineStarted(usize),
}

/// A linear solve did not produce a solution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("no convergence after {iters} iterations (residual {residual:e})")]
    NotConverged { iters: usize, residual: f64 },

    #[error("breakdown at iteration {iter}")]
    Breakdown { iter: usize },

    #[error("non-finite residual at iteration {iter}")]
    NonFinite { iter: usize },

    #[error("right-hand side has length {found}, operator has size {expected}")]
    Shape { expected: usize, found: usize },
}

/// Errors a [`Block`](crate::Block) may return.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// The block does not support derivatives in this direction.
    #[error("{0} derivative is not implemented")]
    NotImplemented(Direction),

    #[error("linear solve failed: {0}")]
    Solve(#[from] SolveError),
}
