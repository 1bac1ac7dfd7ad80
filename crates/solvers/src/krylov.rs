//! Krylov subspace solvers for `A x = b` given only `x -> A x`.
//!
//! # Solvers
//!
//! - [`cg`]: conjugate gradient; requires a symmetric positive-definite
//!   operator (and preconditioner)
//! - [`bicgstab`]: stabilized biconjugate gradient; handles general
//!   nonsymmetric operators
//!
//! Both stop when the residual norm satisfies
//! `‖b − A x‖ ≤ abs_tol + rel_tol · ‖b‖`.
//!
//! # Observer Events
//!
//! Each solver emits one [`Event`] per iteration with the current residual
//! norm. Observers can return [`Action::StopEarly`] to halt immediately; the
//! solution then carries [`Status::StoppedByObserver`].
//!
//! # Tape integration
//!
//! [`ConjugateGradient`] and [`BiCgStab`] implement
//! [`LinearSolver`](rewind_core::LinearSolver), mapping a solve that hits the
//! iteration limit to [`SolveError::NotConverged`].

mod action;
mod config;
mod error;
mod event;
mod solution;

pub mod bicgstab;
pub mod cg;

pub use action::Action;
pub use config::{Config, ConfigError};
pub use error::Error;
pub use event::Event;
pub use solution::{Solution, Status};

use rewind_core::{LinearSolver, OperatorAction, SolveError, Vector};

/// Conjugate gradient as a [`LinearSolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConjugateGradient {
    config: Config,
}

impl ConjugateGradient {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl LinearSolver for ConjugateGradient {
    fn solve(
        &self,
        operator: OperatorAction<'_>,
        preconditioner: Option<OperatorAction<'_>>,
        rhs: &Vector,
        guess: Vector,
    ) -> Result<Vector, SolveError> {
        cg::solve_unobserved(operator, preconditioner, rhs, guess, &self.config)?.into_result()
    }
}

/// BiCGSTAB as a [`LinearSolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiCgStab {
    config: Config,
}

impl BiCgStab {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl LinearSolver for BiCgStab {
    fn solve(
        &self,
        operator: OperatorAction<'_>,
        preconditioner: Option<OperatorAction<'_>>,
        rhs: &Vector,
        guess: Vector,
    ) -> Result<Vector, SolveError> {
        bicgstab::solve_unobserved(operator, preconditioner, rhs, guess, &self.config)?
            .into_result()
    }
}

/// Applies the preconditioner, or the identity if there is none.
fn precondition(preconditioner: Option<OperatorAction<'_>>, r: &Vector) -> Vector {
    preconditioner.map_or_else(|| r.clone(), |m| m(r))
}

/// Residual tolerance for a right-hand side.
fn tolerance(config: &Config, rhs: &Vector) -> f64 {
    config.abs_tol() + config.rel_tol() * rewind_core::vector::norm(rhs)
}
