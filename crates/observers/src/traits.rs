//! Capability traits for cross-operation observers.
//!
//! These traits abstract over the event and action types of tape sweeps and
//! solvers, so one observer can watch a replay, an adjoint sweep and a Krylov
//! solve alike.
//!
//! # Event traits
//!
//! - [`HasResidual`]: events that carry a residual norm
//! - [`HasVariable`]: events about a specific taped variable
//! - [`HasEquation`]: events that may point at an equation on the tape
//!
//! # Action traits
//!
//! - [`CanStopEarly`]: actions that can end the operation early
//! - [`CanAbort`]: actions that unwind the operation with an error
//!
//! # Example
//!
//! ```rust
//! use rewind_core::Observer;
//! use rewind_observers::traits::{CanStopEarly, HasResidual};
//!
//! struct GoodEnough {
//!     tolerance: f64,
//! }
//!
//! impl<E: HasResidual, A: CanStopEarly> Observer<E, A> for GoodEnough {
//!     fn observe(&mut self, event: &E) -> Option<A> {
//!         (event.residual() < self.tolerance).then(A::stop_early)
//!     }
//! }
//! ```

use rewind_core::Variable;
use rewind_solvers::krylov;
use rewind_tape::{adjoint, replay};

/// An event that carries a residual norm.
pub trait HasResidual {
    fn residual(&self) -> f64;
}

/// An event about a specific taped variable.
pub trait HasVariable {
    fn variable(&self) -> &Variable;
}

/// An event that may point at an equation on the tape.
pub trait HasEquation {
    /// The index of the equation in registration order, if any.
    fn equation(&self) -> Option<usize>;
}

/// An action type that can end an operation early.
///
/// Operations that cannot return a partial result treat this as an abort.
pub trait CanStopEarly {
    fn stop_early() -> Self;
}

/// An action type that unwinds an operation with an error.
pub trait CanAbort {
    fn abort() -> Self;
}

impl HasResidual for krylov::Event {
    fn residual(&self) -> f64 {
        self.residual
    }
}

impl HasResidual for replay::Event<'_> {
    /// The comparison error, or `NAN` if nothing was recorded.
    fn residual(&self) -> f64 {
        match self.comparison {
            replay::Comparison::Unrecorded => f64::NAN,
            replay::Comparison::Match { error } | replay::Comparison::Mismatch { error, .. } => error,
        }
    }
}

impl HasVariable for replay::Event<'_> {
    fn variable(&self) -> &Variable {
        self.variable
    }
}

impl HasVariable for adjoint::Event<'_> {
    fn variable(&self) -> &Variable {
        match self {
            adjoint::Event::Seeded { variable, .. } => *variable,
            adjoint::Event::Propagated { target, .. } => *target,
            adjoint::Event::Control { control, .. } => *control,
        }
    }
}

impl HasEquation for replay::Event<'_> {
    fn equation(&self) -> Option<usize> {
        Some(self.index)
    }
}

impl HasEquation for adjoint::Event<'_> {
    fn equation(&self) -> Option<usize> {
        match self {
            adjoint::Event::Propagated { index, .. } => Some(*index),
            adjoint::Event::Seeded { .. } | adjoint::Event::Control { .. } => None,
        }
    }
}

impl CanStopEarly for krylov::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}

impl CanStopEarly for replay::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}

impl CanStopEarly for adjoint::Action {
    fn stop_early() -> Self {
        Self::Abort
    }
}

impl CanAbort for adjoint::Action {
    fn abort() -> Self {
        Self::Abort
    }
}
