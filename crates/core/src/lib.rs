//! Core contracts for taping and differentiating iterative numerical solves.
//!
//! This crate defines the shared abstractions that the tape engine, the
//! reference solvers, and observers build on:
//!
//! - [`Variable`]: a named quantity at a specific version (timestep, iteration)
//! - [`Registry`]: allocates monotonically increasing versions per name and
//!   tracks the [`Timeline`] of timestep boundaries
//! - [`Block`]: an opaque differentiable step that computes a value from its
//!   dependencies and supplies derivative actions
//! - [`Functional`]: the scalar objective whose gradient is requested
//! - [`LinearOperator`], [`LinearSolver`]: the collaborator interfaces used to
//!   tape matrix-free iterative solves
//! - [`Observer`]: receives events from long-running operations and
//!   optionally returns control actions

mod block;
mod error;
mod functional;
mod observer;
mod operator;
mod registry;
mod variable;

pub mod vector;

pub use block::{Block, Direction, check_arity, check_dependency};
pub use error::{BlockError, ContractError, SolveError, StateError};
pub use functional::Functional;
pub use observer::Observer;
pub use operator::{LinearOperator, LinearSolver, OperatorAction};
pub use registry::{Registry, Timeline};
pub use variable::Variable;

/// The value type carried by every variable on a tape.
///
/// Scalars are represented as vectors of length one.
pub type Vector = ndarray::Array1<f64>;
