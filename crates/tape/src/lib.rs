//! A tape that records iterative numerical computations and differentiates
//! them.
//!
//! Each computed value is a versioned [`Variable`](rewind_core::Variable)
//! produced by an [`Equation`]: a target equal to the sum of one or more
//! [`Block`](rewind_core::Block)s. Once recorded, the tape supports:
//!
//! - forward replay with comparison against recorded values ([`replay`])
//! - gradients of a functional by a reverse sweep ([`adjoint`])
//! - tangent-linear directional derivatives ([`Tape::compute_tangent`])
//! - Hessian actions by a second-order adjoint sweep ([`Tape::hessian_action`])
//! - numerical verification of blocks and gradients ([`verify`])
//!
//! Under [`Policy::StoreControlsOnly`] only initial conditions, controls and
//! explicit checkpoints are stored; other values are recomputed on demand.
//! [`MatrixFree`] tapes Krylov solves so that their adjoint is a solve with
//! the transposed operator.

mod equation;
mod error;
mod functional;
mod graph;
mod hessian;
mod matrix_free;
mod recompute;
mod reduced;
mod storage;
mod sweep;
mod tangent;
mod tape;

pub mod adjoint;
pub mod blocks;
pub mod replay;
pub mod verify;

pub use adjoint::Gradient;
pub use equation::Equation;
pub use error::Error;
pub use functional::{
    FinalFunctional, FunctionalSum, Instant, PointFunctional, TimeIntegral, TimeSlice,
    TimeSliceError,
};
pub use graph::TapeGraph;
pub use matrix_free::{KrylovSolve, MatrixFree};
pub use reduced::ReducedFunctional;
pub use storage::{Checkpoint, MemoryStore, Policy, Record, Store};
pub use tape::{State, Tape};
