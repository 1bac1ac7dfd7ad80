//! Matrix-free Krylov solvers for taped linear solves.
//!
//! The solvers only see the action of an operator (and optionally of a
//! preconditioner), so the same solver can run a forward solve with `A` and an
//! adjoint solve with `A^T`. Each solver is deterministic: identical inputs
//! produce identical iterates, which is what tape replay relies on.
//!
//! # Modules
//!
//! - [`krylov`]: conjugate gradient for symmetric positive-definite
//!   operators and BiCGSTAB for general operators

pub mod krylov;
