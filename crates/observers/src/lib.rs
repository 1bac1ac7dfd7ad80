//! Reusable observers for tape sweeps and solvers.
//!
//! This crate provides [`Observer`] implementations and capability traits that
//! work across the replay, adjoint and Krylov event types.
//!
//! # Modules
//!
//! - [`traits`]: capability traits for cross-operation observers
//!   ([`HasResidual`], [`HasVariable`], [`HasEquation`], [`CanStopEarly`],
//!   [`CanAbort`])
//!
//! # Observers
//!
//! - [`Trace`]: records every event as a line of text, optionally echoing it
//!   to standard error
//! - [`StopAfter`]: ends an operation after a fixed number of events
//!
//! [`Observer`]: rewind_core::Observer
//! [`HasResidual`]: traits::HasResidual
//! [`HasVariable`]: traits::HasVariable
//! [`HasEquation`]: traits::HasEquation
//! [`CanAbort`]: traits::CanAbort
//! [`CanStopEarly`]: traits::CanStopEarly

mod trace;

pub mod traits;

pub use trace::{StopAfter, Trace};
