//! Shared operators, functionals and model drivers for the integration tests.

pub mod models;
pub mod operators;

mod total;

pub use total::Total;
