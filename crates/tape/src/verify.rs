//! Numerical checks for blocks and taped derivatives.
//!
//! - [`check_transpose`] compares a block's tangent-linear and adjoint
//!   actions through the identity `⟨J δ, w⟩ = ⟨δ, Jᵀ w⟩`.
//! - [`check_derivative`] and [`taylor_test`] verify derivatives against
//!   function values: with a correct derivative the first-order Taylor
//!   remainder shrinks quadratically as the step is halved.

use rewind_core::{
    Block, BlockError, ContractError, Variable, Vector, check_arity, check_dependency, vector,
};
use thiserror::Error;

/// Step schedule for Taylor tests.
///
/// Starts at `step` and halves it `steps - 1` times.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaylorConfig {
    step: f64,
    steps: usize,
}

/// Errors that can occur when creating a [`TaylorConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TaylorConfigError {
    #[error("step must be positive and finite: {0}")]
    Step(f64),
    #[error("at least two steps are needed to estimate an order: {0}")]
    Steps(usize),
}

impl TaylorConfig {
    /// Creates a validated step schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if `step` is not positive and finite or `steps < 2`.
    pub fn new(step: f64, steps: usize) -> Result<Self, TaylorConfigError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(TaylorConfigError::Step(step));
        }
        if steps < 2 {
            return Err(TaylorConfigError::Steps(steps));
        }
        Ok(Self { step, steps })
    }

    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn schedule(&self) -> impl Iterator<Item = f64> {
        let first = self.step;
        (0..self.steps).scan(first, |h, _| {
            let current = *h;
            *h *= 0.5;
            Some(current)
        })
    }
}

impl Default for TaylorConfig {
    fn default() -> Self {
        // Known-good values, unwrap is safe.
        Self::new(1e-2, 5).unwrap()
    }
}

/// Remainders and observed convergence orders of a Taylor test.
#[derive(Debug, Clone, PartialEq)]
pub struct TaylorReport {
    pub steps: Vec<f64>,
    pub residuals: Vec<f64>,

    /// `log2(r_{k-1} / r_k)` for each consecutive pair of residuals.
    pub orders: Vec<f64>,
}

impl TaylorReport {
    fn new(steps: Vec<f64>, residuals: Vec<f64>) -> Self {
        let orders = residuals
            .windows(2)
            .map(|pair| (pair[0] / pair[1]).log2())
            .collect();
        Self {
            steps,
            residuals,
            orders,
        }
    }

    /// The smallest finite observed order.
    ///
    /// `None` when no order is finite, which happens when the remainders are
    /// exactly zero (a linear model).
    #[must_use]
    pub fn min_order(&self) -> Option<f64> {
        self.orders
            .iter()
            .copied()
            .filter(|o| o.is_finite())
            .reduce(f64::min)
    }
}

/// Runs a Taylor test on a scalar function.
///
/// `j(h)` evaluates the function at `m + h δ`, and `dj` is the claimed
/// directional derivative `⟨∇J(m), δ⟩`. Residuals are
/// `|j(h) − j(0) − h dj|`.
///
/// # Errors
///
/// Propagates any error returned by `j`.
pub fn taylor_test<E, J>(mut j: J, dj: f64, config: &TaylorConfig) -> Result<TaylorReport, E>
where
    J: FnMut(f64) -> Result<f64, E>,
{
    let j0 = j(0.0)?;
    let mut steps = Vec::with_capacity(config.steps);
    let mut residuals = Vec::with_capacity(config.steps);
    for h in config.schedule() {
        residuals.push((j(h)? - j0 - h * dj).abs());
        steps.push(h);
    }
    Ok(TaylorReport::new(steps, residuals))
}

/// Both sides of the transpose identity for one block and variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransposeCheck {
    /// `⟨J δ, w⟩`
    pub forward: f64,
    /// `⟨δ, Jᵀ w⟩`
    pub adjoint: f64,
}

impl TransposeCheck {
    /// `|forward − adjoint|` relative to the larger magnitude.
    #[must_use]
    pub fn relative_error(&self) -> f64 {
        let scale = self.forward.abs().max(self.adjoint.abs());
        if scale == 0.0 {
            0.0
        } else {
            (self.forward - self.adjoint).abs() / scale
        }
    }
}

/// Checks that a block's adjoint action is the transpose of its
/// tangent-linear action with respect to `variable`.
///
/// Uses fixed, deterministic probe vectors.
///
/// # Errors
///
/// Returns an error if `values` does not match the block's dependencies, or
/// the block fails to evaluate or differentiate.
pub fn check_transpose<B: Block + ?Sized>(
    block: &B,
    values: &[&Vector],
    variable: &Variable,
) -> Result<TransposeCheck, BlockError> {
    check_arity(block, values)?;
    let position = check_dependency(block, variable)?[0];
    let output = block.evaluate(values)?;

    let delta = probe(values[position].len(), 0.7);
    let w = probe(output.len(), 1.3);

    let forward = block.derivative_action(values, variable, &delta, false)?;
    let adjoint = block.derivative_action(values, variable, &w, true)?;

    Ok(TransposeCheck {
        forward: vector::inner(&forward, &w)?,
        adjoint: vector::inner(&delta, &adjoint)?,
    })
}

/// Taylor-tests a block's tangent-linear action with respect to `variable`
/// in `direction`.
///
/// Residuals are `‖F(x + h δ) − F(x) − h J δ‖`.
///
/// # Errors
///
/// Returns an error if `values` does not match the block's dependencies, the
/// block fails, or `direction` has the wrong length.
pub fn check_derivative<B: Block + ?Sized>(
    block: &B,
    values: &[&Vector],
    variable: &Variable,
    direction: &Vector,
    config: &TaylorConfig,
) -> Result<TaylorReport, BlockError> {
    check_arity(block, values)?;
    let positions = check_dependency(block, variable)?;
    let base = values[positions[0]];
    ContractError::check_len(base.len(), direction.len())?;

    let f0 = block.evaluate(values)?;
    let jd = block.derivative_action(values, variable, direction, false)?;

    let mut steps = Vec::with_capacity(config.steps);
    let mut residuals = Vec::with_capacity(config.steps);
    for h in config.schedule() {
        let perturbed = base + &(direction * h);
        let shifted: Vec<&Vector> = values
            .iter()
            .enumerate()
            .map(|(i, v)| if positions.contains(&i) { &perturbed } else { *v })
            .collect();
        let fh = block.evaluate(&shifted)?;
        ContractError::check_len(f0.len(), fh.len())?;
        residuals.push(vector::norm(&(fh - &f0 - &(&jd * h))));
        steps.push(h);
    }
    Ok(TaylorReport::new(steps, residuals))
}

/// A deterministic, nonzero probe vector.
fn probe(len: usize, phase: f64) -> Vector {
    #[allow(clippy::cast_precision_loss)]
    Vector::from_shape_fn(len, |i| (phase * (i + 1) as f64).sin() + 0.1)
}
