//! Preconditioned conjugate gradient.
//!
//! # When to Use
//!
//! - The operator is symmetric positive-definite
//! - The preconditioner, if any, is symmetric positive-definite
//!
//! For a symmetric operator the adjoint solve uses the same operator action,
//! so CG serves both the forward and the adjoint problem.

use rewind_core::{Observer, OperatorAction, Vector, vector::norm};

use super::{Action, Config, Error, Event, Solution, Status, precondition, tolerance};

/// Solves `operator(x) = rhs` using preconditioned conjugate gradient.
///
/// The observer receives an [`Event`] after every iteration.
///
/// # Errors
///
/// Returns an error if the recurrence breaks down (the operator is not
/// positive-definite along a search direction) or the residual becomes
/// non-finite.
pub fn solve<Obs>(
    operator: OperatorAction<'_>,
    preconditioner: Option<OperatorAction<'_>>,
    rhs: &Vector,
    guess: Vector,
    config: &Config,
    mut observer: Obs,
) -> Result<Solution, Error>
where
    Obs: Observer<Event, Action>,
{
    if guess.len() != rhs.len() {
        return Err(Error::Shape {
            expected: guess.len(),
            found: rhs.len(),
        });
    }

    let tol = tolerance(config, rhs);
    let mut x = guess;
    let mut r = rhs - &operator(&x);
    let mut residual = norm(&r);

    if residual <= tol {
        return Ok(Solution {
            status: Status::Converged,
            x,
            residual,
            iters: 0,
        });
    }

    let mut z = precondition(preconditioner, &r);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for iter in 1..=config.max_iters() {
        let ap = operator(&p);
        let pap = p.dot(&ap);
        if !pap.is_finite() {
            return Err(Error::NonFinite { iter });
        }
        if pap <= 0.0 {
            return Err(Error::Breakdown { iter });
        }

        let alpha = rz / pap;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);
        residual = norm(&r);
        if !residual.is_finite() {
            return Err(Error::NonFinite { iter });
        }

        if let Some(Action::StopEarly) = observer.observe(&Event { iter, residual }) {
            return Ok(Solution {
                status: Status::StoppedByObserver,
                x,
                residual,
                iters: iter,
            });
        }

        if residual <= tol {
            return Ok(Solution {
                status: Status::Converged,
                x,
                residual,
                iters: iter,
            });
        }

        z = precondition(preconditioner, &r);
        let rz_next = r.dot(&z);
        let beta = rz_next / rz;
        rz = rz_next;

        p *= beta;
        p += &z;
    }

    Ok(Solution {
        status: Status::MaxIters,
        x,
        residual,
        iters: config.max_iters(),
    })
}

/// Solves `operator(x) = rhs` without observer support.
///
/// This is a convenience wrapper around [`solve`] that uses a no-op observer.
///
/// # Errors
///
/// Returns an error if the recurrence breaks down or the residual becomes
/// non-finite.
pub fn solve_unobserved(
    operator: OperatorAction<'_>,
    preconditioner: Option<OperatorAction<'_>>,
    rhs: &Vector,
    guess: Vector,
    config: &Config,
) -> Result<Solution, Error> {
    solve(operator, preconditioner, rhs, guess, config, ())
}
