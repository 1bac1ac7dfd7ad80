//! Right-preconditioned BiCGSTAB.
//!
//! # When to Use
//!
//! - The operator is nonsymmetric (typical for advection or for the adjoint of
//!   a nonsymmetric forward problem)
//! - Only the operator action is available
//!
//! BiCGSTAB can break down when an inner product vanishes; the solver reports
//! [`Error::Breakdown`] instead of dividing by zero.

use rewind_core::{Observer, OperatorAction, Vector, vector::norm};

use super::{Action, Config, Error, Event, Solution, Status, precondition, tolerance};

/// Solves `operator(x) = rhs` using BiCGSTAB.
///
/// The observer receives an [`Event`] after every iteration.
///
/// # Errors
///
/// Returns an error if the recurrence breaks down or the residual becomes
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

    let r_hat = r.clone();
    let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
    let mut v = Vector::zeros(x.len());
    let mut p = Vector::zeros(x.len());

    for iter in 1..=config.max_iters() {
        let rho_next = r_hat.dot(&r);
        if rho_next == 0.0 {
            return Err(Error::Breakdown { iter });
        }

        let beta = (rho_next / rho) * (alpha / omega);
        p.scaled_add(-omega, &v);
        p *= beta;
        p += &r;

        let p_hat = precondition(preconditioner, &p);
        v = operator(&p_hat);
        let rv = r_hat.dot(&v);
        if rv == 0.0 {
            return Err(Error::Breakdown { iter });
        }
        alpha = rho_next / rv;

        let mut s = r.clone();
        s.scaled_add(-alpha, &v);
        x.scaled_add(alpha, &p_hat);

        let s_norm = norm(&s);
        if s_norm <= tol {
            residual = s_norm;
            return finish(&mut observer, x, residual, iter, Status::Converged);
        }

        let s_hat = precondition(preconditioner, &s);
        let t = operator(&s_hat);
        let tt = t.dot(&t);
        if tt == 0.0 {
            return Err(Error::Breakdown { iter });
        }
        omega = t.dot(&s) / tt;

        x.scaled_add(omega, &s_hat);
        s.scaled_add(-omega, &t);
        r = s;
        rho = rho_next;

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

        if omega == 0.0 {
            return Err(Error::Breakdown { iter });
        }
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

/// Emits the final event for a half-step convergence and builds the solution.
fn finish<Obs>(
    observer: &mut Obs,
    x: Vector,
    residual: f64,
    iter: usize,
    status: Status,
) -> Result<Solution, Error>
where
    Obs: Observer<Event, Action>,
{
    let status = match observer.observe(&Event { iter, residual }) {
        Some(Action::StopEarly) => Status::StoppedByObserver,
        None => status,
    };
    Ok(Solution {
        status,
        x,
        residual,
        iters: iter,
    })
}
