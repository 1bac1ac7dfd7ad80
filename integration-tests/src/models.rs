use std::rc::Rc;

use ndarray::array;
use rewind_core::{LinearOperator, Variable, Vector};
use rewind_tape::{
    Error, MatrixFree, Policy, Tape,
    blocks::{LinearCombination, Pointwise},
};

/// Width of every timestep in the model drivers.
pub const DT: f64 = 0.1;

/// A recorded implicit diffusion run.
pub struct Heat {
    pub tape: Tape,
    pub u0: Variable,
    pub kappa: Variable,
}

/// Records `steps` implicit steps `A(κ) u_{n+1} = u_n` starting from `u0`.
///
/// Each step is a taped matrix-free solve and ends its timestep; the last
/// step finishes the timeline.
///
/// # Errors
///
/// Returns any error raised while recording.
pub fn heat(
    policy: Policy,
    u0: Vector,
    kappa: f64,
    steps: usize,
    solver: &MatrixFree,
    operator: Rc<dyn LinearOperator>,
) -> Result<Heat, Error> {
    let mut tape = Tape::new(policy);
    tape.start_timestep(0.0)?;
    let u0 = tape.register_initial_condition("u", u0)?;
    let kappa = tape.register_initial_condition("kappa", array![kappa])?;

    for step in 1..=steps {
        let previous = tape.current("u")?;
        solver.solve(
            &mut tape,
            "u",
            Rc::clone(&operator),
            vec![kappa.clone()],
            Box::new(LinearCombination::assign(previous)),
        )?;
        #[allow(clippy::cast_precision_loss)]
        tape.increment_timestep(DT * step as f64, step == steps)?;
    }

    Ok(Heat { tape, u0, kappa })
}

/// A recorded explicit reaction run.
pub struct Reaction {
    pub tape: Tape,
    pub u0: Variable,
    pub source: Variable,
}

fn cube(x: f64) -> f64 {
    x.powi(3)
}

fn cube_derivative(x: f64) -> f64 {
    3.0 * x * x
}

fn cube_second_derivative(x: f64) -> f64 {
    6.0 * x
}

/// Records `steps` explicit steps `u_{n+1} = u_n − Δt u_n³ + Δt f`.
///
/// Both the initial state `u0` and the source `f` are initial conditions.
///
/// # Errors
///
/// Returns any error raised while recording.
pub fn reaction(policy: Policy, u0: Vector, source: Vector, steps: usize) -> Result<Reaction, Error> {
    let mut tape = Tape::new(policy);
    tape.start_timestep(0.0)?;
    let u0 = tape.register_initial_condition("u", u0)?;
    let source = tape.register_initial_condition("f", source)?;

    for step in 1..=steps {
        let previous = tape.current("u")?;
        let (cubed, _) = tape.assign(
            "c",
            Pointwise::new("cube", previous.clone(), cube, cube_derivative)
                .with_second_derivative(cube_second_derivative),
        )?;
        tape.assign(
            "u",
            LinearCombination::new([(previous, 1.0), (cubed, -DT), (source.clone(), DT)]),
        )?;
        #[allow(clippy::cast_precision_loss)]
        tape.increment_timestep(DT * step as f64, step == steps)?;
    }

    Ok(Reaction { tape, u0, source })
}
