//! Reverse sweep computing functional gradients.
//!
//! The sweep walks the tape from the last equation to the first. Adjoint
//! values start at zero, the functional seeds the variables it reads, and
//! each equation passes its target's adjoint to its dependencies through the
//! transposed derivative actions of its blocks.
//!
//! # Observer Events
//!
//! [`Event::Seeded`] fires when the functional seeds a variable,
//! [`Event::Propagated`] when an equation with a nonzero adjoint is
//! processed, and [`Event::Control`] when a control's gradient is complete.
//! Returning [`Action::Abort`] ends the sweep with
//! [`Error::Aborted`](crate::Error::Aborted).

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
};

use rewind_core::{Functional, Observer, Variable, Vector, vector};

use crate::{
    Error, Store, Tape,
    recompute::Resolver,
    sweep::{self, Seeds},
};

/// Derivatives keyed by control.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradient {
    values: BTreeMap<Variable, Vector>,
}

impl Gradient {
    #[must_use]
    pub fn get(&self, control: &Variable) -> Option<&Vector> {
        self.values.get(control)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Vector)> {
        self.values.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<Variable, Vector> {
        self.values
    }

    pub(crate) fn insert(&mut self, control: Variable, value: Vector) {
        self.values.insert(control, value);
    }
}

/// Progress of an adjoint sweep.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// The functional seeded `variable` at `timestep`.
    Seeded {
        variable: &'a Variable,
        timestep: usize,
    },

    /// Equation `index` propagated an adjoint with the given norm.
    Propagated {
        index: usize,
        target: &'a Variable,
        norm: f64,
    },

    /// The gradient with respect to `control` is complete.
    Control { control: &'a Variable, norm: f64 },
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seeded { variable, timestep } => {
                write!(f, "adjoint: seeded {variable} at timestep {timestep}")
            }
            Self::Propagated {
                index,
                target,
                norm,
            } => write!(f, "adjoint: equation {index} ({target}) |λ| = {norm:e}"),
            Self::Control { control, norm } => {
                write!(f, "adjoint: gradient for {control} |dJ| = {norm:e}")
            }
        }
    }
}

/// What an observer can ask an adjoint sweep to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Abort,
}

impl<S: Store> Tape<S> {
    /// Computes the gradient of `functional` with respect to `controls`.
    ///
    /// Freezes the tape. A control the functional does not depend on gets a
    /// zero gradient.
    ///
    /// # Errors
    ///
    /// Returns an error if a control or functional dependency is unknown, a
    /// block lacks an adjoint derivative, or the observer aborts.
    pub fn compute_gradient<F, Obs>(
        &mut self,
        functional: &F,
        controls: &[Variable],
        mut observer: Obs,
    ) -> Result<Gradient, Error>
    where
        F: Functional + ?Sized,
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        self.freeze();
        let tape = &*self;
        tape.ensure_known(controls)?;

        let seeds = Seeds::collect(functional, &tape.registry);
        tape.ensure_known(seeds.variables())?;

        let mut pending: BTreeSet<&Variable> = controls.iter().collect();
        let mut resolver = Resolver::new(tape);
        let mut adjoints: HashMap<Variable, Vector> = HashMap::new();
        let mut gradient = Gradient::default();

        for (index, equation) in tape.equations.iter().enumerate().rev() {
            if pending.is_empty() {
                break;
            }
            resolver.evict_from(index + 1);

            let target = equation.target();
            let mut lambda = adjoints.remove(target);

            for (timestep, deps) in seeds.reads(target) {
                let values = resolver.resolve_all(deps)?;
                let refs: Vec<&Vector> = values.iter().collect();
                let seed = functional.derivative(*timestep, &tape.registry, target, deps, &refs)?;
                sweep::add_into(&mut lambda, seed)?;

                let event = Event::Seeded {
                    variable: target,
                    timestep: *timestep,
                };
                if let Some(Action::Abort) = observer.observe(&event) {
                    return Err(Error::Aborted(index));
                }
            }

            if pending.remove(target) {
                let value = match &lambda {
                    Some(lambda) => lambda.clone(),
                    None => Vector::zeros(resolver.resolve(target)?.len()),
                };
                let event = Event::Control {
                    control: target,
                    norm: vector::norm(&value),
                };
                if let Some(Action::Abort) = observer.observe(&event) {
                    return Err(Error::Aborted(index));
                }
                gradient.insert(target.clone(), value);
            }

            let Some(lambda) = lambda.filter(|l| !vector::is_zero(l)) else {
                continue;
            };
            if equation.dependencies().is_empty() {
                continue;
            }

            let event = Event::Propagated {
                index,
                target,
                norm: vector::norm(&lambda),
            };
            if let Some(Action::Abort) = observer.observe(&event) {
                return Err(Error::Aborted(index));
            }

            let values = resolver.resolve_all(equation.dependencies())?;
            let refs: Vec<&Vector> = values.iter().collect();
            let output = sweep::block_output(equation, &resolver);
            for (b, block) in equation.blocks().iter().enumerate() {
                let inputs = equation.block_values(b, &refs);
                let variables = equation.block_variables(b);
                let contributions = block
                    .adjoint_actions(&inputs, output.as_ref(), &variables, &lambda)
                    .map_err(|err| Error::from_block(block.as_ref(), err))?;
                for (var, contribution) in variables.into_iter().zip(contributions) {
                    sweep::accumulate(&mut adjoints, var, contribution)?;
                }
            }
        }

        Ok(gradient)
    }

    /// Computes a gradient without observation.
    ///
    /// # Errors
    ///
    /// See [`Tape::compute_gradient`].
    pub fn compute_gradient_unobserved<F>(
        &mut self,
        functional: &F,
        controls: &[Variable],
    ) -> Result<Gradient, Error>
    where
        F: Functional + ?Sized,
    {
        self.compute_gradient(functional, controls, ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;
    use rewind_core::{ContractError, Direction, StateError};

    use crate::{
        FinalFunctional, Policy, State,
        blocks::{LinearCombination, Pointwise, Product},
    };

    fn cube(x: f64) -> f64 {
        x * x * x
    }

    fn cube_prime(x: f64) -> f64 {
        3.0 * x * x
    }

    #[test]
    fn chain_rule_through_linear_steps() {
        // x1 = 2 x0, x2 = x1 + 3 x0, J = ½ x2²
        let mut tape = Tape::default();
        let x0 = tape.register_initial_condition("x", array![1.0]).unwrap();
        let (x1, _) = tape.assign("x", LinearCombination::new([(x0.clone(), 2.0)])).unwrap();
        tape.assign("x", LinearCombination::new([(x1, 1.0), (x0.clone(), 3.0)]))
            .unwrap();

        let gradient = tape
            .compute_gradient_unobserved(&FinalFunctional::new("x"), &[x0.clone()])
            .unwrap();

        // x2 = 5 x0, dJ/dx0 = 25 x0
        assert_relative_eq!(gradient.get(&x0).unwrap()[0], 25.0);
        assert_eq!(tape.state(), State::Frozen);
    }

    #[test]
    fn nonlinear_blocks_and_multiple_controls() {
        let mut tape = Tape::default();
        let a = tape.register_initial_condition("a", array![2.0]).unwrap();
        let b = tape.register_initial_condition("b", array![3.0]).unwrap();
        let (c, _) = tape.assign("c", Product::new(a.clone(), b.clone())).unwrap();
        tape.assign("y", Pointwise::new("cube", c, cube, cube_prime))
            .unwrap();

        let gradient = tape
            .compute_gradient_unobserved(&FinalFunctional::new("y"), &[a.clone(), b.clone()])
            .unwrap();

        // y = (ab)³, J = ½ y², dJ/da = y · 3(ab)² · b
        let (av, bv) = (2.0_f64, 3.0_f64);
        let y = (av * bv).powi(3);
        let dy = 3.0 * (av * bv).powi(2);
        assert_relative_eq!(gradient.get(&a).unwrap()[0], y * dy * bv);
        assert_relative_eq!(gradient.get(&b).unwrap()[0], y * dy * av);
    }

    #[test]
    fn unrelated_control_gets_zero_gradient() {
        let mut tape = Tape::default();
        let x = tape.register_initial_condition("x", array![1.0]).unwrap();
        let p = tape.register_initial_condition("p", array![4.0, 5.0]).unwrap();
        tape.assign("y", LinearCombination::assign(x)).unwrap();

        let gradient = tape
            .compute_gradient_unobserved(&FinalFunctional::new("y"), &[p.clone()])
            .unwrap();
        assert_eq!(gradient.get(&p), Some(&array![0.0, 0.0]));
    }

    #[test]
    fn gradients_match_across_policies() {
        let run = |policy| {
            let mut tape = Tape::new(policy);
            let x0 = tape.register_initial_condition("x", array![0.5, -1.0]).unwrap();
            let mut x = x0.clone();
            for _ in 0..4 {
                let (next, _) = tape
                    .assign_blocks(
                        "x",
                        vec![
                            Box::new(LinearCombination::assign(x.clone())),
                            Box::new(Pointwise::new("cube", x, cube, cube_prime)),
                        ],
                    )
                    .unwrap();
                x = next;
            }
            tape.compute_gradient_unobserved(&FinalFunctional::new("x"), &[x0.clone()])
                .unwrap()
                .get(&x0)
                .cloned()
                .unwrap()
        };

        assert_eq!(run(Policy::StoreAll), run(Policy::StoreControlsOnly));
    }

    #[test]
    fn observer_sees_events_in_reverse_order() {
        let mut tape = Tape::default();
        let x0 = tape.register_initial_condition("x", array![1.0]).unwrap();
        tape.assign("x", LinearCombination::new([(x0.clone(), 2.0)])).unwrap();

        let mut log = Vec::new();
        tape.compute_gradient(&FinalFunctional::new("x"), &[x0], |event: &Event<'_>| {
            log.push(event.to_string());
            None
        })
        .unwrap();

        assert_eq!(
            log,
            vec![
                "adjoint: seeded x:0:1 at timestep 0",
                "adjoint: equation 1 (x:0:1) |λ| = 2e0",
                "adjoint: gradient for x:0:0 |dJ| = 4e0",
            ]
        );
    }

    #[test]
    fn observer_can_abort() {
        let mut tape = Tape::default();
        let x0 = tape.register_initial_condition("x", array![1.0]).unwrap();
        tape.assign("x", LinearCombination::assign(x0.clone())).unwrap();

        let err = tape
            .compute_gradient(&FinalFunctional::new("x"), &[x0], |_: &Event<'_>| {
                Some(Action::Abort)
            })
            .unwrap_err();
        assert_eq!(err, Error::Aborted(1));
    }

    #[test]
    fn missing_adjoint_names_the_block() {
        #[derive(Debug)]
        struct ForwardOnly(Vec<Variable>);

        impl rewind_core::Block for ForwardOnly {
            fn name(&self) -> &str {
                "forward only"
            }

            fn dependencies(&self) -> &[Variable] {
                &self.0
            }

            fn evaluate(&self, values: &[&Vector]) -> Result<Vector, rewind_core::BlockError> {
                Ok(values[0].clone())
            }

            fn derivative_action(
                &self,
                _values: &[&Vector],
                _variable: &Variable,
                seed: &Vector,
                transpose: bool,
            ) -> Result<Vector, rewind_core::BlockError> {
                if transpose {
                    Err(rewind_core::BlockError::NotImplemented(Direction::Adjoint))
                } else {
                    Ok(seed.clone())
                }
            }
        }

        let mut tape = Tape::default();
        let x0 = tape.register_initial_condition("x", array![1.0]).unwrap();
        tape.assign("x", ForwardOnly(vec![x0.clone()])).unwrap();

        let err = tape
            .compute_gradient_unobserved(&FinalFunctional::new("x"), &[x0])
            .unwrap_err();
        assert_eq!(
            err,
            Error::NotImplemented {
                block: "forward only".into(),
                direction: Direction::Adjoint,
            }
        );
    }

    #[test]
    fn unknown_control_is_rejected_and_tape_stays_frozen() {
        let mut tape = Tape::default();
        tape.register_initial_condition("x", array![1.0]).unwrap();
        let ghost = Variable::new("ghost", 0, 0);

        let err = tape
            .compute_gradient_unobserved(&FinalFunctional::new("x"), &[ghost.clone()])
            .unwrap_err();
        assert_eq!(err, Error::UnknownVariable(ghost));
        assert_eq!(
            tape.register_initial_condition("y", array![1.0]),
            Err(Error::State(StateError::Frozen))
        );
    }

    #[test]
    fn functional_shape_errors_surface() {
        let mut tape = Tape::default();
        let x = tape.register_initial_condition("x", array![1.0, 2.0]).unwrap();
        let functional = FinalFunctional::new("x").with_reference(array![1.0]);

        let err = tape.compute_gradient_unobserved(&functional, &[x]).unwrap_err();
        assert!(matches!(err, Error::Contract(ContractError::ShapeMismatch { .. })));
    }
}
