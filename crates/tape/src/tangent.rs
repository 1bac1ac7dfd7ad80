//! Forward sweep computing directional derivatives.

use std::collections::HashMap;

use rewind_core::{Functional, Variable, Vector, vector};

use crate::{Error, Store, Tape, recompute::Resolver, sweep};

impl<S: Store> Tape<S> {
    /// Computes the derivative of `functional` in the given direction.
    ///
    /// `direction` perturbs the listed variables; each is treated as
    /// independent, so the equation that produced it is not differentiated.
    /// Only equations downstream of the perturbed variables are visited.
    /// Freezes the tape.
    ///
    /// # Errors
    ///
    /// Returns an error if a perturbed variable is unknown, a perturbation has
    /// the wrong length, or a block lacks a tangent-linear derivative.
    pub fn compute_tangent<F>(
        &mut self,
        functional: &F,
        direction: &[(Variable, Vector)],
    ) -> Result<f64, Error>
    where
        F: Functional + ?Sized,
    {
        self.freeze();
        let tape = &*self;
        tape.ensure_known(direction.iter().map(|(var, _)| var))?;

        let mut resolver = Resolver::new(tape);
        let tangents = tangent_sweep(tape, &mut resolver, direction)?;

        let registry = &tape.registry;
        let mut total = 0.0;
        for timestep in 0..=registry.timestep() {
            let deps = functional.dependencies(timestep, registry);
            let perturbed: Vec<&Variable> = deps.iter().filter(|d| tangents.contains_key(*d)).collect();
            if perturbed.is_empty() {
                continue;
            }

            let values = resolver.resolve_all(&deps)?;
            let refs: Vec<&Vector> = values.iter().collect();
            let mut seen: Vec<&Variable> = Vec::new();
            for var in perturbed {
                if seen.contains(&var) {
                    continue;
                }
                seen.push(var);
                let gradient = functional.derivative(timestep, registry, var, &deps, &refs)?;
                total += vector::inner(&gradient, &tangents[var])?;
            }
        }
        Ok(total)
    }
}

/// Propagates `direction` forward through every downstream equation.
///
/// Returns the tangent of every variable that depends on the perturbation,
/// including the perturbed variables themselves.
pub(crate) fn tangent_sweep<S: Store>(
    tape: &Tape<S>,
    resolver: &mut Resolver<'_, S>,
    direction: &[(Variable, Vector)],
) -> Result<HashMap<Variable, Vector>, Error> {
    let mut tangents: HashMap<Variable, Vector> = HashMap::new();
    let mut roots = Vec::with_capacity(direction.len());
    for (var, delta) in direction {
        let value = resolver.resolve(var)?;
        rewind_core::ContractError::check_len(value.len(), delta.len())?;
        sweep::accumulate(&mut tangents, var, delta.clone())?;
        if let Some(index) = tape.producer(var) {
            roots.push(index);
        }
    }

    let graph = tape.graph();
    for index in graph.downstream_of(&roots) {
        let equation = &tape.equations[index];
        if direction.iter().any(|(var, _)| var == equation.target()) {
            continue;
        }

        let values = resolver.resolve_all(equation.dependencies())?;
        let refs: Vec<&Vector> = values.iter().collect();
        let mut delta: Option<Vector> = None;
        for (b, block) in equation.blocks().iter().enumerate() {
            let inputs = equation.block_values(b, &refs);
            for var in equation.block_variables(b) {
                let Some(seed) = tangents.get(var) else {
                    continue;
                };
                let contribution = block
                    .derivative_action(&inputs, var, seed, false)
                    .map_err(|err| Error::from_block(block.as_ref(), err))?;
                sweep::add_into(&mut delta, contribution)?;
            }
        }

        if let Some(delta) = delta {
            tangents.insert(equation.target().clone(), delta);
        }
    }
    Ok(tangents)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;
    use rewind_core::ContractError;

    use crate::{
        Error, FinalFunctional, Tape,
        blocks::{LinearCombination, MatVec, Pointwise},
    };

    fn exp(x: f64) -> f64 {
        x.exp()
    }

    #[test]
    fn tangent_matches_gradient_projection() {
        let mut tape = Tape::default();
        let x0 = tape.register_initial_condition("x", array![0.1, 0.2]).unwrap();
        let (x1, _) = tape
            .assign("x", MatVec::new(array![[1.0, 2.0], [-1.0, 0.5]], x0.clone()))
            .unwrap();
        tape.assign("x", Pointwise::new("exp", x1, exp, exp)).unwrap();

        let functional = FinalFunctional::new("x");
        let direction = array![0.3, -0.7];
        let tangent = tape
            .compute_tangent(&functional, &[(x0.clone(), direction.clone())])
            .unwrap();
        let gradient = tape
            .compute_gradient_unobserved(&functional, &[x0.clone()])
            .unwrap();

        assert_relative_eq!(
            tangent,
            gradient.get(&x0).unwrap().dot(&direction),
            max_relative = 1e-12
        );
    }

    #[test]
    fn unrelated_direction_gives_zero() {
        let mut tape = Tape::default();
        let x = tape.register_initial_condition("x", array![1.0]).unwrap();
        let p = tape.register_initial_condition("p", array![1.0]).unwrap();
        tape.assign("y", LinearCombination::assign(x)).unwrap();

        let tangent = tape
            .compute_tangent(&FinalFunctional::new("y"), &[(p, array![1.0])])
            .unwrap();
        assert_eq!(tangent, 0.0);
    }

    #[test]
    fn perturbation_length_is_checked() {
        let mut tape = Tape::default();
        let x = tape.register_initial_condition("x", array![1.0, 2.0]).unwrap();

        let err = tape
            .compute_tangent(&FinalFunctional::new("x"), &[(x, array![1.0])])
            .unwrap_err();
        assert_eq!(
            err,
            Error::Contract(ContractError::ShapeMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn intermediate_perturbation_is_independent() {
        // y = 3 x1 with x1 = 2 x0; perturbing x1 ignores how it was produced.
        let mut tape = Tape::default();
        let x0 = tape.register_initial_condition("x", array![1.0]).unwrap();
        let (x1, _) = tape.assign("x", LinearCombination::new([(x0, 2.0)])).unwrap();
        tape.assign("y", LinearCombination::new([(x1.clone(), 3.0)])).unwrap();

        // J = ½ y², dJ = y · 3 · δx1 = 6 · 3 · 0.5
        let tangent = tape
            .compute_tangent(&FinalFunctional::new("y"), &[(x1, array![0.5])])
            .unwrap();
        assert_relative_eq!(tangent, 9.0);
    }
}
