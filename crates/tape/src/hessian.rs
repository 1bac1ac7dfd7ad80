//! Second-order adjoint sweep for Hessian actions.
//!
//! A Hessian action is computed as a tangent-linear sweep in the given
//! direction followed by a reverse sweep that carries two adjoints: the
//! first-order adjoint `λ` and the second-order adjoint `ζ`. For each
//! equation `y = F(x)` processed in reverse,
//!
//! ```text
//! λ_x += (∂F/∂x)ᵀ λ_y
//! ζ_x += (∂F/∂x)ᵀ ζ_y + Σ_u (∂²F/∂u∂x)ᵀ(δu, λ_y)
//! ```
//!
//! where `δu` is the tangent of each dependency `u`. The functional adds its
//! own second derivative to `ζ` where it seeds `λ`.

use std::collections::{BTreeSet, HashMap};

use rewind_core::{BlockError, Functional, Variable, Vector, vector};

use crate::{
    Error, Gradient, Store, Tape,
    recompute::Resolver,
    sweep::{self, Seeds},
    tangent::tangent_sweep,
};

impl<S: Store> Tape<S> {
    /// Computes the action of the Hessian of `functional` on `direction`,
    /// keyed by control.
    ///
    /// `direction` pairs each control with its perturbation. Blocks that
    /// return no second derivative contribute nothing beyond their first
    /// derivatives. Freezes the tape.
    ///
    /// # Errors
    ///
    /// Returns an error if a control is unknown, `direction` does not match
    /// `controls` in length, or a block lacks a required derivative.
    pub fn hessian_action<F>(
        &mut self,
        functional: &F,
        controls: &[Variable],
        direction: &[Vector],
    ) -> Result<Gradient, Error>
    where
        F: Functional + ?Sized,
    {
        self.freeze();
        let tape = &*self;
        tape.ensure_known(controls)?;
        rewind_core::ContractError::check_len(controls.len(), direction.len())?;

        let seeds = Seeds::collect(functional, &tape.registry);
        tape.ensure_known(seeds.variables())?;

        let perturbation: Vec<(Variable, Vector)> = controls
            .iter()
            .cloned()
            .zip(direction.iter().cloned())
            .collect();

        let mut resolver = Resolver::new(tape);
        let tangents = tangent_sweep(tape, &mut resolver, &perturbation)?;

        let mut pending: BTreeSet<&Variable> = controls.iter().collect();
        let mut first: HashMap<Variable, Vector> = HashMap::new();
        let mut second: HashMap<Variable, Vector> = HashMap::new();
        let mut result = Gradient::default();

        for (index, equation) in tape.equations.iter().enumerate().rev() {
            if pending.is_empty() {
                break;
            }
            resolver.evict_from(index + 1);

            let target = equation.target();
            let mut lambda = first.remove(target);
            let mut zeta = second.remove(target);

            for (timestep, deps) in seeds.reads(target) {
                let values = resolver.resolve_all(deps)?;
                let refs: Vec<&Vector> = values.iter().collect();
                let registry = &tape.registry;

                let seed = functional.derivative(*timestep, registry, target, deps, &refs)?;
                sweep::add_into(&mut lambda, seed)?;

                for inner in distinct(deps) {
                    let Some(delta) = tangents.get(inner) else {
                        continue;
                    };
                    if let Some(term) = functional.second_derivative(
                        *timestep, registry, target, deps, &refs, inner, delta,
                    )? {
                        sweep::add_into(&mut zeta, term)?;
                    }
                }
            }

            if pending.remove(target) {
                let value = match &zeta {
                    Some(zeta) => zeta.clone(),
                    None => Vector::zeros(resolver.resolve(target)?.len()),
                };
                result.insert(target.clone(), value);
            }

            let lambda = lambda.filter(|l| !vector::is_zero(l));
            let zeta = zeta.filter(|z| !vector::is_zero(z));
            if (lambda.is_none() && zeta.is_none()) || equation.dependencies().is_empty() {
                continue;
            }

            let values = resolver.resolve_all(equation.dependencies())?;
            let refs: Vec<&Vector> = values.iter().collect();
            let output = sweep::block_output(equation, &resolver);
            for (b, block) in equation.blocks().iter().enumerate() {
                let inputs = equation.block_values(b, &refs);
                let variables = equation.block_variables(b);
                let fail = |err: BlockError| Error::from_block(block.as_ref(), err);

                if let Some(lambda) = &lambda {
                    let terms = block
                        .adjoint_actions(&inputs, output.as_ref(), &variables, lambda)
                        .map_err(fail)?;
                    for (&outer, term) in variables.iter().zip(terms) {
                        sweep::accumulate(&mut first, outer, term)?;
                    }

                    for &outer in &variables {
                        for &inner in &variables {
                            let Some(delta) = tangents.get(inner) else {
                                continue;
                            };
                            let term = block
                                .second_derivative_action(&inputs, inner, delta, outer, true, lambda)
                                .map_err(fail)?;
                            if let Some(term) = term {
                                sweep::accumulate(&mut second, outer, term)?;
                            }
                        }
                    }
                }

                if let Some(zeta) = &zeta {
                    let terms = block
                        .adjoint_actions(&inputs, output.as_ref(), &variables, zeta)
                        .map_err(fail)?;
                    for (&outer, term) in variables.iter().zip(terms) {
                        sweep::accumulate(&mut second, outer, term)?;
                    }
                }
            }
        }

        Ok(result)
    }
}

fn distinct(vars: &[Variable]) -> Vec<&Variable> {
    let mut seen: Vec<&Variable> = Vec::new();
    for var in vars {
        if !seen.contains(&var) {
            seen.push(var);
        }
    }
    seen
}
