//! Bookkeeping shared by the derivative sweeps.

use std::collections::HashMap;

use rewind_core::{Functional, Registry, Variable, Vector, vector};

use crate::{Equation, Error, Store, recompute::Resolver};

/// Where a functional reads each variable.
///
/// Maps every variable the functional depends on to the timesteps at which
/// it is read, along with the full dependency list at that timestep.
pub(crate) struct Seeds {
    reads: HashMap<Variable, Vec<(usize, Vec<Variable>)>>,
}

impl Seeds {
    pub(crate) fn collect<F: Functional + ?Sized>(functional: &F, registry: &Registry) -> Self {
        let mut reads: HashMap<Variable, Vec<(usize, Vec<Variable>)>> = HashMap::new();
        for timestep in 0..=registry.timestep() {
            let deps = functional.dependencies(timestep, registry);
            let mut seen: Vec<&Variable> = Vec::new();
            for dep in &deps {
                if !seen.contains(&dep) {
                    seen.push(dep);
                    reads
                        .entry(dep.clone())
                        .or_default()
                        .push((timestep, deps.clone()));
                }
            }
        }
        Self { reads }
    }

    /// The `(timestep, dependencies)` pairs at which `variable` is read.
    pub(crate) fn reads(&self, variable: &Variable) -> &[(usize, Vec<Variable>)] {
        self.reads.get(variable).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.reads.keys()
    }
}

/// Adds `value` into the entry for `variable`.
pub(crate) fn accumulate(
    into: &mut HashMap<Variable, Vector>,
    variable: &Variable,
    value: Vector,
) -> Result<(), Error> {
    match into.get_mut(variable) {
        Some(acc) => vector::add_assign(acc, &value)?,
        None => {
            into.insert(variable.clone(), value);
        }
    }
    Ok(())
}

/// Adds `value` into an optional running total.
pub(crate) fn add_into(total: &mut Option<Vector>, value: Vector) -> Result<(), Error> {
    match total.as_mut() {
        Some(acc) => vector::add_assign(acc, &value)?,
        None => *total = Some(value),
    }
    Ok(())
}

/// The recorded value of a single-block equation's target, if it is at hand.
///
/// A block's own output is its equation's target only when it is the sole
/// block. Targets that would need recomputing are not offered.
pub(crate) fn block_output<S: Store>(
    equation: &Equation,
    resolver: &Resolver<'_, S>,
) -> Option<Vector> {
    if equation.blocks().len() == 1 {
        resolver.peek(equation.target()).cloned()
    } else {
        None
    }
}
