//! On-demand recomputation of values the storage policy did not keep.

use std::collections::HashMap;

use rewind_core::{Variable, Vector};

use crate::{Error, Store, Tape};

/// Resolves variable values from the store, recomputing missing ones.
///
/// Recomputation replays only the equations between the requested value and
/// the nearest stored ancestors. Recomputed values are cached for the
/// lifetime of the resolver; sweeps evict entries they no longer need.
pub(crate) struct Resolver<'t, S> {
    tape: &'t Tape<S>,
    cache: HashMap<Variable, Vector>,
    #[cfg_attr(not(test), allow(dead_code))]
    recomputed: usize,
}

impl<'t, S: Store> Resolver<'t, S> {
    pub(crate) fn new(tape: &'t Tape<S>) -> Self {
        Self {
            tape,
            cache: HashMap::new(),
            recomputed: 0,
        }
    }

    /// Returns the value of `variable`.
    pub(crate) fn resolve(&mut self, variable: &Variable) -> Result<Vector, Error> {
        if let Some(value) = self.lookup(variable) {
            return Ok(value.clone());
        }

        let tape = self.tape;

        // Explicit stack so long chains of unstored values do not recurse.
        let mut stack = vec![variable.clone()];
        while let Some(top) = stack.last() {
            if self.lookup(top).is_some() {
                stack.pop();
                continue;
            }

            let index = tape
                .producer(top)
                .ok_or_else(|| Error::UnknownVariable(top.clone()))?;
            let equation = &tape.equations[index];

            let missing: Vec<Variable> = equation
                .dependencies()
                .iter()
                .filter(|dep| self.lookup(dep).is_none())
                .cloned()
                .collect();
            if !missing.is_empty() {
                stack.extend(missing);
                continue;
            }

            let values: Vec<&Vector> = equation
                .dependencies()
                .iter()
                .filter_map(|dep| self.lookup(dep))
                .collect();
            let value = equation.evaluate(&values)?;
            self.recomputed += 1;

            let target = equation.target().clone();
            stack.pop();
            self.cache.insert(target, value);
        }

        self.lookup(variable)
            .cloned()
            .ok_or_else(|| Error::UnknownVariable(variable.clone()))
    }

    /// Returns the values of `variables`, in order.
    pub(crate) fn resolve_all(&mut self, variables: &[Variable]) -> Result<Vec<Vector>, Error> {
        variables.iter().map(|var| self.resolve(var)).collect()
    }

    /// Drops cached values produced by equations at or after `index`.
    pub(crate) fn evict_from(&mut self, index: usize) {
        let producers = &self.tape.producers;
        self.cache
            .retain(|var, _| producers.get(var).is_some_and(|&i| i < index));
    }

    /// Returns the value of `variable` only if it needs no recomputation.
    pub(crate) fn peek(&self, variable: &Variable) -> Option<&Vector> {
        self.lookup(variable)
    }

    /// The number of equations evaluated to fill in missing values.
    #[cfg(test)]
    pub(crate) fn recomputed(&self) -> usize {
        self.recomputed
    }

    fn lookup(&self, variable: &Variable) -> Option<&Vector> {
        self.tape
            .store
            .get(variable)
            .or_else(|| self.cache.get(variable))
    }
}
