use std::collections::{BTreeSet, HashMap, HashSet};

use rewind_core::{Block, Registry, StateError, Variable, Vector};

use crate::{
    Checkpoint, Equation, Error, MemoryStore, Policy, Record, Store, blocks::Constant,
    equation, recompute::Resolver,
};

/// Whether a tape accepts new equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Equations may be registered.
    Building,

    /// A replay or derivative sweep has run. Only [`Tape::clear`] returns the
    /// tape to [`State::Building`].
    Frozen,
}

/// An ordered record of equations and the values they produced.
///
/// Equations are registered in the order the forward computation performs
/// them, and every dependency must already be known when an equation is
/// registered. Registration order is therefore a topological order, which is
/// what the replay and derivative sweeps walk.
#[derive(Debug)]
pub struct Tape<S = MemoryStore> {
    pub(crate) policy: Policy,
    pub(crate) state: State,
    pub(crate) registry: Registry,
    pub(crate) equations: Vec<Equation>,
    pub(crate) producers: HashMap<Variable, usize>,
    pub(crate) store: S,
    pub(crate) retained: HashSet<Variable>,
    pub(crate) controls: BTreeSet<Variable>,
}

impl Tape {
    /// Creates an empty tape backed by a [`MemoryStore`].
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self::with_store(policy, MemoryStore::new())
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}

impl<S: Store> Tape<S> {
    /// Creates an empty tape backed by `store`.
    ///
    /// Any values already in the store are discarded.
    pub fn with_store(policy: Policy, mut store: S) -> Self {
        store.clear();
        Self {
            policy,
            state: State::Building,
            registry: Registry::new(),
            equations: Vec::new(),
            producers: HashMap::new(),
            store,
            retained: HashSet::new(),
            controls: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    /// Returns the index of the equation that produces `variable`.
    #[must_use]
    pub fn producer(&self, variable: &Variable) -> Option<usize> {
        self.producers.get(variable).copied()
    }

    /// Returns true if an equation produces `variable`.
    #[must_use]
    pub fn is_known(&self, variable: &Variable) -> bool {
        self.producers.contains_key(variable)
    }

    /// The variables marked as controls, in version order.
    pub fn controls(&self) -> impl Iterator<Item = &Variable> {
        self.controls.iter()
    }

    /// Allocates the next version of `name`.
    pub fn next(&mut self, name: &str) -> Variable {
        self.registry.next(name)
    }

    /// Allocates the next version of `name` as an auxiliary variable.
    pub fn next_auxiliary(&mut self, name: &str) -> Variable {
        self.registry.next_auxiliary(name)
    }

    /// Returns the latest allocated version of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownName`] if `name` was never allocated.
    pub fn current(&self, name: &str) -> Result<Variable, Error> {
        self.registry
            .current(name)
            .ok_or_else(|| Error::UnknownName(name.to_owned()))
    }

    /// Rolls back trailing versions of `name` that were never registered.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForgetKnown`] if the latest version is known.
    pub fn forget(&mut self, name: &str) -> Result<usize, Error> {
        let producers = &self.producers;
        Ok(self
            .registry
            .forget(name, |var| producers.contains_key(var))?)
    }

    /// Sets the start time of the first timestep.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::TimelineStarted`] once the timeline has advanced.
    pub fn start_timestep(&mut self, time: f64) -> Result<(), Error> {
        Ok(self.registry.start_timestep(time)?)
    }

    /// Ends the current timestep at `time`, returning the new timestep.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::TimelineFinished`] after the final increment.
    pub fn increment_timestep(&mut self, time: f64, finished: bool) -> Result<usize, Error> {
        Ok(self.registry.increment_timestep(time, finished)?)
    }

    /// Registers an equation and returns the handle used to record its value.
    ///
    /// # Errors
    ///
    /// Returns an error if the tape is frozen, the equation has no blocks, the
    /// target is already known or is not the latest version of its name, or a
    /// dependency is unknown.
    pub fn register_equation(&mut self, equation: Equation) -> Result<Checkpoint, Error> {
        self.ensure_building()?;

        let target = equation.target();
        if equation.blocks().is_empty() {
            return Err(rewind_core::ContractError::EmptyEquation(target.clone()).into());
        }
        if self.is_known(target) {
            return Err(StateError::AlreadyKnown(target.clone()).into());
        }
        if self.registry.current(target.name()).as_ref() != Some(target) {
            return Err(StateError::Stale(target.clone()).into());
        }
        if let Some(dep) = equation.dependencies().iter().find(|d| !self.is_known(d)) {
            return Err(Error::UnknownVariable(dep.clone()));
        }

        let checkpoint = Checkpoint {
            index: self.equations.len(),
            target: target.clone(),
            retain: self.policy == Policy::StoreAll
                || target.is_auxiliary()
                || self.retained.contains(target),
        };
        self.producers.insert(target.clone(), checkpoint.index);
        self.equations.push(equation);
        Ok(checkpoint)
    }

    /// Records the value an equation produced.
    ///
    /// The value is stored if the storage policy retains it. Returns true if
    /// it was stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if the handle does not belong to
    /// this tape.
    pub fn record(&mut self, checkpoint: &Checkpoint, value: Vector) -> Result<bool, Error> {
        self.check_handle(checkpoint)?;
        if checkpoint.retain {
            self.store.put(checkpoint.target.clone(), value);
        }
        Ok(checkpoint.retain)
    }

    /// Records and retains a value regardless of the storage policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if the handle does not belong to
    /// this tape.
    pub fn do_checkpoint(&mut self, checkpoint: &Checkpoint, value: Vector) -> Result<(), Error> {
        self.check_handle(checkpoint)?;
        self.retained.insert(checkpoint.target.clone());
        self.store.put(checkpoint.target.clone(), value);
        Ok(())
    }

    /// Registers the first value of a quantity and returns its variable.
    ///
    /// Initial conditions are retained under every policy.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Frozen`] if the tape is frozen.
    pub fn register_initial_condition(&mut self, name: &str, value: Vector) -> Result<Variable, Error> {
        self.ensure_building()?;
        let target = self.registry.next(name);
        let equation = Equation::single(target.clone(), Constant::new(value.clone()));
        let checkpoint = self.register_equation(equation)?;
        self.do_checkpoint(&checkpoint, value)?;
        Ok(target)
    }

    /// Marks a known variable as a control.
    ///
    /// Controls are retained under every policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if the variable is not known.
    pub fn mark_control(&mut self, variable: &Variable) -> Result<(), Error> {
        if !self.is_known(variable) {
            return Err(Error::UnknownVariable(variable.clone()));
        }
        if !self.store.contains(variable) {
            let value = self.value(variable)?;
            self.store.put(variable.clone(), value);
        }
        self.retained.insert(variable.clone());
        self.controls.insert(variable.clone());
        Ok(())
    }

    /// Evaluates `block` into a new version of `name`, registering and
    /// recording it.
    ///
    /// The block's dependencies are resolved before the new version is
    /// allocated, so a block reading the current version of `name` sees the
    /// previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the tape is frozen, a dependency is unknown, or
    /// the block fails. On failure the allocated version is rolled back.
    pub fn assign(&mut self, name: &str, block: impl Block + 'static) -> Result<(Variable, Vector), Error> {
        self.assign_blocks(name, vec![Box::new(block)])
    }

    /// Like [`Tape::assign`], with the sum of several blocks.
    ///
    /// # Errors
    ///
    /// See [`Tape::assign`].
    pub fn assign_blocks(
        &mut self,
        name: &str,
        blocks: Vec<Box<dyn Block>>,
    ) -> Result<(Variable, Vector), Error> {
        self.annotate(name, blocks, false)
    }

    /// Like [`Tape::assign`], but the result is retained under every policy.
    ///
    /// # Errors
    ///
    /// See [`Tape::assign`].
    pub fn assign_checkpointed(
        &mut self,
        name: &str,
        block: impl Block + 'static,
    ) -> Result<(Variable, Vector), Error> {
        self.annotate(name, vec![Box::new(block)], true)
    }

    /// Returns the value of a known variable, recomputing it if needed.
    ///
    /// Does not freeze the tape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if the variable is not known, or any
    /// error raised while recomputing it.
    pub fn value(&self, variable: &Variable) -> Result<Vector, Error> {
        Resolver::new(self).resolve(variable)
    }

    /// Reports whether a known variable is stored or must be recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if the variable is not known.
    pub fn storage(&self, variable: &Variable) -> Result<Record, Error> {
        if !self.is_known(variable) {
            return Err(Error::UnknownVariable(variable.clone()));
        }
        Ok(self
            .store
            .get(variable)
            .map_or(Record::Recompute, |value| Record::Stored(value.clone())))
    }

    /// Discards every equation, value, and version and returns to
    /// [`State::Building`].
    pub fn clear(&mut self) {
        self.state = State::Building;
        self.registry = Registry::new();
        self.equations.clear();
        self.producers.clear();
        self.store.clear();
        self.retained.clear();
        self.controls.clear();
    }

    pub(crate) fn freeze(&mut self) {
        self.state = State::Frozen;
    }

    pub(crate) fn ensure_known<'v, I>(&self, variables: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'v Variable>,
    {
        match variables.into_iter().find(|var| !self.is_known(var)) {
            Some(var) => Err(Error::UnknownVariable(var.clone())),
            None => Ok(()),
        }
    }

    fn ensure_building(&self) -> Result<(), Error> {
        match self.state {
            State::Building => Ok(()),
            State::Frozen => Err(StateError::Frozen.into()),
        }
    }

    fn check_handle(&self, checkpoint: &Checkpoint) -> Result<(), Error> {
        match self.equations.get(checkpoint.index) {
            Some(eq) if *eq.target() == checkpoint.target => Ok(()),
            _ => Err(Error::UnknownVariable(checkpoint.target.clone())),
        }
    }

    fn annotate(
        &mut self,
        name: &str,
        blocks: Vec<Box<dyn Block>>,
        force: bool,
    ) -> Result<(Variable, Vector), Error> {
        self.ensure_building()?;

        let dependencies = equation::union(&blocks);
        self.ensure_known(&dependencies)?;
        let values = {
            let mut resolver = Resolver::new(self);
            resolver.resolve_all(&dependencies)?
        };

        let target = self.registry.next(name);
        let equation = Equation::new(target.clone(), blocks);
        let refs: Vec<&Vector> = values.iter().collect();
        let value = match equation.evaluate(&refs) {
            Ok(value) => value,
            Err(err) => {
                self.forget(name)?;
                return Err(err);
            }
        };

        let checkpoint = self.register_equation(equation)?;
        if force {
            self.do_checkpoint(&checkpoint, value.clone())?;
        } else {
            self.record(&checkpoint, value.clone())?;
        }
        Ok((target, value))
    }
}
