use std::collections::HashMap;

use rewind_core::{Variable, Vector};

/// Which forward values a tape keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Policy {
    /// Every recorded value is stored.
    #[default]
    StoreAll,

    /// Only initial conditions, controls, auxiliary variables, and forced
    /// checkpoints are stored. Everything else is recomputed on demand.
    StoreControlsOnly,
}

/// Whether a variable's value is held or must be recomputed.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Stored(Vector),
    Recompute,
}

/// Backing storage for recorded values.
///
/// The tape decides what to keep; a store only holds it.
pub trait Store {
    fn get(&self, variable: &Variable) -> Option<&Vector>;

    fn put(&mut self, variable: Variable, value: Vector);

    fn remove(&mut self, variable: &Variable) -> Option<Vector>;

    fn len(&self) -> usize;

    fn clear(&mut self);

    fn contains(&self, variable: &Variable) -> bool {
        self.get(variable).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory [`Store`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<Variable, Vector>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, variable: &Variable) -> Option<&Vector> {
        self.values.get(variable)
    }

    fn put(&mut self, variable: Variable, value: Vector) {
        self.values.insert(variable, value);
    }

    fn remove(&mut self, variable: &Variable) -> Option<Vector> {
        self.values.remove(variable)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// A handle to a registered equation, used to record its value.
///
/// Whether [`Tape::record`](crate::Tape::record) keeps the value is fixed
/// when the equation is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub(crate) index: usize,
    pub(crate) target: Variable,
    pub(crate) retain: bool,
}

impl Checkpoint {
    /// The equation's position in the tape.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn target(&self) -> &Variable {
        &self.target
    }

    /// Returns true if recording through this handle stores the value.
    #[must_use]
    pub fn should_retain(&self) -> bool {
        self.retain
    }
}
