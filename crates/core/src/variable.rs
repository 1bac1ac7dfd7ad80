use std::fmt;

/// A named quantity at a specific version.
///
/// Variables are immutable value keys. Two variables with the same name but a
/// different `(timestep, iteration)` are distinct nodes on a tape.
///
/// Variables are ordered by `(timestep, iteration)` with the name as a
/// secondary key, and equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    // Field order drives the derived ordering.
    timestep: usize,
    iteration: usize,
    name: String,
    auxiliary: bool,
}

impl Variable {
    /// Creates a variable for `name` at the given version.
    #[must_use]
    pub fn new(name: impl Into<String>, timestep: usize, iteration: usize) -> Self {
        Self {
            timestep,
            iteration,
            name: name.into(),
            auxiliary: false,
        }
    }

    /// Creates an auxiliary variable for `name` at the given version.
    ///
    /// Auxiliary variables hold values supplied from outside the tape, so
    /// storage policies always retain them.
    #[must_use]
    pub fn auxiliary(name: impl Into<String>, timestep: usize, iteration: usize) -> Self {
        Self {
            auxiliary: true,
            ..Self::new(name, timestep, iteration)
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    #[must_use]
    pub fn is_auxiliary(&self) -> bool {
        self.auxiliary
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.timestep, self.iteration)?;
        if self.auxiliary {
            write!(f, ":aux")?;
        }
        Ok(())
    }
}
