use std::collections::HashMap;

use crate::{StateError, Variable};

/// Timestep boundaries recorded while a forward solve advances in time.
///
/// Timestep `0` spans `[start, end(0)]`, timestep `t` spans
/// `[end(t - 1), end(t)]`. The start time defaults to `0.0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    start: f64,
    ends: Vec<f64>,
    finished: bool,
}

impl Timeline {
    /// Returns the current timestep.
    #[must_use]
    pub fn current(&self) -> usize {
        self.ends.len()
    }

    /// Returns true once an increment has been marked as the final one.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the time at which the first timestep starts.
    #[must_use]
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Returns the time at which `timestep` ended, if it has ended.
    #[must_use]
    pub fn end(&self, timestep: usize) -> Option<f64> {
        self.ends.get(timestep).copied()
    }

    /// Returns the width of a completed timestep.
    #[must_use]
    pub fn width(&self, timestep: usize) -> Option<f64> {
        let end = self.end(timestep)?;
        let begin = match timestep {
            0 => self.start,
            t => self.ends[t - 1],
        };
        Some(end - begin)
    }

    fn start_at(&mut self, time: f64) -> Result<(), StateError> {
        if !self.ends.is_empty() {
            return Err(StateError::TimelineStarted(self.current()));
        }
        self.start = time;
        Ok(())
    }

    fn advance(&mut self, time: f64, finished: bool) -> Result<usize, StateError> {
        if self.finished {
            return Err(StateError::TimelineFinished(self.current()));
        }
        self.ends.push(time);
        self.finished = finished;
        Ok(self.current())
    }
}

/// Allocates versions of named quantities.
///
/// Each call to [`Registry::next`] allocates a new version of a name bound to
/// the current timestep. Iterations count every version ever allocated for a
/// name, so the `(timestep, iteration)` pair is strictly increasing per name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    versions: HashMap<String, Vec<Variable>>,
    timeline: Timeline,
}

impl Registry {
    /// Creates an empty registry at timestep zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next version of `name`.
    pub fn next(&mut self, name: &str) -> Variable {
        self.allocate(name, false)
    }

    /// Allocates the next version of `name` as an auxiliary variable.
    pub fn next_auxiliary(&mut self, name: &str) -> Variable {
        self.allocate(name, true)
    }

    /// Returns the most recently allocated version of `name`.
    #[must_use]
    pub fn current(&self, name: &str) -> Option<Variable> {
        self.versions.get(name).and_then(|h| h.last()).cloned()
    }

    /// Returns every version allocated for `name`, oldest first.
    #[must_use]
    pub fn history(&self, name: &str) -> &[Variable] {
        self.versions.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns the newest version of `name` allocated at or before `timestep`.
    ///
    /// This is the version that holds the quantity's value during that
    /// timestep.
    #[must_use]
    pub fn latest_at(&self, name: &str, timestep: usize) -> Option<Variable> {
        self.history(name)
            .iter()
            .rev()
            .find(|var| var.timestep() <= timestep)
            .cloned()
    }

    /// Iterates over every name the registry has seen.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// Rolls back the trailing versions of `name` that are not known.
    ///
    /// Used when a candidate assignment is rejected, so that it does not
    /// perturb version numbering. Returns the number of versions removed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForgetKnown`] if the latest version of `name` is
    /// known according to `is_known`.
    pub fn forget<F>(&mut self, name: &str, is_known: F) -> Result<usize, StateError>
    where
        F: Fn(&Variable) -> bool,
    {
        let Some(history) = self.versions.get_mut(name) else {
            return Ok(0);
        };

        if let Some(latest) = history.last()
            && is_known(latest)
        {
            return Err(StateError::ForgetKnown(latest.clone()));
        }

        let keep = history
            .iter()
            .rposition(|var| is_known(var))
            .map_or(0, |index| index + 1);
        let removed = history.len() - keep;
        history.truncate(keep);

        if history.is_empty() {
            self.versions.remove(name);
        }
        Ok(removed)
    }

    /// Returns the current timestep.
    #[must_use]
    pub fn timestep(&self) -> usize {
        self.timeline.current()
    }

    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Sets the start time of the first timestep.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::TimelineStarted`] once the timeline has advanced.
    pub fn start_timestep(&mut self, time: f64) -> Result<(), StateError> {
        self.timeline.start_at(time)
    }

    /// Ends the current timestep at `time` and moves to the next one.
    ///
    /// Passing `finished = true` marks the final timestep, which lets
    /// finish-time functionals detect the end of the sweep. Returns the new
    /// current timestep.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::TimelineFinished`] if the timeline is finished.
    pub fn increment_timestep(&mut self, time: f64, finished: bool) -> Result<usize, StateError> {
        self.timeline.advance(time, finished)
    }

    fn allocate(&mut self, name: &str, auxiliary: bool) -> Variable {
        let timestep = self.timeline.current();
        let history = self.versions.entry(name.to_owned()).or_default();
        let iteration = history.last().map_or(0, |var| var.iteration() + 1);

        let var = if auxiliary {
            Variable::auxiliary(name, timestep, iteration)
        } else {
            Variable::new(name, timestep, iteration)
        };
        history.push(var.clone());
        var
    }
}
