//! Forward replay of a recorded tape.
//!
//! Replaying re-evaluates every equation from scratch in registration order.
//! Where the tape holds a recorded value, the replayed value is compared
//! against it, so a replay doubles as a consistency check of the recorded
//! computation: any mismatch means some block is not a pure function of its
//! declared dependencies.
//!
//! # Observer Events
//!
//! Each replayed equation emits an [`Event`]. Observers can return
//! [`Action::StopEarly`] to halt the replay; the report then carries
//! [`Status::StoppedByObserver`].

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use rewind_core::{ContractError, Functional, Observer, Variable, Vector, vector};
use thiserror::Error;

use crate::{Error, Store, Tape, functional};

/// Tolerances for comparing replayed and recorded values.
///
/// A replayed value `r` matches a recorded value `s` when
/// `‖r − s‖∞ ≤ abs_tol + rel_tol · ‖s‖∞`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    abs_tol: f64,
    rel_tol: f64,
}

/// Errors that can occur when creating a replay [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("abs_tol must be non-negative and finite: {0}")]
    AbsTol(f64),
    #[error("rel_tol must be non-negative and finite: {0}")]
    RelTol(f64),
}

impl Config {
    /// Creates a validated replay configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or not finite.
    pub fn new(abs_tol: f64, rel_tol: f64) -> Result<Self, ConfigError> {
        if !abs_tol.is_finite() || abs_tol < 0.0 {
            return Err(ConfigError::AbsTol(abs_tol));
        }
        if !rel_tol.is_finite() || rel_tol < 0.0 {
            return Err(ConfigError::RelTol(rel_tol));
        }
        Ok(Self { abs_tol, rel_tol })
    }

    #[must_use]
    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    #[must_use]
    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    fn tolerance(&self, recorded: &Vector) -> f64 {
        self.abs_tol + self.rel_tol * vector::norm_inf(recorded)
    }
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe.
        Self::new(1e-12, 1e-10).unwrap()
    }
}

/// How a replayed value compared with the recorded one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    /// Nothing was recorded for this variable.
    Unrecorded,

    /// Within tolerance.
    Match { error: f64 },

    /// Outside tolerance, or of a different length.
    Mismatch { error: f64, tolerance: f64 },
}

/// One replayed equation.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub index: usize,
    pub variable: &'a Variable,
    pub value: &'a Vector,
    pub comparison: Comparison,
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replay: equation {} ({})", self.index, self.variable)?;
        match self.comparison {
            Comparison::Unrecorded => Ok(()),
            Comparison::Match { error } => write!(f, " matches, error {error:e}"),
            Comparison::Mismatch { error, tolerance } => {
                write!(f, " MISMATCH, error {error:e} > {tolerance:e}")
            }
        }
    }
}

/// What an observer can ask a replay to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StopEarly,
}

/// Why a replay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Complete,
    StoppedByObserver,
}

/// A replayed value that disagreed with the recorded one.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub variable: Variable,
    pub error: f64,
    pub tolerance: f64,
}

/// The outcome of [`Tape::replay_forward`].
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub status: Status,
    pub replayed: usize,
    pub compared: usize,
    pub mismatches: Vec<Mismatch>,
}

impl Report {
    /// Returns true if every compared value matched.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl<S: Store> Tape<S> {
    /// Re-evaluates every equation and compares against recorded values.
    ///
    /// Freezes the tape. Mismatches are reported, not raised.
    ///
    /// # Errors
    ///
    /// Returns an error if an equation fails to evaluate.
    pub fn replay_forward<Obs>(&mut self, config: &Config, mut observer: Obs) -> Result<Report, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        self.freeze();
        let tape = &*self;

        let last_use = last_use(tape);
        let mut live: HashMap<Variable, Vector> = HashMap::new();
        let mut report = Report {
            status: Status::Complete,
            replayed: 0,
            compared: 0,
            mismatches: Vec::new(),
        };

        for (index, equation) in tape.equations.iter().enumerate() {
            let value = {
                let values = gather(&live, equation.dependencies())?;
                equation.evaluate(&values)?
            };
            report.replayed += 1;

            let target = equation.target();
            let comparison = match tape.store.get(target) {
                None => Comparison::Unrecorded,
                Some(recorded) => {
                    report.compared += 1;
                    compare(config, &value, recorded)
                }
            };
            if let Comparison::Mismatch { error, tolerance } = comparison {
                report.mismatches.push(Mismatch {
                    variable: target.clone(),
                    error,
                    tolerance,
                });
            }

            let event = Event {
                index,
                variable: target,
                value: &value,
                comparison,
            };
            let action = observer.observe(&event);

            for dep in equation.dependencies() {
                if last_use.get(dep) == Some(&index) {
                    live.remove(dep);
                }
            }
            if last_use.contains_key(target) {
                live.insert(target.clone(), value);
            }

            if let Some(Action::StopEarly) = action {
                report.status = Status::StoppedByObserver;
                break;
            }
        }

        Ok(report)
    }

    /// Replays the tape without observation.
    ///
    /// # Errors
    ///
    /// See [`Tape::replay_forward`].
    pub fn replay_forward_unobserved(&mut self, config: &Config) -> Result<Report, Error> {
        self.replay_forward(config, ())
    }

    /// Evaluates `functional` on the recorded computation.
    ///
    /// Freezes the tape.
    ///
    /// # Errors
    ///
    /// Returns an error if a functional dependency is unknown or an equation
    /// fails to evaluate.
    pub fn evaluate_functional<F>(&mut self, functional: &F) -> Result<f64, Error>
    where
        F: Functional + ?Sized,
    {
        self.evaluate_functional_with(functional, &[])
    }

    /// Evaluates `functional` after replaying the tape with some values
    /// replaced.
    ///
    /// Each override replaces the value of a known variable; every equation
    /// downstream of it is re-evaluated. Only equations the functional
    /// depends on are replayed. Freezes the tape.
    ///
    /// # Errors
    ///
    /// Returns an error if an overridden or functional variable is unknown, an
    /// override has the wrong length, or an equation fails to evaluate.
    pub fn evaluate_functional_with<F>(
        &mut self,
        functional: &F,
        overrides: &[(Variable, Vector)],
    ) -> Result<f64, Error>
    where
        F: Functional + ?Sized,
    {
        self.freeze();
        let tape = &*self;
        tape.ensure_known(overrides.iter().map(|(var, _)| var))?;

        let registry = &tape.registry;
        let mut wanted: HashSet<Variable> = HashSet::new();
        for timestep in 0..=registry.timestep() {
            wanted.extend(functional.dependencies(timestep, registry));
        }
        tape.ensure_known(&wanted)?;

        let roots: Vec<usize> = wanted.iter().filter_map(|var| tape.producer(var)).collect();
        let needed = tape.graph().upstream_of(&roots);
        let replaced: HashMap<&Variable, &Vector> =
            overrides.iter().map(|(var, value)| (var, value)).collect();

        let mut values: HashMap<Variable, Vector> = HashMap::new();
        for index in needed {
            let equation = &tape.equations[index];
            let target = equation.target();
            let value = equation.evaluate(&gather(&values, equation.dependencies())?)?;
            let value = match replaced.get(target) {
                Some(&replacement) => {
                    ContractError::check_len(value.len(), replacement.len())?;
                    replacement.clone()
                }
                None => value,
            };
            values.insert(target.clone(), value);
        }

        functional::total(functional, registry, |var| {
            values
                .get(var)
                .cloned()
                .ok_or_else(|| Error::UnknownVariable(var.clone()))
        })
    }
}

/// For each variable, the index of the last equation that reads it.
fn last_use<S: Store>(tape: &Tape<S>) -> HashMap<Variable, usize> {
    let mut last = HashMap::new();
    for (index, equation) in tape.equations.iter().enumerate() {
        for dep in equation.dependencies() {
            last.insert(dep.clone(), index);
        }
    }
    last
}

fn gather<'v>(
    values: &'v HashMap<Variable, Vector>,
    vars: &[Variable],
) -> Result<Vec<&'v Vector>, Error> {
    vars.iter()
        .map(|var| values.get(var).ok_or_else(|| Error::UnknownVariable(var.clone())))
        .collect()
}

fn compare(config: &Config, replayed: &Vector, recorded: &Vector) -> Comparison {
    let tolerance = config.tolerance(recorded);
    if replayed.len() != recorded.len() {
        return Comparison::Mismatch {
            error: f64::INFINITY,
            tolerance,
        };
    }
    let error = vector::norm_inf(&(replayed - recorded));
    if error <= tolerance {
        Comparison::Match { error }
    } else {
        Comparison::Mismatch { error, tolerance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;

    use crate::{
        FinalFunctional, Policy,
        blocks::{Constant, LinearCombination},
    };

    fn chain(policy: Policy) -> (Tape, Variable) {
        // x0 = 1, x1 = 2 x0, x2 = x1 + 3
        let mut tape = Tape::new(policy);
        let x0 = tape.register_initial_condition("x", array![1.0]).unwrap();
        let (x1, _) = tape.assign("x", LinearCombination::new([(x0.clone(), 2.0)])).unwrap();
        tape.assign_blocks(
            "x",
            vec![
                Box::new(LinearCombination::assign(x1)),
                Box::new(Constant::new(array![3.0])),
            ],
        )
        .unwrap();
        (tape, x0)
    }

    #[test]
    fn replay_reproduces_recorded_values() {
        let (mut tape, _) = chain(Policy::StoreAll);
        let mut last = None;
        let report = tape
            .replay_forward(&Config::default(), |event: &Event<'_>| {
                last = Some(event.value.clone());
                None
            })
            .unwrap();

        assert_eq!(last, Some(array![5.0]));
        assert_eq!(report.status, Status::Complete);
        assert_eq!((report.replayed, report.compared), (3, 3));
        assert!(report.is_consistent());
    }

    #[test]
    fn controls_only_compares_retained_values() {
        let (mut tape, _) = chain(Policy::StoreControlsOnly);
        let report = tape.replay_forward_unobserved(&Config::default()).unwrap();
        assert_eq!((report.replayed, report.compared), (3, 1));
        assert!(report.is_consistent());
    }

    #[test]
    fn tampered_value_is_reported() {
        let (mut tape, _) = chain(Policy::StoreAll);
        let x2 = tape.current("x").unwrap();
        tape.store.put(x2.clone(), array![5.5]);

        let report = tape.replay_forward_unobserved(&Config::default()).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].variable, x2);
        assert_relative_eq!(report.mismatches[0].error, 0.5);
    }

    #[test]
    fn observer_can_stop_early() {
        let (mut tape, _) = chain(Policy::StoreAll);
        let report = tape
            .replay_forward(&Config::default(), |event: &Event<'_>| {
                (event.index == 1).then_some(Action::StopEarly)
            })
            .unwrap();
        assert_eq!(report.status, Status::StoppedByObserver);
        assert_eq!(report.replayed, 2);
    }

    #[test]
    fn functional_with_overrides() {
        let (mut tape, x0) = chain(Policy::StoreControlsOnly);
        let functional = FinalFunctional::new("x");

        assert_relative_eq!(tape.evaluate_functional(&functional).unwrap(), 12.5);

        // x2 = 2 · 2 + 3 = 7
        let j = tape
            .evaluate_functional_with(&functional, &[(x0, array![2.0])])
            .unwrap();
        assert_relative_eq!(j, 24.5);
    }

    #[test]
    fn override_length_is_checked() {
        let (mut tape, x0) = chain(Policy::StoreAll);
        assert!(
            tape.evaluate_functional_with(&FinalFunctional::new("x"), &[(x0, array![1.0, 1.0])])
                .is_err()
        );
    }

    #[test]
    fn config_rejects_bad_tolerances() {
        assert_eq!(Config::new(-1.0, 0.0), Err(ConfigError::AbsTol(-1.0)));
        assert!(matches!(Config::new(0.0, f64::NAN), Err(ConfigError::RelTol(_))));
    }
}
