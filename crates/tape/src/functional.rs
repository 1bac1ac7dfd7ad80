//! Built-in quadratic functionals.
//!
//! A functional is either read at a single instant ([`PointFunctional`],
//! [`FinalFunctional`]) or integrated over time ([`TimeIntegral`], optionally
//! restricted to a [`TimeSlice`]). [`FunctionalSum`] adds any of them.

use std::fmt;

use rewind_core::{ContractError, Functional, Registry, Variable, Vector};
use thiserror::Error;

use crate::Error;

/// A point on the timeline of a taped computation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instant {
    /// Before the first equation: the initial value.
    Start,

    /// The end of the first completed timestep that ends at or after the
    /// given time. Times at or before the timeline's start read the initial
    /// value.
    Time(f64),

    /// The latest value at the final timestep.
    Finish,
}

/// `J = ½ w ‖u − u_ref‖²` for the value of `u` at an [`Instant`].
///
/// The term is attributed to the timestep that holds the value, so the
/// adjoint sweep seeds it exactly once. A time that no completed timestep
/// reaches yet contributes nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFunctional {
    name: String,
    instant: Instant,
    weight: f64,
    reference: Option<Vector>,
}

impl PointFunctional {
    #[must_use]
    pub fn new(name: impl Into<String>, instant: Instant) -> Self {
        Self {
            name: name.into(),
            instant,
            weight: 1.0,
            reference: None,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Measures the misfit from `reference` instead of from zero.
    #[must_use]
    pub fn with_reference(mut self, reference: Vector) -> Self {
        self.reference = Some(reference);
        self
    }

    #[must_use]
    pub fn instant(&self) -> Instant {
        self.instant
    }

    /// The timestep the term is read at and the version it reads.
    fn read_at(&self, registry: &Registry) -> Option<(usize, Variable)> {
        let first = || registry.history(&self.name).first().map(|var| (0, var.clone()));
        match self.instant {
            Instant::Start => first(),
            Instant::Finish => registry
                .current(&self.name)
                .map(|var| (registry.timestep(), var)),
            Instant::Time(time) => {
                let timeline = registry.timeline();
                if time <= timeline.start() {
                    return first();
                }
                let timestep = (0..timeline.current())
                    .find(|&t| timeline.end(t).is_some_and(|end| end >= time))?;
                registry
                    .latest_at(&self.name, timestep)
                    .map(|var| (timestep, var))
            }
        }
    }

    fn misfit(&self, value: &Vector) -> Result<Vector, ContractError> {
        match &self.reference {
            Some(reference) => {
                ContractError::check_len(value.len(), reference.len())?;
                Ok(value - reference)
            }
            None => Ok(value.clone()),
        }
    }
}

impl Functional for PointFunctional {
    fn dependencies(&self, timestep: usize, registry: &Registry) -> Vec<Variable> {
        match self.read_at(registry) {
            Some((at, var)) if at == timestep => vec![var],
            _ => Vec::new(),
        }
    }

    fn value(
        &self,
        _timestep: usize,
        _registry: &Registry,
        _dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<f64, ContractError> {
        let Some(value) = values.first() else {
            return Ok(0.0);
        };
        let misfit = self.misfit(value)?;
        Ok(0.5 * self.weight * misfit.dot(&misfit))
    }

    fn derivative(
        &self,
        _timestep: usize,
        _registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<Vector, ContractError> {
        let value = read_single(&self.name, variable, dependencies, values)?;
        Ok(self.misfit(value)? * self.weight)
    }

    fn second_derivative(
        &self,
        _timestep: usize,
        _registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
        inner: &Variable,
        direction: &Vector,
    ) -> Result<Option<Vector>, ContractError> {
        let value = read_single(&self.name, variable, dependencies, values)?;
        if inner != variable {
            return Ok(None);
        }
        ContractError::check_len(value.len(), direction.len())?;
        Ok(Some(direction * self.weight))
    }
}

/// `J = ½ w ‖u − u_ref‖²` for the latest version of `u` at the final
/// timestep.
///
/// The final timestep is the registry's current timestep when the functional
/// is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalFunctional(PointFunctional);

impl FinalFunctional {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(PointFunctional::new(name, Instant::Finish))
    }

    #[must_use]
    pub fn with_weight(self, weight: f64) -> Self {
        Self(self.0.with_weight(weight))
    }

    /// Measures the misfit from `reference` instead of from zero.
    #[must_use]
    pub fn with_reference(self, reference: Vector) -> Self {
        Self(self.0.with_reference(reference))
    }
}

impl Functional for FinalFunctional {
    fn dependencies(&self, timestep: usize, registry: &Registry) -> Vec<Variable> {
        self.0.dependencies(timestep, registry)
    }

    fn value(
        &self,
        timestep: usize,
        registry: &Registry,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<f64, ContractError> {
        self.0.value(timestep, registry, dependencies, values)
    }

    fn derivative(
        &self,
        timestep: usize,
        registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<Vector, ContractError> {
        self.0.derivative(timestep, registry, variable, dependencies, values)
    }

    fn second_derivative(
        &self,
        timestep: usize,
        registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
        inner: &Variable,
        direction: &Vector,
    ) -> Result<Option<Vector>, ContractError> {
        self.0
            .second_derivative(timestep, registry, variable, dependencies, values, inner, direction)
    }
}

/// A time interval; an open bound extends to the start or finish of the run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSlice {
    start: Option<f64>,
    end: Option<f64>,
}

/// Errors that can occur when creating a [`TimeSlice`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TimeSliceError {
    #[error("time slice bound must be finite: {0}")]
    NotFinite(f64),
    #[error("zero or negative length time slice: [{start}, {end}]")]
    Empty { start: f64, end: f64 },
}

impl TimeSlice {
    /// Creates a slice from `start` to `end`.
    ///
    /// # Errors
    ///
    /// Returns a [`TimeSliceError`] if a bound is not finite or the slice has
    /// no positive length.
    pub fn new(start: Option<f64>, end: Option<f64>) -> Result<Self, TimeSliceError> {
        for bound in start.into_iter().chain(end) {
            if !bound.is_finite() {
                return Err(TimeSliceError::NotFinite(bound));
            }
        }
        if let (Some(start), Some(end)) = (start, end)
            && end <= start
        {
            return Err(TimeSliceError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    /// The whole run.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// The length of `[begin, end]` that falls inside the slice.
    fn overlap(&self, begin: f64, end: f64) -> f64 {
        let lo = self.start.map_or(begin, |start| start.max(begin));
        let hi = self.end.map_or(end, |stop| stop.min(end));
        (hi - lo).max(0.0)
    }
}

/// `J = Σ_t Δt_t ½ w ‖u_t‖²` over completed timesteps.
///
/// `u_t` is the version of `u` that holds its value during timestep `t`, and
/// `Δt_t` is the width of that timestep, or the part of it inside the
/// integral's [`TimeSlice`]. The open timestep, which has no width yet, does
/// not contribute.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeIntegral {
    name: String,
    weight: f64,
    slice: TimeSlice,
}

impl TimeIntegral {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            slice: TimeSlice::all(),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Integrates over `slice` only.
    #[must_use]
    pub fn over(mut self, slice: TimeSlice) -> Self {
        self.slice = slice;
        self
    }

    /// The weighted width of `timestep` inside the slice, if it has ended.
    fn width(&self, timestep: usize, registry: &Registry) -> Option<f64> {
        let timeline = registry.timeline();
        let end = timeline.end(timestep)?;
        let begin = end - timeline.width(timestep)?;
        let width = self.slice.overlap(begin, end);
        (width > 0.0).then_some(width * self.weight)
    }

    fn scale(&self, timestep: usize, registry: &Registry) -> f64 {
        self.width(timestep, registry).unwrap_or(0.0)
    }
}

impl Functional for TimeIntegral {
    fn dependencies(&self, timestep: usize, registry: &Registry) -> Vec<Variable> {
        if self.width(timestep, registry).is_some() {
            registry.latest_at(&self.name, timestep).into_iter().collect()
        } else {
            Vec::new()
        }
    }

    fn value(
        &self,
        timestep: usize,
        registry: &Registry,
        _dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<f64, ContractError> {
        Ok(values
            .first()
            .map_or(0.0, |u| 0.5 * self.scale(timestep, registry) * u.dot(*u)))
    }

    fn derivative(
        &self,
        timestep: usize,
        registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<Vector, ContractError> {
        let value = read_single(&self.name, variable, dependencies, values)?;
        Ok(value * self.scale(timestep, registry))
    }

    fn second_derivative(
        &self,
        timestep: usize,
        registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
        inner: &Variable,
        direction: &Vector,
    ) -> Result<Option<Vector>, ContractError> {
        let value = read_single(&self.name, variable, dependencies, values)?;
        if inner != variable {
            return Ok(None);
        }
        ContractError::check_len(value.len(), direction.len())?;
        Ok(Some(direction * self.scale(timestep, registry)))
    }
}

/// The sum of several functionals.
///
/// At each timestep the sum reads the union of its terms' dependencies and
/// hands every term the values it asked for.
#[derive(Default)]
pub struct FunctionalSum {
    terms: Vec<Box<dyn Functional>>,
}

impl fmt::Debug for FunctionalSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalSum")
            .field("terms", &self.terms.len())
            .finish()
    }
}

impl FunctionalSum {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_term(mut self, term: impl Functional + 'static) -> Self {
        self.terms.push(Box::new(term));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Each term with its own dependencies and their values.
    fn routed<'v>(
        &self,
        timestep: usize,
        registry: &Registry,
        dependencies: &[Variable],
        values: &[&'v Vector],
    ) -> Result<Vec<(&dyn Functional, Vec<Variable>, Vec<&'v Vector>)>, ContractError> {
        if values.len() != dependencies.len() {
            return Err(ContractError::ArityMismatch {
                block: "functional sum".to_owned(),
                expected: dependencies.len(),
                found: values.len(),
            });
        }

        self.terms
            .iter()
            .map(|term| {
                let deps = term.dependencies(timestep, registry);
                let term_values = deps
                    .iter()
                    .map(|dep| {
                        dependencies
                            .iter()
                            .position(|d| d == dep)
                            .map(|i| values[i])
                            .ok_or_else(|| ContractError::UnknownDependency {
                                block: "functional sum".to_owned(),
                                variable: dep.clone(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((term.as_ref(), deps, term_values))
            })
            .collect()
    }
}

impl Functional for FunctionalSum {
    fn dependencies(&self, timestep: usize, registry: &Registry) -> Vec<Variable> {
        let mut union: Vec<Variable> = Vec::new();
        for term in &self.terms {
            for dep in term.dependencies(timestep, registry) {
                if !union.contains(&dep) {
                    union.push(dep);
                }
            }
        }
        union
    }

    fn value(
        &self,
        timestep: usize,
        registry: &Registry,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<f64, ContractError> {
        let mut total = 0.0;
        for (term, deps, values) in self.routed(timestep, registry, dependencies, values)? {
            total += term.value(timestep, registry, &deps, &values)?;
        }
        Ok(total)
    }

    fn derivative(
        &self,
        timestep: usize,
        registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<Vector, ContractError> {
        let mut total: Option<Vector> = None;
        for (term, deps, values) in self.routed(timestep, registry, dependencies, values)? {
            if !deps.contains(variable) {
                continue;
            }
            let term = term.derivative(timestep, registry, variable, &deps, &values)?;
            total = Some(match total {
                Some(acc) => {
                    ContractError::check_len(acc.len(), term.len())?;
                    acc + term
                }
                None => term,
            });
        }
        total.ok_or_else(|| ContractError::UnknownDependency {
            block: "functional sum".to_owned(),
            variable: variable.clone(),
        })
    }

    fn second_derivative(
        &self,
        timestep: usize,
        registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
        inner: &Variable,
        direction: &Vector,
    ) -> Result<Option<Vector>, ContractError> {
        let mut total: Option<Vector> = None;
        for (term, deps, values) in self.routed(timestep, registry, dependencies, values)? {
            if !deps.contains(variable) || !deps.contains(inner) {
                continue;
            }
            let Some(term) = term.second_derivative(
                timestep, registry, variable, &deps, &values, inner, direction,
            )?
            else {
                continue;
            };
            total = Some(match total {
                Some(acc) => {
                    ContractError::check_len(acc.len(), term.len())?;
                    acc + term
                }
                None => term,
            });
        }
        Ok(total)
    }
}

fn read_single<'v>(
    name: &str,
    variable: &Variable,
    dependencies: &[Variable],
    values: &[&'v Vector],
) -> Result<&'v Vector, ContractError> {
    match dependencies.iter().position(|d| d == variable) {
        Some(i) if i < values.len() => Ok(values[i]),
        Some(_) => Err(ContractError::ArityMismatch {
            block: format!("functional of `{name}`"),
            expected: dependencies.len(),
            found: values.len(),
        }),
        None => Err(ContractError::UnknownDependency {
            block: format!("functional of `{name}`"),
            variable: variable.clone(),
        }),
    }
}

/// Sums a functional over every timestep, resolving values with `value_of`.
pub(crate) fn total<F, V>(functional: &F, registry: &Registry, mut value_of: V) -> Result<f64, Error>
where
    F: Functional + ?Sized,
    V: FnMut(&Variable) -> Result<Vector, Error>,
{
    let mut total = 0.0;
    for timestep in 0..=registry.timestep() {
        let deps = functional.dependencies(timestep, registry);
        let values = deps.iter().map(&mut value_of).collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&Vector> = values.iter().collect();
        total += functional.value(timestep, registry, &deps, &refs)?;
    }
    Ok(total)
}
