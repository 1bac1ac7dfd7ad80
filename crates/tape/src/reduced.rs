use rewind_core::{ContractError, Functional, Variable, Vector, vector};

use crate::{
    Error, MemoryStore, Store, Tape,
    verify::{TaylorConfig, TaylorReport, taylor_test},
};

/// A functional viewed as a function of its controls alone.
///
/// Pairs a recorded tape with a functional and an ordered list of controls.
/// Values, gradients and Hessian actions are exchanged as slices ordered like
/// the controls. Creating one freezes nothing; the first evaluation does.
pub struct ReducedFunctional<'t, F, S = MemoryStore> {
    tape: &'t mut Tape<S>,
    functional: F,
    controls: Vec<Variable>,
}

impl<'t, F, S> ReducedFunctional<'t, F, S>
where
    F: Functional,
    S: Store,
{
    /// Creates a reduced functional, marking each control on the tape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if a control is not known.
    pub fn new(tape: &'t mut Tape<S>, functional: F, controls: Vec<Variable>) -> Result<Self, Error> {
        for control in &controls {
            tape.mark_control(control)?;
        }
        Ok(Self {
            tape,
            functional,
            controls,
        })
    }

    pub fn controls(&self) -> &[Variable] {
        &self.controls
    }

    pub fn functional(&self) -> &F {
        &self.functional
    }

    pub fn tape(&self) -> &Tape<S> {
        self.tape
    }

    /// The recorded value of each control.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be recovered.
    pub fn control_values(&self) -> Result<Vec<Vector>, Error> {
        self.controls.iter().map(|c| self.tape.value(c)).collect()
    }

    /// Evaluates the functional with the controls set to `values` by
    /// replaying the tape.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` does not match the controls or the
    /// replay fails.
    pub fn evaluate(&mut self, values: &[Vector]) -> Result<f64, Error> {
        ContractError::check_len(self.controls.len(), values.len())?;
        let overrides: Vec<(Variable, Vector)> = self
            .controls
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();
        self.tape.evaluate_functional_with(&self.functional, &overrides)
    }

    /// The gradient at the recorded control values, ordered like the
    /// controls.
    ///
    /// # Errors
    ///
    /// See [`Tape::compute_gradient`].
    pub fn derivative(&mut self) -> Result<Vec<Vector>, Error> {
        let mut gradient = self
            .tape
            .compute_gradient_unobserved(&self.functional, &self.controls)?
            .into_inner();
        self.ordered(|control| gradient.remove(control))
    }

    /// The Hessian action at the recorded control values, ordered like the
    /// controls.
    ///
    /// # Errors
    ///
    /// See [`Tape::hessian_action`].
    pub fn hessian_action(&mut self, direction: &[Vector]) -> Result<Vec<Vector>, Error> {
        let mut action = self
            .tape
            .hessian_action(&self.functional, &self.controls, direction)?
            .into_inner();
        self.ordered(|control| action.remove(control))
    }

    /// Taylor-tests the gradient in `direction` around the recorded control
    /// values.
    ///
    /// # Errors
    ///
    /// Returns an error if `direction` does not match the controls or an
    /// evaluation fails.
    pub fn taylor_test(&mut self, direction: &[Vector], config: &TaylorConfig) -> Result<TaylorReport, Error> {
        ContractError::check_len(self.controls.len(), direction.len())?;
        let base = self.control_values()?;
        let gradient = self.derivative()?;

        let mut dj = 0.0;
        for (g, d) in gradient.iter().zip(direction) {
            dj += vector::inner(g, d)?;
        }

        taylor_test(
            |h| {
                let point: Vec<Vector> = base
                    .iter()
                    .zip(direction)
                    .map(|(m, d)| m + &(d * h))
                    .collect();
                self.evaluate(&point)
            },
            dj,
            config,
        )
    }

    fn ordered<G>(&self, mut take: G) -> Result<Vec<Vector>, Error>
    where
        G: FnMut(&Variable) -> Option<Vector>,
    {
        self.controls
            .iter()
            .map(|control| take(control).ok_or_else(|| Error::UnknownVariable(control.clone())))
            .collect()
    }
}
