use crate::{ContractError, Registry, Variable, Vector};

/// A scalar objective evaluated over the timesteps of a taped computation.
///
/// The total value is the sum of [`Functional::value`] over every timestep
/// from `0` to the registry's current timestep. At each timestep the
/// functional names the variables it reads; the adjoint sweep seeds those
/// variables with [`Functional::derivative`].
pub trait Functional {
    /// The variables the functional reads at `timestep`.
    fn dependencies(&self, timestep: usize, registry: &Registry) -> Vec<Variable>;

    /// The functional's contribution at `timestep`.
    ///
    /// `values` is ordered like `dependencies`.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractError`] if the values have unexpected shapes.
    fn value(
        &self,
        timestep: usize,
        registry: &Registry,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<f64, ContractError>;

    /// The derivative of the contribution at `timestep` with respect to
    /// `variable`.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractError`] if `variable` is not a dependency or the
    /// values have unexpected shapes.
    fn derivative(
        &self,
        timestep: usize,
        registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<Vector, ContractError>;

    /// The second derivative with respect to `variable` then `inner`, applied
    /// to `direction`.
    ///
    /// `Ok(None)` is a hard zero.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractError`] if the values have unexpected shapes.
    #[allow(clippy::too_many_arguments)]
    fn second_derivative(
        &self,
        _timestep: usize,
        _registry: &Registry,
        _variable: &Variable,
        _dependencies: &[Variable],
        _values: &[&Vector],
        _inner: &Variable,
        _direction: &Vector,
    ) -> Result<Option<Vector>, ContractError> {
        Ok(None)
    }
}
