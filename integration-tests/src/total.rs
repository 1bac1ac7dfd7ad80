use rewind_core::{ContractError, Functional, Registry, Variable, Vector};

/// `J = Σ_i u_i` for the latest version of `u` at the final timestep.
///
/// Linear, so its gradient with respect to `u` is a vector of ones.
#[derive(Debug, Clone)]
pub struct Total {
    name: String,
}

impl Total {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Functional for Total {
    fn dependencies(&self, timestep: usize, registry: &Registry) -> Vec<Variable> {
        if timestep == registry.timestep() {
            registry.current(&self.name).into_iter().collect()
        } else {
            Vec::new()
        }
    }

    fn value(
        &self,
        _timestep: usize,
        _registry: &Registry,
        _dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<f64, ContractError> {
        Ok(values.iter().map(|v| v.sum()).sum())
    }

    fn derivative(
        &self,
        _timestep: usize,
        _registry: &Registry,
        variable: &Variable,
        dependencies: &[Variable],
        values: &[&Vector],
    ) -> Result<Vector, ContractError> {
        let position = dependencies
            .iter()
            .position(|d| d == variable)
            .ok_or_else(|| ContractError::UnknownDependency {
                block: format!("total of `{}`", self.name),
                variable: variable.clone(),
            })?;
        ContractError::check_len(dependencies.len(), values.len())?;
        Ok(Vector::ones(values[position].len()))
    }
}
