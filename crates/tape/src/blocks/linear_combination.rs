use rewind_core::{
    Block, BlockError, ContractError, Variable, Vector, check_arity, check_dependency, vector,
};

/// A weighted sum `Σ w_i x_i` of dependencies.
///
/// Repeated variables are merged by summing their weights, so each variable
/// appears once in the dependency list.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearCombination {
    dependencies: Vec<Variable>,
    weights: Vec<f64>,
}

impl LinearCombination {
    /// Builds a combination from `(variable, weight)` terms.
    pub fn new<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let mut dependencies: Vec<Variable> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        for (var, weight) in terms {
            match dependencies.iter().position(|d| *d == var) {
                Some(i) => weights[i] += weight,
                None => {
                    dependencies.push(var);
                    weights.push(weight);
                }
            }
        }
        Self {
            dependencies,
            weights,
        }
    }

    /// A plain copy of `variable`.
    #[must_use]
    pub fn assign(variable: Variable) -> Self {
        Self::new([(variable, 1.0)])
    }

    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Block for LinearCombination {
    fn name(&self) -> &str {
        "linear combination"
    }

    fn dependencies(&self) -> &[Variable] {
        &self.dependencies
    }

    fn coefficients(&self) -> &[f64] {
        &self.weights
    }

    fn evaluate(&self, values: &[&Vector]) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        let terms = values.iter().zip(&self.weights).map(|(v, w)| *v * *w);
        vector::sum(terms)?.ok_or_else(|| {
            ContractError::ArityMismatch {
                block: self.name().to_owned(),
                expected: 1,
                found: 0,
            }
            .into()
        })
    }

    fn derivative_action(
        &self,
        values: &[&Vector],
        variable: &Variable,
        seed: &Vector,
        _transpose: bool,
    ) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        let position = check_dependency(self, variable)?[0];
        ContractError::check_len(values[position].len(), seed.len())?;
        Ok(seed * self.weights[position])
    }
}
