use rewind_core::{
    Block, BlockError, ContractError, Variable, Vector, check_arity, check_dependency, vector,
};

/// The elementwise product `a ∘ b` of two dependencies.
///
/// `a` and `b` may be the same variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    dependencies: [Variable; 2],
}

impl Product {
    #[must_use]
    pub fn new(a: Variable, b: Variable) -> Self {
        Self {
            dependencies: [a, b],
        }
    }
}

impl Block for Product {
    fn name(&self) -> &str {
        "product"
    }

    fn dependencies(&self) -> &[Variable] {
        &self.dependencies
    }

    fn evaluate(&self, values: &[&Vector]) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        ContractError::check_len(values[0].len(), values[1].len())?;
        Ok(values[0] * values[1])
    }

    fn derivative_action(
        &self,
        values: &[&Vector],
        variable: &Variable,
        seed: &Vector,
        _transpose: bool,
    ) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        let positions = check_dependency(self, variable)?;
        ContractError::check_len(values[0].len(), seed.len())?;

        // Diagonal Jacobian: the other factor scales the seed.
        let terms = positions.iter().map(|&p| values[1 - p] * seed);
        Ok(vector::sum(terms)?.unwrap_or_else(|| Vector::zeros(seed.len())))
    }

    fn second_derivative_action(
        &self,
        values: &[&Vector],
        inner: &Variable,
        inner_seed: &Vector,
        outer: &Variable,
        _transpose: bool,
        action: &Vector,
    ) -> Result<Option<Vector>, BlockError> {
        check_arity(self, values)?;
        let inner_positions = check_dependency(self, inner)?;
        let outer_positions = check_dependency(self, outer)?;
        ContractError::check_len(values[0].len(), inner_seed.len())?;
        ContractError::check_len(values[0].len(), action.len())?;

        // Only cross terms survive: d²(a∘b)/da² = 0.
        let pairs = inner_positions
            .iter()
            .flat_map(|&i| outer_positions.iter().map(move |&o| (i, o)))
            .filter(|(i, o)| i != o)
            .count();
        if pairs == 0 {
            return Ok(None);
        }
        #[allow(clippy::cast_precision_loss)]
        let scale = pairs as f64;
        Ok(Some(inner_seed * action * scale))
    }
}
