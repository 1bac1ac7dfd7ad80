use ndarray::Array2;
use rewind_core::{
    Block, BlockError, ContractError, Variable, Vector, check_arity, check_dependency,
};

/// A dense matrix applied to one dependency, `M x`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatVec {
    matrix: Array2<f64>,
    dependencies: [Variable; 1],
}

impl MatVec {
    #[must_use]
    pub fn new(matrix: Array2<f64>, variable: Variable) -> Self {
        Self {
            matrix,
            dependencies: [variable],
        }
    }

    #[must_use]
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }
}

impl Block for MatVec {
    fn name(&self) -> &str {
        "matrix-vector product"
    }

    fn dependencies(&self) -> &[Variable] {
        &self.dependencies
    }

    fn evaluate(&self, values: &[&Vector]) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        ContractError::check_len(self.matrix.ncols(), values[0].len())?;
        Ok(self.matrix.dot(values[0]))
    }

    fn derivative_action(
        &self,
        values: &[&Vector],
        variable: &Variable,
        seed: &Vector,
        transpose: bool,
    ) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        check_dependency(self, variable)?;
        if transpose {
            ContractError::check_len(self.matrix.nrows(), seed.len())?;
            Ok(self.matrix.t().dot(seed))
        } else {
            ContractError::check_len(self.matrix.ncols(), seed.len())?;
            Ok(self.matrix.dot(seed))
        }
    }
}
