use rewind_core::{Block, BlockError, Variable, Vector, check_arity, check_dependency};

/// A fixed value with no dependencies.
///
/// Used for initial conditions and constant source terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    value: Vector,
}

impl Constant {
    #[must_use]
    pub fn new(value: Vector) -> Self {
        Self { value }
    }

    #[must_use]
    pub fn value(&self) -> &Vector {
        &self.value
    }
}

impl Block for Constant {
    fn name(&self) -> &str {
        "constant"
    }

    fn dependencies(&self) -> &[Variable] {
        &[]
    }

    fn evaluate(&self, values: &[&Vector]) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        Ok(self.value.clone())
    }

    fn derivative_action(
        &self,
        values: &[&Vector],
        variable: &Variable,
        _seed: &Vector,
        _transpose: bool,
    ) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        check_dependency(self, variable)?;
        unreachable!("a constant has no dependencies")
    }
}
