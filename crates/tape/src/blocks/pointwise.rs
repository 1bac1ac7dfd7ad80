use rewind_core::{Block, BlockError, ContractError, Variable, Vector, check_arity, check_dependency};

/// An elementwise function `f(x)` of one dependency.
///
/// The derivative is supplied as a function too. The Jacobian is diagonal,
/// so forward and adjoint actions coincide. Without
/// [`Pointwise::with_second_derivative`] the block contributes no curvature
/// to Hessian actions.
#[derive(Debug, Clone)]
pub struct Pointwise {
    name: String,
    dependencies: [Variable; 1],
    f: fn(f64) -> f64,
    df: fn(f64) -> f64,
    d2f: Option<fn(f64) -> f64>,
}

impl Pointwise {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        variable: Variable,
        f: fn(f64) -> f64,
        df: fn(f64) -> f64,
    ) -> Self {
        Self {
            name: name.into(),
            dependencies: [variable],
            f,
            df,
            d2f: None,
        }
    }

    /// Supplies the second derivative used by Hessian actions.
    #[must_use]
    pub fn with_second_derivative(mut self, d2f: fn(f64) -> f64) -> Self {
        self.d2f = Some(d2f);
        self
    }
}

impl Block for Pointwise {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[Variable] {
        &self.dependencies
    }

    fn evaluate(&self, values: &[&Vector]) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        Ok(values[0].mapv(self.f))
    }

    fn derivative_action(
        &self,
        values: &[&Vector],
        variable: &Variable,
        seed: &Vector,
        _transpose: bool,
    ) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        check_dependency(self, variable)?;
        ContractError::check_len(values[0].len(), seed.len())?;
        Ok(values[0].mapv(self.df) * seed)
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
        check_dependency(self, inner)?;
        check_dependency(self, outer)?;
        let Some(d2f) = self.d2f else {
            return Ok(None);
        };
        ContractError::check_len(values[0].len(), inner_seed.len())?;
        ContractError::check_len(values[0].len(), action.len())?;
        Ok(Some(values[0].mapv(d2f) * inner_seed * action))
    }
}
