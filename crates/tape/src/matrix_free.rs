//! Taped linear solves with matrix-free operators.
//!
//! A [`KrylovSolve`] block solves `A(p) x = b(d)`, where the operator `A`
//! is only available through its action and may depend on parameter
//! variables `p`, and the right-hand side is itself a block over
//! dependencies `d`.
//!
//! Differentiating the solve needs the operator's transpose:
//!
//! - tangent-linear: `δx = A⁻¹ (∂b/∂d δd − (∂A/∂p δp) x)`
//! - adjoint: solve `Aᵀ λ = x̄`, then `d̄ = (∂b/∂d)ᵀ λ` and
//!   `p̄ = −(∂(A x)/∂p)ᵀ λ`
//!
//! The transpose is checked when the block is built, so a solve that cannot
//! be differentiated is rejected before it reaches the tape. An adjoint sweep
//! costs one transposed solve per taped solve; the forward solution is read
//! back from its checkpoint.

use std::{cell::Cell, rc::Rc};

use rewind_core::{
    Block, BlockError, ContractError, Direction, LinearOperator, LinearSolver, OperatorAction,
    Variable, Vector, check_arity, check_dependency, vector,
};

use crate::{Error, Store, Tape};

/// A linear solver paired with an optional preconditioner.
#[derive(Debug, Clone)]
pub struct MatrixFree {
    solver: Rc<dyn LinearSolver>,
    preconditioner: Option<Rc<dyn LinearOperator>>,
}

impl MatrixFree {
    pub fn new(solver: impl LinearSolver + 'static) -> Self {
        Self {
            solver: Rc::new(solver),
            preconditioner: None,
        }
    }

    /// Uses `preconditioner`, an approximation of `A⁻¹`, for every solve.
    ///
    /// Adjoint solves apply its transpose. A preconditioner either takes no
    /// parameters or takes the same parameters as the operator it
    /// approximates.
    #[must_use]
    pub fn with_preconditioner(mut self, preconditioner: impl LinearOperator + 'static) -> Self {
        self.preconditioner = Some(Rc::new(preconditioner));
        self
    }

    /// Builds the block that solves `operator(parameters) x = rhs`.
    ///
    /// The parameters must be known to `tape`; their current values are used
    /// to check that the operator applies its transpose.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::MissingTranspose`] if the operator or
    /// preconditioner cannot apply its transpose,
    /// [`ContractError::ArityMismatch`] if the operator's or preconditioner's
    /// parameter count is wrong, and [`Error::UnknownVariable`] if a
    /// parameter is unknown.
    pub fn block<S: Store>(
        &self,
        tape: &Tape<S>,
        operator: Rc<dyn LinearOperator>,
        parameters: Vec<Variable>,
        rhs: Box<dyn Block>,
    ) -> Result<KrylovSolve, Error> {
        if parameters.len() != operator.parameter_count() {
            return Err(ContractError::ArityMismatch {
                block: operator.name().to_owned(),
                expected: operator.parameter_count(),
                found: parameters.len(),
            }
            .into());
        }

        let values = parameters
            .iter()
            .map(|p| tape.value(p))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&Vector> = values.iter().collect();
        probe_transpose(operator.as_ref(), &refs)?;
        if let Some(preconditioner) = &self.preconditioner {
            ContractError::check_len(operator.size(), preconditioner.size())?;
            let count = preconditioner.parameter_count();
            if count != 0 && count != parameters.len() {
                return Err(ContractError::ArityMismatch {
                    block: preconditioner.name().to_owned(),
                    expected: parameters.len(),
                    found: count,
                }
                .into());
            }
            probe_transpose(preconditioner.as_ref(), &refs[..count])?;
        }

        let mut dependencies = rhs.dependencies().to_vec();
        dependencies.extend(parameters.iter().cloned());

        Ok(KrylovSolve {
            name: format!("solve {}", operator.name()),
            operator,
            preconditioner: self.preconditioner.clone(),
            solver: Rc::clone(&self.solver),
            rhs,
            parameters,
            dependencies,
        })
    }

    /// Solves `operator(parameters) x = rhs` into a new version of `name`.
    ///
    /// The solution is checkpointed under every storage policy, so derivative
    /// sweeps read it back instead of repeating the forward solve. Replays
    /// still solve, since checking the recorded solution is their purpose.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be built, the tape rejects the
    /// assignment, or the solve fails.
    pub fn solve<S: Store>(
        &self,
        tape: &mut Tape<S>,
        name: &str,
        operator: Rc<dyn LinearOperator>,
        parameters: Vec<Variable>,
        rhs: Box<dyn Block>,
    ) -> Result<(Variable, Vector), Error> {
        let block = self.block(tape, operator, parameters, rhs)?;
        tape.assign_checkpointed(name, block)
    }
}

/// Checks that an operator applies its transpose, using a zero vector.
fn probe_transpose(operator: &dyn LinearOperator, params: &[&Vector]) -> Result<(), ContractError> {
    match operator.apply_transpose(params, &Vector::zeros(operator.size())) {
        Some(_) => Ok(()),
        None => Err(ContractError::MissingTranspose {
            operator: operator.name().to_owned(),
        }),
    }
}

/// A block solving `A(p) x = b(d)`.
#[derive(Debug)]
pub struct KrylovSolve {
    name: String,
    operator: Rc<dyn LinearOperator>,
    preconditioner: Option<Rc<dyn LinearOperator>>,
    solver: Rc<dyn LinearSolver>,
    rhs: Box<dyn Block>,
    parameters: Vec<Variable>,
    dependencies: Vec<Variable>,
}

impl KrylovSolve {
    #[must_use]
    pub fn operator(&self) -> &dyn LinearOperator {
        self.operator.as_ref()
    }

    #[must_use]
    pub fn parameters(&self) -> &[Variable] {
        &self.parameters
    }

    /// Splits values into right-hand-side values and parameter values.
    fn split<'v>(&self, values: &'v [&'v Vector]) -> (&'v [&'v Vector], &'v [&'v Vector]) {
        values.split_at(self.rhs.dependencies().len())
    }

    /// Solves `A(params) x = b`.
    fn solve_forward(&self, params: &[&Vector], b: &Vector) -> Result<Vector, BlockError> {
        ContractError::check_len(self.operator.size(), b.len())?;
        let apply = |x: &Vector| self.operator.apply(params, x);
        let precondition = self.preconditioner.as_ref().map(|p| {
            let params = preconditioner_params(p.as_ref(), params);
            move |x: &Vector| p.apply(params, x)
        });
        let precondition: Option<OperatorAction<'_>> =
            precondition.as_ref().map(|p| p as OperatorAction<'_>);

        Ok(self
            .solver
            .solve(&apply, precondition, b, Vector::zeros(b.len()))?)
    }

    /// Solves `A(params)ᵀ λ = b`.
    fn solve_adjoint(&self, params: &[&Vector], b: &Vector) -> Result<Vector, BlockError> {
        ContractError::check_len(self.operator.size(), b.len())?;

        // The transpose was probed at construction; a later refusal is still
        // reported rather than silently solving a different system.
        let refused = Cell::new(false);
        let apply = |x: &Vector| {
            self.operator.apply_transpose(params, x).unwrap_or_else(|| {
                refused.set(true);
                Vector::zeros(x.len())
            })
        };
        let precondition = self.preconditioner.as_ref().map(|p| {
            let refused = &refused;
            let params = preconditioner_params(p.as_ref(), params);
            move |x: &Vector| {
                p.apply_transpose(params, x).unwrap_or_else(|| {
                    refused.set(true);
                    Vector::zeros(x.len())
                })
            }
        });
        let precondition: Option<OperatorAction<'_>> =
            precondition.as_ref().map(|p| p as OperatorAction<'_>);

        let solution = self
            .solver
            .solve(&apply, precondition, b, Vector::zeros(b.len()));
        if refused.get() {
            return Err(ContractError::MissingTranspose {
                operator: self.operator.name().to_owned(),
            }
            .into());
        }
        Ok(solution?)
    }

    /// Recovers the forward solution from dependency values.
    fn solution(&self, rhs_values: &[&Vector], params: &[&Vector]) -> Result<Vector, BlockError> {
        let b = self.rhs.evaluate(rhs_values)?;
        self.solve_forward(params, &b)
    }

    fn parameter_positions(&self, variable: &Variable) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter_map(|(k, p)| (p == variable).then_some(k))
            .collect()
    }

    fn operator_derivative(
        &self,
        params: &[&Vector],
        index: usize,
        x: &Vector,
        seed: &Vector,
        transpose: bool,
    ) -> Result<Vector, BlockError> {
        self.operator
            .derivative_action(params, index, x, seed, transpose)
            .ok_or(BlockError::NotImplemented(Direction::from_transpose(transpose)))
    }
}

impl Block for KrylovSolve {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[Variable] {
        &self.dependencies
    }

    fn evaluate(&self, values: &[&Vector]) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        let (rhs_values, params) = self.split(values);
        self.solution(rhs_values, params)
    }

    fn derivative_action(
        &self,
        values: &[&Vector],
        variable: &Variable,
        seed: &Vector,
        transpose: bool,
    ) -> Result<Vector, BlockError> {
        check_arity(self, values)?;
        let position = check_dependency(self, variable)?[0];
        let (rhs_values, params) = self.split(values);
        let in_rhs = self.rhs.dependencies().contains(variable);
        let positions = self.parameter_positions(variable);

        if transpose {
            let mut actions = self.adjoint_actions(values, None, &[variable], seed)?;
            Ok(actions.pop().unwrap_or_else(|| Vector::zeros(values[position].len())))
        } else {
            let mut residual: Option<Vector> = None;
            if in_rhs {
                let term = self.rhs.derivative_action(rhs_values, variable, seed, false)?;
                add(&mut residual, &term)?;
            }
            if !positions.is_empty() {
                let x = self.solution(rhs_values, params)?;
                for k in positions {
                    let term = self.operator_derivative(params, k, &x, seed, false)?;
                    add(&mut residual, &-term)?;
                }
            }
            let residual = residual.unwrap_or_else(|| Vector::zeros(self.operator.size()));
            self.solve_forward(params, &residual)
        }
    }

    /// Solves `Aᵀ λ = seed` once and maps `λ` onto every variable.
    ///
    /// `output`, the recorded solution, is only needed for parameters; it is
    /// recomputed when absent.
    fn adjoint_actions(
        &self,
        values: &[&Vector],
        output: Option<&Vector>,
        variables: &[&Variable],
        seed: &Vector,
    ) -> Result<Vec<Vector>, BlockError> {
        check_arity(self, values)?;
        let (rhs_values, params) = self.split(values);
        let lambda = self.solve_adjoint(params, seed)?;

        let mut solution: Option<Vector> = output
            .filter(|x| x.len() == self.operator.size())
            .cloned();
        let mut actions = Vec::with_capacity(variables.len());
        for &variable in variables {
            let position = check_dependency(self, variable)?[0];
            let mut total: Option<Vector> = None;
            if self.rhs.dependencies().contains(variable) {
                let term = self.rhs.derivative_action(rhs_values, variable, &lambda, true)?;
                add(&mut total, &term)?;
            }

            let positions = self.parameter_positions(variable);
            if !positions.is_empty() {
                let x = match solution.take() {
                    Some(x) => x,
                    None => self.solution(rhs_values, params)?,
                };
                for k in positions {
                    let term = self.operator_derivative(params, k, &x, &lambda, true)?;
                    add(&mut total, &-term)?;
                }
                solution = Some(x);
            }

            actions.push(total.unwrap_or_else(|| Vector::zeros(values[position].len())));
        }
        Ok(actions)
    }

    /// Second derivatives pass through the right-hand side when the operator
    /// has no parameters. Parameter-dependent operators report none.
    fn second_derivative_action(
        &self,
        values: &[&Vector],
        inner: &Variable,
        inner_seed: &Vector,
        outer: &Variable,
        transpose: bool,
        action: &Vector,
    ) -> Result<Option<Vector>, BlockError> {
        check_arity(self, values)?;
        if !self.parameters.is_empty() {
            return Ok(None);
        }
        let (rhs_values, params) = self.split(values);

        if transpose {
            let mu = self.solve_adjoint(params, action)?;
            self.rhs
                .second_derivative_action(rhs_values, inner, inner_seed, outer, true, &mu)
        } else {
            let term = self
                .rhs
                .second_derivative_action(rhs_values, inner, inner_seed, outer, false, action)?;
            term.map(|t| self.solve_forward(params, &t)).transpose()
        }
    }
}

/// The parameter values a preconditioner takes: none, or the operator's.
fn preconditioner_params<'p>(
    preconditioner: &dyn LinearOperator,
    params: &'p [&'p Vector],
) -> &'p [&'p Vector] {
    if preconditioner.parameter_count() == 0 {
        &[]
    } else {
        params
    }
}

fn add(total: &mut Option<Vector>, term: &Vector) -> Result<(), ContractError> {
    match total.as_mut() {
        Some(acc) => vector::add_assign(acc, term),
        None => {
            *total = Some(term.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;
    use rewind_core::SolveError;
    use rewind_solvers::krylov::{BiCgStab, ConjugateGradient};

    use crate::{FinalFunctional, blocks::LinearCombination};

    /// `A(k) = I + k L` with `L` the 1D Laplacian stencil `[-1, 2, -1]`.
    #[derive(Debug)]
    struct Diffusion {
        size: usize,
    }

    fn laplacian(x: &Vector) -> Vector {
        let n = x.len();
        Vector::from_shape_fn(n, |i| {
            let left = if i > 0 { x[i - 1] } else { 0.0 };
            let right = if i + 1 < n { x[i + 1] } else { 0.0 };
            2.0 * x[i] - left - right
        })
    }

    impl LinearOperator for Diffusion {
        fn name(&self) -> &str {
            "diffusion"
        }

        fn size(&self) -> usize {
            self.size
        }

        fn parameter_count(&self) -> usize {
            1
        }

        fn apply(&self, params: &[&Vector], x: &Vector) -> Vector {
            x + &(laplacian(x) * params[0][0])
        }

        fn apply_transpose(&self, params: &[&Vector], x: &Vector) -> Option<Vector> {
            Some(self.apply(params, x))
        }

        fn derivative_action(
            &self,
            _params: &[&Vector],
            index: usize,
            x: &Vector,
            seed: &Vector,
            transpose: bool,
        ) -> Option<Vector> {
            (index == 0).then(|| {
                let lx = laplacian(x);
                if transpose {
                    array![lx.dot(seed)]
                } else {
                    lx * seed[0]
                }
            })
        }
    }

    /// A symmetric operator with no parameters and no transpose.
    #[derive(Debug)]
    struct Opaque;

    impl LinearOperator for Opaque {
        fn name(&self) -> &str {
            "opaque"
        }

        fn size(&self) -> usize {
            2
        }

        fn apply(&self, _params: &[&Vector], x: &Vector) -> Vector {
            x * 2.0
        }
    }

    /// Symmetric with a transpose, but no parameters.
    #[derive(Debug)]
    struct Scaled;

    impl LinearOperator for Scaled {
        fn name(&self) -> &str {
            "scaled"
        }

        fn size(&self) -> usize {
            3
        }

        fn apply(&self, _params: &[&Vector], x: &Vector) -> Vector {
            let mut y = x * 4.0;
            y[0] += x[1];
            y[1] += x[0];
            y
        }

        fn apply_transpose(&self, params: &[&Vector], x: &Vector) -> Option<Vector> {
            Some(self.apply(params, x))
        }
    }

    /// Jacobi preconditioner for `Diffusion`, reading the same `k`.
    #[derive(Debug)]
    struct DiffusionJacobi {
        parameter_count: usize,
    }

    impl LinearOperator for DiffusionJacobi {
        fn name(&self) -> &str {
            "diffusion jacobi"
        }

        fn size(&self) -> usize {
            4
        }

        fn parameter_count(&self) -> usize {
            self.parameter_count
        }

        fn apply(&self, params: &[&Vector], x: &Vector) -> Vector {
            x / (1.0 + 2.0 * params[0][0])
        }

        fn apply_transpose(&self, params: &[&Vector], x: &Vector) -> Option<Vector> {
            Some(self.apply(params, x))
        }
    }

    /// Conjugate gradient that counts its solves.
    #[derive(Debug)]
    struct Counting {
        inner: ConjugateGradient,
        solves: Rc<Cell<usize>>,
    }

    impl LinearSolver for Counting {
        fn solve(
            &self,
            operator: OperatorAction<'_>,
            preconditioner: Option<OperatorAction<'_>>,
            rhs: &Vector,
            guess: Vector,
        ) -> Result<Vector, SolveError> {
            self.solves.set(self.solves.get() + 1);
            self.inner.solve(operator, preconditioner, rhs, guess)
        }
    }

    fn setup(kappa: f64, b: Vector) -> (Tape, Variable, Variable) {
        let mut tape = Tape::default();
        let b = tape.register_initial_condition("b", b).unwrap();
        let k = tape.register_initial_condition("k", array![kappa]).unwrap();
        MatrixFree::new(ConjugateGradient::default())
            .solve(
                &mut tape,
                "u",
                Rc::new(Diffusion { size: 4 }),
                vec![k.clone()],
                Box::new(LinearCombination::assign(b.clone())),
            )
            .unwrap();
        (tape, b, k)
    }

    #[test]
    fn solve_is_taped_and_checkpointed() {
        let mut tape = Tape::new(crate::Policy::StoreControlsOnly);
        let b = tape.register_initial_condition("b", array![1.0, 2.0, 3.0]).unwrap();
        let (u, value) = MatrixFree::new(ConjugateGradient::default())
            .solve(
                &mut tape,
                "u",
                Rc::new(Scaled),
                Vec::new(),
                Box::new(LinearCombination::assign(b)),
            )
            .unwrap();

        assert_relative_eq!(Scaled.apply(&[], &value), array![1.0, 2.0, 3.0], epsilon = 1e-10);
        assert!(matches!(tape.storage(&u), Ok(crate::Record::Stored(_))));
    }

    #[test]
    fn missing_transpose_is_rejected_before_taping() {
        let mut tape = Tape::default();
        let b = tape.register_initial_condition("b", array![1.0, 1.0]).unwrap();

        let err = MatrixFree::new(ConjugateGradient::default())
            .solve(
                &mut tape,
                "u",
                Rc::new(Opaque),
                Vec::new(),
                Box::new(LinearCombination::assign(b)),
            )
            .unwrap_err();

        assert_eq!(
            err,
            Error::Contract(ContractError::MissingTranspose {
                operator: "opaque".into()
            })
        );
        assert!(tape.registry().history("u").is_empty());
    }

    #[test]
    fn parameter_count_is_checked() {
        let mut tape = Tape::default();
        let b = tape.register_initial_condition("b", array![1.0, 1.0, 1.0, 1.0]).unwrap();

        let err = MatrixFree::new(ConjugateGradient::default())
            .block(
                &tape,
                Rc::new(Diffusion { size: 4 }),
                Vec::new(),
                Box::new(LinearCombination::assign(b)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Contract(ContractError::ArityMismatch { expected: 1, found: 0, .. })
        ));
    }

    #[test]
    fn symmetric_operator_gives_identical_actions() {
        let (tape, b, k) = setup(0.5, array![1.0, 0.0, -1.0, 2.0]);
        let block = MatrixFree::new(ConjugateGradient::default())
            .block(
                &tape,
                Rc::new(Diffusion { size: 4 }),
                vec![k.clone()],
                Box::new(LinearCombination::assign(b.clone())),
            )
            .unwrap();

        let values = [
            tape.value(&b).unwrap(),
            tape.value(&k).unwrap(),
        ];
        let refs: Vec<&Vector> = values.iter().collect();
        let seed = array![0.3, -0.2, 0.9, 0.1];

        let forward = block.derivative_action(&refs, &b, &seed, false).unwrap();
        let adjoint = block.derivative_action(&refs, &b, &seed, true).unwrap();
        assert_eq!(forward, adjoint);
    }

    #[test]
    fn parameter_gradient_matches_finite_difference() {
        let b = array![1.0, 0.0, -1.0, 2.0];
        let functional = FinalFunctional::new("u");

        let (mut tape, _, k) = setup(0.5, b.clone());
        let gradient = tape.compute_gradient_unobserved(&functional, &[k.clone()]).unwrap();

        let h = 1e-5;
        let j = |kappa: f64| {
            let (mut tape, _, _) = setup(kappa, b.clone());
            tape.evaluate_functional(&functional).unwrap()
        };
        let fd = (j(0.5 + h) - j(0.5 - h)) / (2.0 * h);

        assert_relative_eq!(gradient.get(&k).unwrap()[0], fd, max_relative = 1e-6);
    }

    #[test]
    fn tangent_through_parameter_matches_gradient() {
        let (mut tape, _, k) = setup(0.8, array![0.5, 1.0, 1.5, 2.0]);
        let functional = FinalFunctional::new("u");

        let tangent = tape.compute_tangent(&functional, &[(k.clone(), array![1.0])]).unwrap();
        let gradient = tape.compute_gradient_unobserved(&functional, &[k.clone()]).unwrap();

        assert_relative_eq!(tangent, gradient.get(&k).unwrap()[0], max_relative = 1e-9);
    }

    #[test]
    fn nonsymmetric_solver_on_symmetric_operator() {
        let mut tape = Tape::default();
        let b = tape.register_initial_condition("b", array![1.0, 2.0, 3.0]).unwrap();
        MatrixFree::new(BiCgStab::default())
            .solve(
                &mut tape,
                "u",
                Rc::new(Scaled),
                Vec::new(),
                Box::new(LinearCombination::new([(b.clone(), 2.0)])),
            )
            .unwrap();

        // u = 2 A⁻¹ b, J = ½‖u‖², dJ/db = 2 A⁻ᵀ u = 4 A⁻² b
        let gradient = tape
            .compute_gradient_unobserved(&FinalFunctional::new("u"), &[b.clone()])
            .unwrap();
        let u = tape.value(&tape.current("u").unwrap()).unwrap();
        let expected = Scaled.apply(&[], gradient.get(&b).unwrap());
        assert_relative_eq!(expected, u * 2.0, epsilon = 1e-8);
    }

    #[test]
    fn gradient_costs_one_adjoint_solve_per_taped_solve() {
        let solves = Rc::new(Cell::new(0));
        let solver = MatrixFree::new(Counting {
            inner: ConjugateGradient::default(),
            solves: Rc::clone(&solves),
        });

        let mut tape = Tape::new(crate::Policy::StoreControlsOnly);
        let u0 = tape.register_initial_condition("u", array![1.0, 0.0, 2.0, 0.5]).unwrap();
        let k = tape.register_initial_condition("k", array![0.5]).unwrap();
        let mut u = u0.clone();
        for _ in 0..3 {
            (u, _) = solver
                .solve(
                    &mut tape,
                    "u",
                    Rc::new(Diffusion { size: 4 }),
                    vec![k.clone()],
                    Box::new(LinearCombination::assign(u)),
                )
                .unwrap();
        }
        assert_eq!(solves.get(), 3);

        let gradient = tape
            .compute_gradient_unobserved(&FinalFunctional::new("u"), &[u0.clone(), k.clone()])
            .unwrap();
        assert_eq!(gradient.len(), 2);
        assert_eq!(solves.get(), 6);
    }

    #[test]
    fn batched_adjoint_matches_single_actions() {
        let (tape, b, k) = setup(0.7, array![1.0, -1.0, 0.5, 2.0]);
        let block = MatrixFree::new(ConjugateGradient::default())
            .block(
                &tape,
                Rc::new(Diffusion { size: 4 }),
                vec![k.clone()],
                Box::new(LinearCombination::assign(b.clone())),
            )
            .unwrap();

        let values = [tape.value(&b).unwrap(), tape.value(&k).unwrap()];
        let refs: Vec<&Vector> = values.iter().collect();
        let output = block.evaluate(&refs).unwrap();
        let seed = array![0.2, 0.4, -0.1, 1.0];

        let batched = block
            .adjoint_actions(&refs, Some(&output), &[&b, &k], &seed)
            .unwrap();
        for (variable, action) in [&b, &k].into_iter().zip(&batched) {
            let single = block.derivative_action(&refs, variable, &seed, true).unwrap();
            assert_relative_eq!(*action, single, max_relative = 1e-12);
        }
    }

    #[test]
    fn parameterised_preconditioner_receives_operator_parameters() {
        let b = array![1.0, 0.0, -1.0, 2.0];
        let functional = FinalFunctional::new("u");
        let (mut plain, _, plain_k) = setup(0.5, b.clone());
        let expected = plain.compute_gradient_unobserved(&functional, &[plain_k.clone()]).unwrap();

        let mut tape = Tape::default();
        let rhs = tape.register_initial_condition("b", b).unwrap();
        let k = tape.register_initial_condition("k", array![0.5]).unwrap();
        MatrixFree::new(ConjugateGradient::default())
            .with_preconditioner(DiffusionJacobi { parameter_count: 1 })
            .solve(
                &mut tape,
                "u",
                Rc::new(Diffusion { size: 4 }),
                vec![k.clone()],
                Box::new(LinearCombination::assign(rhs)),
            )
            .unwrap();
        let gradient = tape.compute_gradient_unobserved(&functional, &[k.clone()]).unwrap();

        assert_relative_eq!(
            gradient.get(&k).unwrap(),
            expected.get(&plain_k).unwrap(),
            max_relative = 1e-9
        );
    }

    #[test]
    fn preconditioner_parameter_count_is_checked() {
        let (tape, b, k) = setup(0.5, array![1.0, 1.0, 1.0, 1.0]);

        let err = MatrixFree::new(ConjugateGradient::default())
            .with_preconditioner(DiffusionJacobi { parameter_count: 2 })
            .block(
                &tape,
                Rc::new(Diffusion { size: 4 }),
                vec![k],
                Box::new(LinearCombination::assign(b)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Contract(ContractError::ArityMismatch { expected: 1, found: 2, .. })
        ));
    }
}
