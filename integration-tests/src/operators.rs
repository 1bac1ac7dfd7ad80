use ndarray::array;
use rewind_core::{LinearOperator, Vector};

/// The 1D Dirichlet Laplacian stencil `[-1, 2, -1]`.
fn laplacian(x: &Vector) -> Vector {
    let n = x.len();
    Vector::from_shape_fn(n, |i| {
        let left = if i > 0 { x[i - 1] } else { 0.0 };
        let right = if i + 1 < n { x[i + 1] } else { 0.0 };
        2.0 * x[i] - left - right
    })
}

/// Upwind first difference `x_i − x_{i−1}`.
fn upwind(x: &Vector) -> Vector {
    Vector::from_shape_fn(x.len(), |i| x[i] - if i > 0 { x[i - 1] } else { 0.0 })
}

/// Transpose of [`upwind`].
fn upwind_transpose(x: &Vector) -> Vector {
    let n = x.len();
    Vector::from_shape_fn(n, |i| x[i] - if i + 1 < n { x[i + 1] } else { 0.0 })
}

fn kappa_derivative(x: &Vector, seed: &Vector, transpose: bool) -> Vector {
    let lx = laplacian(x);
    if transpose {
        array![lx.dot(seed)]
    } else {
        lx * seed[0]
    }
}

/// Implicit diffusion step `A(κ) = I + κ L`, symmetric positive-definite for
/// `κ ≥ 0`.
///
/// The single parameter is the length-one vector `κ`.
#[derive(Debug, Clone, Copy)]
pub struct Diffusion {
    pub size: usize,
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
        (index == 0).then(|| kappa_derivative(x, seed, transpose))
    }
}

/// Implicit advection-diffusion step `A(κ) = I + κ L + c D`.
///
/// Nonsymmetric for `c ≠ 0`, so solves need BiCGSTAB.
#[derive(Debug, Clone, Copy)]
pub struct Advection {
    pub size: usize,
    pub velocity: f64,
}

impl LinearOperator for Advection {
    fn name(&self) -> &str {
        "advection"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn parameter_count(&self) -> usize {
        1
    }

    fn apply(&self, params: &[&Vector], x: &Vector) -> Vector {
        x + &(laplacian(x) * params[0][0]) + &(upwind(x) * self.velocity)
    }

    fn apply_transpose(&self, params: &[&Vector], x: &Vector) -> Option<Vector> {
        Some(x + &(laplacian(x) * params[0][0]) + &(upwind_transpose(x) * self.velocity))
    }

    fn derivative_action(
        &self,
        _params: &[&Vector],
        index: usize,
        x: &Vector,
        seed: &Vector,
        transpose: bool,
    ) -> Option<Vector> {
        (index == 0).then(|| kappa_derivative(x, seed, transpose))
    }
}

/// A parameter-free operator `2 I` that cannot apply its transpose.
#[derive(Debug, Clone, Copy)]
pub struct NoTranspose {
    pub size: usize,
}

impl LinearOperator for NoTranspose {
    fn name(&self) -> &str {
        "no transpose"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn apply(&self, _params: &[&Vector], x: &Vector) -> Vector {
        x * 2.0
    }
}

/// A fixed diagonal preconditioner `x -> x / d`.
#[derive(Debug, Clone, Copy)]
pub struct Jacobi {
    pub size: usize,
    pub diagonal: f64,
}

impl LinearOperator for Jacobi {
    fn name(&self) -> &str {
        "jacobi"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn apply(&self, _params: &[&Vector], x: &Vector) -> Vector {
        x / self.diagonal
    }

    fn apply_transpose(&self, params: &[&Vector], x: &Vector) -> Option<Vector> {
        Some(self.apply(params, x))
    }
}
