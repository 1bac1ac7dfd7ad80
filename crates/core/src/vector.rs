//! Small numeric helpers shared by blocks, solvers, and sweeps.

use crate::{ContractError, Vector};

/// Euclidean inner product.
///
/// # Errors
///
/// Returns [`ContractError::ShapeMismatch`] if the lengths differ.
pub fn inner(a: &Vector, b: &Vector) -> Result<f64, ContractError> {
    ContractError::check_len(a.len(), b.len())?;
    Ok(a.dot(b))
}

/// Euclidean norm.
#[must_use]
pub fn norm(a: &Vector) -> f64 {
    a.dot(a).sqrt()
}

/// Largest absolute entry, or zero for an empty vector.
#[must_use]
pub fn norm_inf(a: &Vector) -> f64 {
    a.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

/// Returns true if every entry is exactly zero.
#[must_use]
pub fn is_zero(a: &Vector) -> bool {
    a.iter().all(|v| *v == 0.0)
}

/// Adds `b` into `a` in place.
///
/// # Errors
///
/// Returns [`ContractError::ShapeMismatch`] if the lengths differ.
pub fn add_assign(a: &mut Vector, b: &Vector) -> Result<(), ContractError> {
    ContractError::check_len(a.len(), b.len())?;
    *a += b;
    Ok(())
}

/// Sums a sequence of equally sized vectors.
///
/// Returns `None` for an empty sequence.
///
/// # Errors
///
/// Returns [`ContractError::ShapeMismatch`] if the lengths differ.
pub fn sum<I>(vectors: I) -> Result<Option<Vector>, ContractError>
where
    I: IntoIterator<Item = Vector>,
{
    let mut total: Option<Vector> = None;
    for v in vectors {
        match total.as_mut() {
            Some(acc) => add_assign(acc, &v)?,
            None => total = Some(v),
        }
    }
    Ok(total)
}
