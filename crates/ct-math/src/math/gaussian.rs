//! Multivariate Gaussian sampling in precision form.

use rand::Rng;
use rand_distr::StandardNormal;

use super::linalg::{Cholesky, LinalgError};

/// Draw `θ ~ N(mean, P⁻¹)` where `precision_factor` is the Cholesky factor of `P`.
///
/// With `P = L Lᵀ`, `u = L⁻ᵀ z` for `z ~ N(0, I)` has covariance `P⁻¹`, so no
/// covariance matrix is ever materialized. Exactly `d` standard normals are
/// consumed from `rng`, in coordinate order.
pub fn sample_from_precision<R: Rng + ?Sized>(
    mean: &[f64],
    precision_factor: &Cholesky,
    rng: &mut R,
) -> Result<Vec<f64>, LinalgError> {
    let d = precision_factor.dim();
    if mean.len() != d {
        return Err(LinalgError::DimensionMismatch {
            expected: d,
            actual: mean.len(),
        });
    }
    let z: Vec<f64> = (0..d).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
    let u = precision_factor.backward_transposed(&z)?;
    let theta: Vec<f64> = mean.iter().zip(u.iter()).map(|(m, e)| m + e).collect();
    if theta.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    Ok(theta)
}
