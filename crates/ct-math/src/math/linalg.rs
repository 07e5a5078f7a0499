//! Dense linear algebra for small symmetric positive-definite systems.
//!
//! Matrices are `d×d`, stored row-major in a flat `Vec<f64>`. Every solve goes
//! through a Cholesky factor `A = L Lᵀ`; no explicit inverse is ever formed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from factorization and solves.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinalgError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("matrix is not positive definite (pivot {index} = {value:e})")]
    NotPositiveDefinite { index: usize, value: f64 },

    #[error("non-finite value encountered")]
    NonFinite,

    #[error("rank-one weight must be positive and finite (got {0})")]
    InvalidWeight(f64),
}

/// Inner product. Slices are assumed to have equal length.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut s = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        s += x * y;
    }
    s
}

/// `scale · I` as a flat row-major matrix.
pub fn identity_scaled(dim: usize, scale: f64) -> Vec<f64> {
    let mut m = vec![0.0; dim * dim];
    for i in 0..dim {
        m[i * dim + i] = scale;
    }
    m
}

/// Matrix-vector multiply: `A x`.
pub fn mat_vec(a: &[f64], dim: usize, x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; dim];
    for (i, slot) in out.iter_mut().enumerate() {
        let row = &a[i * dim..(i + 1) * dim];
        *slot = dot(row, x);
    }
    out
}

/// In-place `A += w · x xᵀ`.
pub fn add_outer(a: &mut [f64], dim: usize, x: &[f64], weight: f64) {
    for i in 0..dim {
        let wi = weight * x[i];
        for j in 0..dim {
            a[i * dim + j] += wi * x[j];
        }
    }
}

/// Symmetry check with an absolute tolerance.
pub fn is_symmetric(a: &[f64], dim: usize, tol: f64) -> bool {
    if a.len() != dim * dim {
        return false;
    }
    for i in 0..dim {
        for j in (i + 1)..dim {
            if (a[i * dim + j] - a[j * dim + i]).abs() > tol {
                return false;
            }
        }
    }
    true
}

fn check_len(expected: usize, actual: usize) -> Result<(), LinalgError> {
    if expected != actual {
        return Err(LinalgError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Lower-triangular Cholesky factor of an SPD matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cholesky {
    dim: usize,
    lower: Vec<f64>,
}

impl Cholesky {
    /// Factor `a` (row-major, `dim×dim`). Only the lower triangle is read.
    pub fn factor(a: &[f64], dim: usize) -> Result<Self, LinalgError> {
        check_len(dim * dim, a.len())?;
        let mut l = vec![0.0; dim * dim];
        for j in 0..dim {
            let mut diag = a[j * dim + j];
            for k in 0..j {
                diag -= l[j * dim + k] * l[j * dim + k];
            }
            if !diag.is_finite() {
                return Err(LinalgError::NonFinite);
            }
            if diag <= 0.0 {
                return Err(LinalgError::NotPositiveDefinite {
                    index: j,
                    value: diag,
                });
            }
            let ljj = diag.sqrt();
            l[j * dim + j] = ljj;
            for i in (j + 1)..dim {
                let mut s = a[i * dim + j];
                for k in 0..j {
                    s -= l[i * dim + k] * l[j * dim + k];
                }
                l[i * dim + j] = s / ljj;
            }
        }
        if l.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        Ok(Self { dim, lower: l })
    }

    /// Factor of `scale · I`.
    pub fn scaled_identity(dim: usize, scale: f64) -> Result<Self, LinalgError> {
        Self::factor(&identity_scaled(dim, scale), dim)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The factor `L`, row-major with zeros above the diagonal.
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Solve `L y = b`.
    pub fn forward(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        check_len(self.dim, b.len())?;
        let d = self.dim;
        let mut y = vec![0.0; d];
        for i in 0..d {
            let mut s = b[i];
            for k in 0..i {
                s -= self.lower[i * d + k] * y[k];
            }
            y[i] = s / self.lower[i * d + i];
        }
        Ok(y)
    }

    /// Solve `Lᵀ x = y`.
    pub fn backward_transposed(&self, y: &[f64]) -> Result<Vec<f64>, LinalgError> {
        check_len(self.dim, y.len())?;
        let d = self.dim;
        let mut x = vec![0.0; d];
        for i in (0..d).rev() {
            let mut s = y[i];
            for k in (i + 1)..d {
                s -= self.lower[k * d + i] * x[k];
            }
            x[i] = s / self.lower[i * d + i];
        }
        Ok(x)
    }

    /// Solve `A x = b` with two triangular solves.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        let y = self.forward(b)?;
        let x = self.backward_transposed(&y)?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        Ok(x)
    }

    /// `xᵀ A⁻¹ x`, computed as `‖L⁻¹x‖²`. Never negative.
    pub fn inverse_quad_form(&self, x: &[f64]) -> Result<f64, LinalgError> {
        let y = self.forward(x)?;
        let q = dot(&y, &y);
        if !q.is_finite() {
            return Err(LinalgError::NonFinite);
        }
        Ok(q)
    }

    /// Update the factor in place so that it factors `A + w · x xᵀ`.
    ///
    /// O(d²). On error the factor is left untouched.
    pub fn rank_one_update(&mut self, x: &[f64], weight: f64) -> Result<(), LinalgError> {
        check_len(self.dim, x.len())?;
        if !(weight.is_finite() && weight > 0.0) {
            return Err(LinalgError::InvalidWeight(weight));
        }
        let d = self.dim;
        let scale = weight.sqrt();
        let mut v: Vec<f64> = x.iter().map(|xi| xi * scale).collect();
        let mut l = self.lower.clone();

        for k in 0..d {
            let lkk = l[k * d + k];
            let r = (lkk * lkk + v[k] * v[k]).sqrt();
            if !(r.is_finite() && r > 0.0) {
                return Err(LinalgError::NotPositiveDefinite { index: k, value: r });
            }
            let c = r / lkk;
            let s = v[k] / lkk;
            l[k * d + k] = r;
            for i in (k + 1)..d {
                let lik = (l[i * d + k] + s * v[i]) / c;
                l[i * d + k] = lik;
                v[i] = c * v[i] - s * lik;
            }
        }
        if l.iter().any(|val| !val.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        self.lower = l;
        Ok(())
    }

    /// `L Lᵀ`.
    pub fn reconstruct(&self) -> Vec<f64> {
        let d = self.dim;
        let mut a = vec![0.0; d * d];
        for i in 0..d {
            for j in 0..=i {
                let mut s = 0.0;
                for k in 0..=j {
                    s += self.lower[i * d + k] * self.lower[j * d + k];
                }
                a[i * d + j] = s;
                a[j * d + i] = s;
            }
        }
        a
    }
}
