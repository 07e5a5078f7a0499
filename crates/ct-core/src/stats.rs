//! Per-arm sufficient statistics and the shared store that owns them.
//!
//! Two families:
//! - [`RidgeStats`] for linear UCB: `A = λI + Σ x xᵀ`, `b = Σ r x`.
//! - [`GaussianStats`] for Thompson sampling: precision
//!   `P = I/v + Σ x xᵀ/σ²`, `f = Σ r x/σ²`, posterior mean `P⁻¹ f`.
//!
//! Both keep the Cholesky factor of their matrix current with O(d²)
//! rank-one updates and rebuild it from the accumulated matrix every
//! `refactor_interval` updates. Updates are computed on a copy and committed
//! only on success, so a failed update leaves the arm bit-identical.

use std::sync::{Mutex, MutexGuard};

use ct_common::{ArmId, Error, Result};
use ct_config::{PolicyConfig, StrategyConfig};
use ct_math::{add_outer, dot, identity_scaled, is_symmetric, Cholesky, LinalgError};
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const SYMMETRY_TOL: f64 = 1e-8;
/// Largest relative Frobenius error allowed between `L Lᵀ` and the
/// accumulated matrix in a checkpoint.
const FACTOR_TOL: f64 = 1e-8;

fn singular(arm: ArmId, err: LinalgError) -> Error {
    Error::SingularUpdate {
        arm: arm.index(),
        detail: err.to_string(),
    }
}

// ── Ridge (UCB) ─────────────────────────────────────────────────────────

/// Ridge-regression accumulators for one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RidgeStats {
    pub dim: usize,
    pub regularization: f64,
    /// `A`, row-major `d×d`.
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    #[schemars(with = "CholeskySchema")]
    pub factor: Cholesky,
    pub n_updates: u64,
    pub updates_since_refactor: u64,
}

impl RidgeStats {
    pub fn new(dim: usize, regularization: f64) -> std::result::Result<Self, LinalgError> {
        Ok(Self {
            dim,
            regularization,
            a: identity_scaled(dim, regularization),
            b: vec![0.0; dim],
            factor: Cholesky::scaled_identity(dim, regularization)?,
            n_updates: 0,
            updates_since_refactor: 0,
        })
    }

    /// `θ = A⁻¹ b`.
    pub fn theta(&self) -> std::result::Result<Vec<f64>, LinalgError> {
        self.factor.solve(&self.b)
    }

    /// `xᵀ A⁻¹ x`.
    pub fn inverse_quad_form(&self, x: &[f64]) -> std::result::Result<f64, LinalgError> {
        self.factor.inverse_quad_form(x)
    }

    fn updated(
        &self,
        x: &[f64],
        reward: f64,
        refactor_interval: u64,
    ) -> std::result::Result<Self, LinalgError> {
        let mut next = self.clone();
        add_outer(&mut next.a, self.dim, x, 1.0);
        for (bi, xi) in next.b.iter_mut().zip(x) {
            *bi += reward * xi;
        }
        next.n_updates += 1;
        next.updates_since_refactor += 1;
        if next.updates_since_refactor >= refactor_interval {
            next.factor = Cholesky::factor(&next.a, self.dim)?;
            next.updates_since_refactor = 0;
        } else {
            next.factor.rank_one_update(x, 1.0)?;
        }
        if next.b.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        Ok(next)
    }
}

// ── Gaussian (Thompson) ─────────────────────────────────────────────────

/// Bayesian linear-regression posterior for one arm, in precision form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GaussianStats {
    pub dim: usize,
    pub prior_variance: f64,
    pub noise_variance: f64,
    /// Precision `P`, row-major `d×d`.
    pub precision: Vec<f64>,
    /// Precision-weighted mean `f = P μ`.
    pub f: Vec<f64>,
    #[schemars(with = "CholeskySchema")]
    pub factor: Cholesky,
    pub n_updates: u64,
    pub updates_since_refactor: u64,
}

impl GaussianStats {
    pub fn new(
        dim: usize,
        prior_variance: f64,
        noise_variance: f64,
    ) -> std::result::Result<Self, LinalgError> {
        let prior_precision = 1.0 / prior_variance;
        Ok(Self {
            dim,
            prior_variance,
            noise_variance,
            precision: identity_scaled(dim, prior_precision),
            f: vec![0.0; dim],
            factor: Cholesky::scaled_identity(dim, prior_precision)?,
            n_updates: 0,
            updates_since_refactor: 0,
        })
    }

    /// Posterior mean `μ = P⁻¹ f`.
    pub fn mean(&self) -> std::result::Result<Vec<f64>, LinalgError> {
        self.factor.solve(&self.f)
    }

    /// Posterior predictive variance of the mean prediction, `xᵀ Σ x`.
    pub fn predictive_variance(&self, x: &[f64]) -> std::result::Result<f64, LinalgError> {
        self.factor.inverse_quad_form(x)
    }

    /// Draw `θ̃ ~ N(μ, Σ)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> std::result::Result<Vec<f64>, LinalgError> {
        let mean = self.mean()?;
        ct_math::sample_from_precision(&mean, &self.factor, rng)
    }

    fn updated(
        &self,
        x: &[f64],
        reward: f64,
        refactor_interval: u64,
    ) -> std::result::Result<Self, LinalgError> {
        let w = 1.0 / self.noise_variance;
        let mut next = self.clone();
        add_outer(&mut next.precision, self.dim, x, w);
        for (fi, xi) in next.f.iter_mut().zip(x) {
            *fi += reward * xi * w;
        }
        next.n_updates += 1;
        next.updates_since_refactor += 1;
        if next.updates_since_refactor >= refactor_interval {
            next.factor = Cholesky::factor(&next.precision, self.dim)?;
            next.updates_since_refactor = 0;
        } else {
            next.factor.rank_one_update(x, w)?;
        }
        if next.f.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        Ok(next)
    }
}

/// Schema stand-in for the serialized Cholesky factor.
#[derive(JsonSchema)]
#[allow(dead_code)]
struct CholeskySchema {
    dim: usize,
    lower: Vec<f64>,
}

// ── ArmStats ────────────────────────────────────────────────────────────

/// Statistics for one arm, tagged by family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArmStats {
    Ridge(RidgeStats),
    Gaussian(GaussianStats),
}

impl ArmStats {
    /// Fresh, zero-observation statistics for the configured strategy.
    pub fn initial(policy: &PolicyConfig, arm: ArmId) -> Result<Self> {
        let dim = policy.context_dimension;
        match policy.strategy {
            StrategyConfig::Ucb { .. } => RidgeStats::new(dim, policy.regularization)
                .map(ArmStats::Ridge)
                .map_err(|e| singular(arm, e)),
            StrategyConfig::Thompson {
                prior_variance,
                noise_variance,
            } => GaussianStats::new(dim, prior_variance, noise_variance)
                .map(ArmStats::Gaussian)
                .map_err(|e| singular(arm, e)),
        }
    }

    /// Family name, matching the strategy that uses it.
    pub fn strategy(&self) -> &'static str {
        match self {
            ArmStats::Ridge(_) => "ucb",
            ArmStats::Gaussian(_) => "thompson",
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            ArmStats::Ridge(s) => s.dim,
            ArmStats::Gaussian(s) => s.dim,
        }
    }

    pub fn n_updates(&self) -> u64 {
        match self {
            ArmStats::Ridge(s) => s.n_updates,
            ArmStats::Gaussian(s) => s.n_updates,
        }
    }

    /// Point estimate `θ·x` (ridge) or `μ·x` (posterior mean).
    pub fn point_estimate(&self, x: &[f64]) -> std::result::Result<f64, LinalgError> {
        let coef = match self {
            ArmStats::Ridge(s) => s.theta()?,
            ArmStats::Gaussian(s) => s.mean()?,
        };
        Ok(dot(&coef, x))
    }

    /// Copy with one observation folded in. `self` is never modified.
    pub fn updated(
        &self,
        arm: ArmId,
        x: &[f64],
        reward: f64,
        refactor_interval: u64,
    ) -> Result<Self> {
        if x.len() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: x.len(),
            });
        }
        if !reward.is_finite() {
            return Err(singular(arm, LinalgError::NonFinite));
        }
        let interval = refactor_interval.max(1);
        match self {
            ArmStats::Ridge(s) => s.updated(x, reward, interval).map(ArmStats::Ridge),
            ArmStats::Gaussian(s) => s.updated(x, reward, interval).map(ArmStats::Gaussian),
        }
        .map_err(|e| singular(arm, e))
    }

    /// Structural checks for statistics read from a checkpoint.
    pub fn validate(&self, expected_dim: usize) -> std::result::Result<(), String> {
        let (dim, matrix, vector, factor) = match self {
            ArmStats::Ridge(s) => {
                if !(s.regularization.is_finite() && s.regularization > 0.0) {
                    return Err(format!("regularization {} is not positive", s.regularization));
                }
                (s.dim, &s.a, &s.b, &s.factor)
            }
            ArmStats::Gaussian(s) => {
                if !(s.prior_variance > 0.0 && s.noise_variance > 0.0) {
                    return Err("variances must be positive".to_string());
                }
                (s.dim, &s.precision, &s.f, &s.factor)
            }
        };
        if dim != expected_dim {
            return Err(format!("dimension {} != {}", dim, expected_dim));
        }
        if matrix.len() != dim * dim || vector.len() != dim || factor.dim() != dim {
            return Err("matrix/vector/factor shapes disagree with dimension".to_string());
        }
        if factor.lower().len() != dim * dim {
            return Err("factor has the wrong number of entries".to_string());
        }
        if matrix
            .iter()
            .chain(vector.iter())
            .chain(factor.lower().iter())
            .any(|v| !v.is_finite())
        {
            return Err("non-finite entries".to_string());
        }
        if !is_symmetric(matrix, dim, SYMMETRY_TOL) {
            return Err("accumulated matrix is not symmetric".to_string());
        }
        let lower = factor.lower();
        if (0..dim).any(|i| lower[i * dim + i] <= 0.0) {
            return Err("factor diagonal is not positive".to_string());
        }
        if (0..dim).any(|i| ((i + 1)..dim).any(|j| lower[i * dim + j] != 0.0)) {
            return Err("factor is not lower triangular".to_string());
        }
        Cholesky::factor(matrix, dim).map_err(|e| e.to_string())?;
        let error = relative_error(&factor.reconstruct(), matrix);
        if !error.is_finite() || error > FACTOR_TOL {
            return Err(format!(
                "factor does not reproduce the accumulated matrix (relative error {:.3e})",
                error
            ));
        }
        Ok(())
    }
}

/// `‖actual - expected‖_F / ‖expected‖_F`.
fn relative_error(actual: &[f64], expected: &[f64]) -> f64 {
    let diff: f64 = actual
        .iter()
        .zip(expected)
        .map(|(a, e)| (a - e) * (a - e))
        .sum();
    let norm: f64 = expected.iter().map(|e| e * e).sum();
    (diff / norm.max(f64::MIN_POSITIVE)).sqrt()
}

// ── ArmStore ────────────────────────────────────────────────────────────

/// Arena of per-arm statistics indexed by [`ArmId`].
///
/// Each arm sits behind its own mutex so concurrent streams sharing a
/// population store serialize updates per arm. Readers take a snapshot.
#[derive(Debug)]
pub struct ArmStore {
    arms: Vec<Mutex<ArmStats>>,
    dim: usize,
}

impl ArmStore {
    /// Zero-observation store for `n_arms` arms.
    pub fn new(policy: &PolicyConfig, n_arms: usize) -> Result<Self> {
        let arms = (0..n_arms)
            .map(|i| ArmStats::initial(policy, ArmId(i)).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            arms,
            dim: policy.context_dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn lock(&self, arm: ArmId) -> Result<MutexGuard<'_, ArmStats>> {
        let slot = self
            .arms
            .get(arm.index())
            .ok_or_else(|| Error::StateCorrupted(format!("arm {} is not in the store", arm)))?;
        slot.lock()
            .map_err(|_| Error::StateCorrupted(format!("arm {} lock poisoned", arm)))
    }

    /// Copy of one arm's statistics.
    pub fn get(&self, arm: ArmId) -> Result<ArmStats> {
        Ok(self.lock(arm)?.clone())
    }

    /// Every arm lock, taken in index order.
    fn lock_all(&self) -> Result<Vec<MutexGuard<'_, ArmStats>>> {
        (0..self.arms.len()).map(|i| self.lock(ArmId(i))).collect()
    }

    /// Copy of every arm, in arm order, taken under all arm locks so a
    /// concurrent [`ArmStore::replace_all`] is seen entirely or not at all.
    pub fn snapshot(&self) -> Result<Vec<ArmStats>> {
        Ok(self.lock_all()?.iter().map(|g| (**g).clone()).collect())
    }

    /// Fold one observation into `arm`. On error the arm is unchanged.
    pub fn update(
        &self,
        arm: ArmId,
        x: &[f64],
        reward: f64,
        refactor_interval: u64,
    ) -> Result<()> {
        let mut guard = self.lock(arm)?;
        let next = guard.updated(arm, x, reward, refactor_interval)?;
        *guard = next;
        Ok(())
    }

    /// Replace every arm, e.g. from a checkpoint. Shapes must already match.
    ///
    /// All arm locks are held for the swap, so readers of a shared store
    /// never observe a mix of old and new arms.
    pub fn replace_all(&self, stats: Vec<ArmStats>) -> Result<()> {
        if stats.len() != self.arms.len() {
            return Err(Error::StateMismatch(format!(
                "checkpoint has {} arms, store has {}",
                stats.len(),
                self.arms.len()
            )));
        }
        let mut guards = self.lock_all()?;
        for (guard, s) in guards.iter_mut().zip(stats) {
            **guard = s;
        }
        Ok(())
    }
}
