//! Thompson sampling over Bayesian linear-regression posteriors.
//!
//! The generator for round `k` is seeded from `(seed, k)`, so a replayed
//! round sequence (including one resumed from a checkpoint) draws exactly
//! the same samples. Eligible arms are sampled in ascending order.

use ct_common::{ArmId, Error, Result, RoundId};
use ct_math::dot;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{argmax, check_dim, mix, numerical, stats_for, ArmScore, BanditPolicy, Selection};
use crate::context::Context;
use crate::stats::{ArmStats, GaussianStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThompsonPolicy {
    seed: u64,
}

impl ThompsonPolicy {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Generator for one round.
    pub fn round_rng(&self, round: RoundId) -> StdRng {
        StdRng::seed_from_u64(mix(self.seed, round.0))
    }
}

fn gaussian(stats: &ArmStats, arm: ArmId) -> Result<&GaussianStats> {
    match stats {
        ArmStats::Gaussian(g) => Ok(g),
        other => Err(Error::StateCorrupted(format!(
            "arm {} holds {} statistics, Thompson needs gaussian",
            arm,
            other.strategy()
        ))),
    }
}

impl BanditPolicy for ThompsonPolicy {
    fn name(&self) -> &'static str {
        "thompson"
    }

    fn select(
        &self,
        stats: &[ArmStats],
        eligible: &[ArmId],
        context: &Context,
        round: RoundId,
    ) -> Result<Selection> {
        let x = context.as_slice();
        let mut rng = self.round_rng(round);
        let mut scores = Vec::with_capacity(eligible.len());
        for &arm in eligible {
            let s = stats_for(stats, arm)?;
            check_dim(s, context)?;
            let g = gaussian(s, arm)?;
            let sample = g.sample(&mut rng).map_err(|e| numerical(arm, e))?;
            let mean = g.mean().map_err(|e| numerical(arm, e))?;
            let variance = g.predictive_variance(x).map_err(|e| numerical(arm, e))?;
            scores.push(ArmScore {
                arm,
                score: dot(&sample, x),
                estimate: dot(&mean, x),
                confidence: variance,
            });
        }
        let best = argmax(&scores)?;
        let chosen = &scores[best];
        Ok(Selection {
            arm: chosen.arm,
            predicted_reward: chosen.estimate,
            confidence: chosen.confidence,
            scores,
        })
    }
}
