//! Linear UCB (ridge regression per arm).
//!
//! `s_a = θ_a·x + α·sqrt(xᵀ A_a⁻¹ x)`; the exploration bonus doubles as the
//! round's confidence value.

use ct_common::{ArmId, Error, Result, RoundId};
use ct_math::dot;

use super::{argmax, check_dim, numerical, stats_for, ArmScore, BanditPolicy, Selection};
use crate::context::Context;
use crate::stats::ArmStats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UcbPolicy {
    alpha: f64,
}

impl UcbPolicy {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn score_arm(&self, stats: &ArmStats, arm: ArmId, x: &[f64]) -> Result<ArmScore> {
        let ArmStats::Ridge(ridge) = stats else {
            return Err(Error::StateCorrupted(format!(
                "arm {} holds {} statistics, UCB needs ridge",
                arm,
                stats.strategy()
            )));
        };
        let theta = ridge.theta().map_err(|e| numerical(arm, e))?;
        let estimate = dot(&theta, x);
        let quad = ridge.inverse_quad_form(x).map_err(|e| numerical(arm, e))?;
        let bonus = self.alpha * quad.sqrt();
        Ok(ArmScore {
            arm,
            score: estimate + bonus,
            estimate,
            confidence: bonus,
        })
    }
}

impl BanditPolicy for UcbPolicy {
    fn name(&self) -> &'static str {
        "ucb"
    }

    fn select(
        &self,
        stats: &[ArmStats],
        eligible: &[ArmId],
        context: &Context,
        _round: RoundId,
    ) -> Result<Selection> {
        let x = context.as_slice();
        let mut scores = Vec::with_capacity(eligible.len());
        for &arm in eligible {
            let s = stats_for(stats, arm)?;
            check_dim(s, context)?;
            scores.push(self.score_arm(s, arm, x)?);
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
