//! Bandit policies.
//!
//! A policy scores every eligible arm against the round's context using a
//! snapshot of the arm statistics and returns the argmax. Policies never
//! mutate statistics; the engine applies updates after outcomes arrive.
//!
//! Ties go to the lowest arm index: arms are scored in ascending order and
//! the incumbent is replaced only by a strictly greater score.

pub mod thompson;
pub mod ucb;

pub use thompson::ThompsonPolicy;
pub use ucb::UcbPolicy;

use ct_common::{ArmId, Error, Result, RoundId};
use ct_config::{PolicyConfig, StrategyConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::stats::ArmStats;

/// Score breakdown for one eligible arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArmScore {
    pub arm: ArmId,
    /// Value the argmax ran over (UCB index or sampled reward).
    pub score: f64,
    /// Point estimate of the expected reward.
    pub estimate: f64,
    /// Uncertainty; larger means less confident.
    pub confidence: f64,
}

/// Output of one policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Selection {
    pub arm: ArmId,
    pub predicted_reward: f64,
    pub confidence: f64,
    /// Every eligible arm, ascending.
    pub scores: Vec<ArmScore>,
}

/// Interchangeable selection strategy.
pub trait BanditPolicy: Send + Sync + std::fmt::Debug {
    /// Strategy name as it appears in configuration and checkpoints.
    fn name(&self) -> &'static str;

    /// Pick an arm among `eligible` (ascending, non-empty).
    fn select(
        &self,
        stats: &[ArmStats],
        eligible: &[ArmId],
        context: &Context,
        round: RoundId,
    ) -> Result<Selection>;
}

/// Build the configured policy. `stream_salt` decorrelates random streams of
/// engines that share a seed.
pub fn build_policy(config: &PolicyConfig, stream_salt: u64) -> Box<dyn BanditPolicy> {
    match config.strategy {
        StrategyConfig::Ucb { alpha } => Box::new(UcbPolicy::new(alpha)),
        StrategyConfig::Thompson { .. } => {
            Box::new(ThompsonPolicy::new(config.seed ^ stream_salt))
        }
    }
}

/// Lowest-index argmax over scores in ascending arm order.
pub fn argmax(scores: &[ArmScore]) -> Result<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in scores.iter().enumerate() {
        if !s.score.is_finite() {
            return Err(Error::NumericalInstability(format!(
                "arm {} scored {}",
                s.arm, s.score
            )));
        }
        match best {
            Some((_, top)) if s.score <= top => {}
            _ => best = Some((i, s.score)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| Error::InvalidContext("no arms to score".to_string()))
}

pub(crate) fn stats_for<'a>(stats: &'a [ArmStats], arm: ArmId) -> Result<&'a ArmStats> {
    stats
        .get(arm.index())
        .ok_or_else(|| Error::StateCorrupted(format!("no statistics for arm {}", arm)))
}

pub(crate) fn check_dim(stats: &ArmStats, context: &Context) -> Result<()> {
    if stats.dim() != context.dim() {
        return Err(Error::DimensionMismatch {
            expected: stats.dim(),
            actual: context.dim(),
        });
    }
    Ok(())
}

pub(crate) fn numerical(arm: ArmId, err: ct_math::LinalgError) -> Error {
    Error::NumericalInstability(format!("arm {}: {}", arm, err))
}

/// SplitMix64 finalizer; turns `(seed, round)` into a well-mixed RNG seed.
pub(crate) fn mix(seed: u64, round: u64) -> u64 {
    let mut z = seed ^ round.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
