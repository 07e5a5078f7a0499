//! Online evaluation over closed round records.
//!
//! Read-only consumer: it never touches arm statistics. With an oracle
//! (synthetic runs only) it tracks cumulative regret against the best
//! eligible expected reward, both realized (`best − observed reward`) and
//! pseudo (`best − expected reward of the administered arm`).

use ct_common::ArmId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::round::{RoundRecord, RoundStatus};

/// Noise-free expected rewards for one round, supplied by a simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OracleValues {
    /// Best expected reward over the arms the round could have used.
    pub best: f64,
    /// Expected reward of the arm actually administered.
    pub administered: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrajectoryPoint {
    /// 1-based count of resolved rounds.
    pub step: u64,
    pub cumulative_reward: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_regret: Option<f64>,
}

/// Point-in-time evaluator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationSummary {
    pub rounds_resolved: u64,
    pub rounds_expired: u64,
    pub rounds_discarded: u64,
    pub cumulative_reward: f64,
    pub mean_reward: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_regret: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_pseudo_regret: Option<f64>,
    pub overrides: u64,
    pub override_rate: f64,
    /// Resolved rounds per administered arm, indexed by arm.
    pub arm_counts: Vec<u64>,
    pub trajectory: Vec<TrajectoryPoint>,
}

#[derive(Debug, Clone)]
pub struct OnlineEvaluator {
    arm_counts: Vec<u64>,
    rounds_resolved: u64,
    rounds_expired: u64,
    rounds_discarded: u64,
    overrides: u64,
    cumulative_reward: f64,
    cumulative_regret: f64,
    cumulative_pseudo_regret: f64,
    rounds_with_oracle: u64,
    trajectory: Vec<TrajectoryPoint>,
    trajectory_stride: u64,
}

impl OnlineEvaluator {
    pub fn new(n_arms: usize) -> Self {
        Self {
            arm_counts: vec![0; n_arms],
            rounds_resolved: 0,
            rounds_expired: 0,
            rounds_discarded: 0,
            overrides: 0,
            cumulative_reward: 0.0,
            cumulative_regret: 0.0,
            cumulative_pseudo_regret: 0.0,
            rounds_with_oracle: 0,
            trajectory: Vec::new(),
            trajectory_stride: 1,
        }
    }

    /// Keep one trajectory point every `stride` resolved rounds.
    pub fn with_trajectory_stride(mut self, stride: u64) -> Self {
        self.trajectory_stride = stride.max(1);
        self
    }

    /// Fold in one closed record. Pending records are ignored.
    pub fn observe(&mut self, record: &RoundRecord, oracle: Option<OracleValues>) {
        match record.status {
            RoundStatus::Pending => return,
            RoundStatus::Expired => {
                self.rounds_expired += 1;
                return;
            }
            RoundStatus::Discarded => {
                self.rounds_discarded += 1;
                return;
            }
            RoundStatus::Resolved => {}
        }
        let Some(reward) = record.reward else {
            self.rounds_discarded += 1;
            return;
        };

        self.rounds_resolved += 1;
        self.cumulative_reward += reward;
        if record.was_override {
            self.overrides += 1;
        }
        if let Some(count) = self.arm_counts.get_mut(record.administered.index()) {
            *count += 1;
        }
        if let Some(o) = oracle {
            self.rounds_with_oracle += 1;
            self.cumulative_regret += o.best - reward;
            self.cumulative_pseudo_regret += o.best - o.administered;
        }

        if self.rounds_resolved % self.trajectory_stride == 0 {
            self.trajectory.push(TrajectoryPoint {
                step: self.rounds_resolved,
                cumulative_reward: self.cumulative_reward,
                cumulative_regret: self.regret(),
            });
        }
    }

    fn regret(&self) -> Option<f64> {
        (self.rounds_with_oracle > 0).then_some(self.cumulative_regret)
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    pub fn cumulative_regret(&self) -> Option<f64> {
        self.regret()
    }

    pub fn cumulative_pseudo_regret(&self) -> Option<f64> {
        (self.rounds_with_oracle > 0).then_some(self.cumulative_pseudo_regret)
    }

    pub fn arm_count(&self, arm: ArmId) -> u64 {
        self.arm_counts.get(arm.index()).copied().unwrap_or(0)
    }

    pub fn trajectory(&self) -> &[TrajectoryPoint] {
        &self.trajectory
    }

    pub fn summary(&self) -> EvaluationSummary {
        let n = self.rounds_resolved;
        let ratio = |x: u64| if n == 0 { 0.0 } else { x as f64 / n as f64 };
        EvaluationSummary {
            rounds_resolved: n,
            rounds_expired: self.rounds_expired,
            rounds_discarded: self.rounds_discarded,
            cumulative_reward: self.cumulative_reward,
            mean_reward: if n == 0 {
                0.0
            } else {
                self.cumulative_reward / n as f64
            },
            cumulative_regret: self.regret(),
            cumulative_pseudo_regret: self.cumulative_pseudo_regret(),
            overrides: self.overrides,
            override_rate: ratio(self.overrides),
            arm_counts: self.arm_counts.clone(),
            trajectory: self.trajectory.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::gate::{GateDecision, OverrideReason};
    use crate::round::PendingRound;
    use chrono::Utc;
    use ct_common::RoundId;

    fn record(id: u64, arm: usize, reward: f64, overridden: bool) -> RoundRecord {
        let gate = if overridden {
            GateDecision::Overridden {
                arm: ArmId(arm),
                original: ArmId(0),
                reason: OverrideReason::LowConfidence {
                    confidence: 1.0,
                    threshold: 0.5,
                },
            }
        } else {
            GateDecision::Recommended { arm: ArmId(arm) }
        };
        let pending = PendingRound {
            round_id: RoundId(id),
            context: Context::new(vec![1.0], 1).unwrap(),
            drug: "platinum".to_string(),
            clinician_opt_in: false,
            eligible: vec![ArmId(0), ArmId(1)],
            gate,
            predicted_reward: 0.0,
            confidence: 0.0,
            issued_at: Utc::now(),
        };
        RoundRecord::resolved(pending, None, reward, Utc::now())
    }

    #[test]
    fn accumulates_reward_and_regret() {
        let mut eval = OnlineEvaluator::new(2);
        eval.observe(
            &record(0, 1, 0.5, false),
            Some(OracleValues {
                best: 0.8,
                administered: 0.6,
            }),
        );
        eval.observe(
            &record(1, 0, 0.2, true),
            Some(OracleValues {
                best: 0.8,
                administered: 0.3,
            }),
        );
        let s = eval.summary();
        assert_eq!(s.rounds_resolved, 2);
        assert!((s.cumulative_reward - 0.7).abs() < 1e-12);
        assert!((s.cumulative_regret.unwrap() - 0.9).abs() < 1e-12);
        assert!((s.cumulative_pseudo_regret.unwrap() - 0.7).abs() < 1e-12);
        assert_eq!(s.arm_counts, vec![1, 1]);
        assert_eq!(s.overrides, 1);
        assert_eq!(s.override_rate, 0.5);
        assert_eq!(s.trajectory.len(), 2);
        assert_eq!(s.trajectory[1].step, 2);
    }

    #[test]
    fn no_oracle_means_no_regret() {
        let mut eval = OnlineEvaluator::new(2);
        eval.observe(&record(0, 1, 0.5, false), None);
        let s = eval.summary();
        assert_eq!(s.cumulative_regret, None);
        assert_eq!(s.mean_reward, 0.5);
    }

    #[test]
    fn closed_without_update_is_counted_not_scored() {
        let mut eval = OnlineEvaluator::new(2);
        let mut expired = record(0, 1, 0.5, false);
        expired.status = RoundStatus::Expired;
        expired.reward = None;
        let mut discarded = record(1, 1, 0.5, false);
        discarded.status = RoundStatus::Discarded;
        eval.observe(&expired, None);
        eval.observe(&discarded, None);
        let s = eval.summary();
        assert_eq!(s.rounds_resolved, 0);
        assert_eq!(s.rounds_expired, 1);
        assert_eq!(s.rounds_discarded, 1);
        assert_eq!(s.cumulative_reward, 0.0);
        assert!(s.trajectory.is_empty());
    }

    #[test]
    fn trajectory_stride() {
        let mut eval = OnlineEvaluator::new(2).with_trajectory_stride(10);
        for i in 0..25 {
            eval.observe(&record(i, 0, 0.1, false), None);
        }
        assert_eq!(eval.trajectory().len(), 2);
        assert_eq!(eval.trajectory()[1].step, 20);
    }
}
