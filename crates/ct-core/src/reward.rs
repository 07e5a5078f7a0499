//! Composite reward: `r = efficacy − λ_tox · toxicity`, clipped to bounds.

use ct_common::{Error, Result};
use ct_config::{PolicyConfig, RewardBounds};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Observed clinical outcome, both components normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Outcome {
    pub efficacy: f64,
    pub toxicity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardAssembler {
    lambda_tox: f64,
    bounds: RewardBounds,
}

impl RewardAssembler {
    pub fn new(lambda_tox: f64, bounds: RewardBounds) -> Self {
        Self { lambda_tox, bounds }
    }

    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self::new(policy.lambda_tox, policy.reward_bounds)
    }

    pub fn bounds(&self) -> RewardBounds {
        self.bounds
    }

    /// Combine an outcome into a clipped reward.
    pub fn assemble(&self, outcome: &Outcome) -> Result<f64> {
        unit_interval("efficacy", outcome.efficacy)?;
        unit_interval("toxicity", outcome.toxicity)?;
        Ok(self.composite(outcome))
    }

    /// Unchecked composite for trusted, model-generated outcomes.
    pub(crate) fn composite(&self, outcome: &Outcome) -> f64 {
        self.bounds
            .clip(outcome.efficacy - self.lambda_tox * outcome.toxicity)
    }

    /// A pre-assembled reward must already lie within the bounds.
    pub fn check_raw(&self, reward: f64) -> Result<f64> {
        if !self.bounds.contains(reward) {
            return Err(Error::InvalidReward {
                field: "reward".to_string(),
                value: reward,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }
        Ok(reward)
    }
}

fn unit_interval(field: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
        return Err(Error::InvalidReward {
            field: field.to_string(),
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(lambda_tox: f64) -> RewardAssembler {
        RewardAssembler::new(lambda_tox, RewardBounds { min: -1.0, max: 1.0 })
    }

    #[test]
    fn composite_reward() {
        let r = assembler(0.5)
            .assemble(&Outcome {
                efficacy: 0.8,
                toxicity: 0.4,
            })
            .unwrap();
        assert!((r - 0.6).abs() < 1e-12);
    }

    #[test]
    fn composite_is_clipped() {
        let r = assembler(3.0)
            .assemble(&Outcome {
                efficacy: 0.0,
                toxicity: 1.0,
            })
            .unwrap();
        assert_eq!(r, -1.0);
    }

    #[test]
    fn out_of_range_components_rejected() {
        let a = assembler(1.0);
        for (e, t) in [(1.2, 0.0), (0.5, -0.1), (f64::NAN, 0.2), (0.5, f64::INFINITY)] {
            let err = a
                .assemble(&Outcome {
                    efficacy: e,
                    toxicity: t,
                })
                .unwrap_err();
            assert!(matches!(err, Error::InvalidReward { .. }));
        }
    }

    #[test]
    fn raw_reward_must_be_in_bounds() {
        let a = assembler(1.0);
        assert_eq!(a.check_raw(0.25).unwrap(), 0.25);
        assert_eq!(a.check_raw(-1.0).unwrap(), -1.0);
        let err = a.check_raw(1.5).unwrap_err();
        assert!(matches!(err, Error::InvalidReward { value, .. } if value == 1.5));
        assert!(a.check_raw(f64::NAN).is_err());
    }
}
