//! Uncertainty gate.
//!
//! When the policy's confidence value exceeds the threshold, the round falls
//! back to the standard-of-care bin and is flagged for expert review. The
//! flag is set even when the bandit had already picked the standard-of-care
//! bin: it records that the model was not confident, not that the time moved.

use ct_common::ArmId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::policy::Selection;

/// Why a recommendation was replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideReason {
    LowConfidence { confidence: f64, threshold: f64 },
}

impl std::fmt::Display for OverrideReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideReason::LowConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "uncertainty {:.4} exceeds threshold {:.4}",
                confidence, threshold
            ),
        }
    }
}

/// Outcome of gating a selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Recommended {
        arm: ArmId,
    },
    Overridden {
        /// Standard-of-care bin actually administered.
        arm: ArmId,
        /// What the bandit chose.
        original: ArmId,
        reason: OverrideReason,
    },
}

impl GateDecision {
    /// The arm to administer; outcomes are attributed to it.
    pub fn administered(&self) -> ArmId {
        match self {
            GateDecision::Recommended { arm } | GateDecision::Overridden { arm, .. } => *arm,
        }
    }

    /// The bandit's own choice before gating.
    pub fn recommended(&self) -> ArmId {
        match self {
            GateDecision::Recommended { arm } => *arm,
            GateDecision::Overridden { original, .. } => *original,
        }
    }

    pub fn was_override(&self) -> bool {
        matches!(self, GateDecision::Overridden { .. })
    }

    pub fn needs_review(&self) -> bool {
        self.was_override()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UncertaintyGate {
    threshold: f64,
}

impl UncertaintyGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decide(&self, selection: &Selection, standard_of_care: ArmId) -> GateDecision {
        if selection.confidence > self.threshold {
            GateDecision::Overridden {
                arm: standard_of_care,
                original: selection.arm,
                reason: OverrideReason::LowConfidence {
                    confidence: selection.confidence,
                    threshold: self.threshold,
                },
            }
        } else {
            GateDecision::Recommended { arm: selection.arm }
        }
    }
}
