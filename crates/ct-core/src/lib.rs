//! Chronotherapy Policy Core Library
//!
//! This library provides the online decision engine for administration-time
//! recommendations:
//! - Context encoding and the discrete time-bin action space
//! - Safety filtering of candidate bins
//! - Per-arm sufficient statistics with UCB and Thompson policies
//! - Uncertainty gating with standard-of-care fallback
//! - Reward assembly, round ledger, checkpointing, and online evaluation
//!
//! The binary entry point is in `main.rs`.

pub mod actions;
pub mod context;
pub mod engine;
pub mod evaluator;
pub mod exit_codes;
pub mod gate;
pub mod logging;
pub mod policy;
pub mod registry;
pub mod reward;
pub mod round;
pub mod safety;
pub mod schema;
pub mod simulate;
pub mod stats;

pub use actions::{ActionSpace, Arm};
pub use context::{Context, ContextEncoder, PatientProfile};
pub use engine::{Decision, PolicyEngine, PolicyState};
pub use evaluator::{EvaluationSummary, OnlineEvaluator, OracleValues};
pub use gate::{GateDecision, OverrideReason, UncertaintyGate};
pub use registry::PatientRegistry;
pub use reward::{Outcome, RewardAssembler};
pub use round::{RoundLedger, RoundRecord, RoundStatus};
pub use safety::{EligibleSet, ExclusionReason, SafetyGuard};
pub use stats::{ArmStats, ArmStore};

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
