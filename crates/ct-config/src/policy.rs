//! Policy configuration types.
//!
//! Every parameter that shapes a decision is required. There is no
//! `Default` for [`PolicyConfig`]: the exploration cap and confidence
//! threshold are clinical choices and are never inferred.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationResult};

/// Complete policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyConfig {
    pub schema_version: String,

    #[serde(default)]
    pub policy_id: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Which estimator to run and its parameters.
    pub strategy: StrategyConfig,

    /// Confidence value above which the gate falls back to standard-of-care.
    pub confidence_threshold: f64,

    /// Half-width (hours) of the exploration window around standard-of-care.
    pub exploration_cap_hours: f64,

    /// Half-width (hours) used when a clinician opts the patient in.
    pub opt_in_cap_hours: f64,

    /// Weight of toxicity in the composite reward.
    pub lambda_tox: f64,

    #[serde(default)]
    pub reward_bounds: RewardBounds,

    /// Ridge regularization λ (UCB accumulator starts at λ·I).
    pub regularization: f64,

    pub seed: u64,

    pub context_dimension: usize,

    #[serde(default)]
    pub learning_scope: LearningScope,

    /// Pending rounds older than this are expired without an update.
    pub pending_timeout_hours: f64,

    /// Rank-one factor updates between full refactorizations.
    #[serde(default = "default_refactor_interval")]
    pub refactor_interval: u64,

    #[serde(default)]
    pub notes: Option<String>,
}

fn default_refactor_interval() -> u64 {
    256
}

/// Estimator selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Linear UCB with exploration coefficient α.
    Ucb { alpha: f64 },

    /// Bayesian linear regression with Thompson sampling.
    Thompson {
        prior_variance: f64,
        noise_variance: f64,
    },
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::Ucb { .. } => "ucb",
            StrategyConfig::Thompson { .. } => "thompson",
        }
    }
}

/// Closed interval composite rewards are clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RewardBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for RewardBounds {
    fn default() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
        }
    }
}

impl RewardBounds {
    pub fn contains(&self, r: f64) -> bool {
        r.is_finite() && r >= self.min && r <= self.max
    }

    pub fn clip(&self, r: f64) -> f64 {
        r.clamp(self.min, self.max)
    }
}

/// Who shares arm statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LearningScope {
    /// One store per patient; nothing learned from one patient affects another.
    PerPatient,

    /// A single store shared by every patient.
    #[default]
    Population,
}

impl std::fmt::Display for LearningScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearningScope::PerPatient => write!(f, "per_patient"),
            LearningScope::Population => write!(f, "population"),
        }
    }
}

impl PolicyConfig {
    /// Load a policy from a JSON file.
    pub fn from_file(path: &std::path::Path) -> ValidationResult<Self> {
        let content = crate::validate::read_file(path)?;
        Self::parse_json(&content)
    }

    /// Parse a policy from a JSON string.
    pub fn parse_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("policy.json: {}", e)))
    }

    /// Canonical JSON used for hashing.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Effective exploration cap for a round.
    ///
    /// Opt-in can only widen the window.
    pub fn effective_cap_hours(&self, clinician_opt_in: bool) -> f64 {
        if clinician_opt_in {
            self.exploration_cap_hours.max(self.opt_in_cap_hours)
        } else {
            self.exploration_cap_hours
        }
    }
}
