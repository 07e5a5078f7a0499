//! Configuration snapshots and policy epochs.
//!
//! A snapshot records exactly which configuration a policy instance was built
//! from. The epoch hash is derived from the parsed documents, so whitespace or
//! key-order edits do not start a new epoch but any value change does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::actions::ActionSpaceConfig;
use crate::policy::PolicyConfig;
use crate::resolve::ConfigPaths;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// SHA-256 hash of the policy file bytes.
    pub policy_hash: String,

    #[serde(default)]
    pub policy_path: Option<String>,

    pub policy_source: String,

    /// SHA-256 hash of the action space file bytes.
    pub actions_hash: String,

    #[serde(default)]
    pub actions_path: Option<String>,

    pub actions_source: String,

    /// Policy epoch; see [`epoch_hash`].
    pub epoch: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub strategy: String,
    pub confidence_threshold: f64,
    pub exploration_cap_hours: f64,
    pub opt_in_cap_hours: f64,
    pub lambda_tox: f64,
    pub context_dimension: usize,
    pub learning_scope: String,
    pub n_bins: usize,
    pub bin_width_hours: f64,
    pub drugs: Vec<String>,
}

impl ConfigSnapshot {
    /// Create a new snapshot from loaded configuration.
    pub fn new(
        policy: &PolicyConfig,
        actions: &ActionSpaceConfig,
        paths: &ConfigPaths,
        policy_json: &str,
        actions_json: &str,
    ) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            policy_hash: hash_content(policy_json),
            policy_path: paths.policy.as_ref().map(|p| p.display().to_string()),
            policy_source: paths.policy_source.to_string(),
            actions_hash: hash_content(actions_json),
            actions_path: paths.actions.as_ref().map(|p| p.display().to_string()),
            actions_source: paths.actions_source.to_string(),
            epoch: epoch_hash(policy, actions),
            summary: ConfigSummary::from_configs(policy, actions),
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check if this snapshot belongs to the same epoch as another.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.epoch == other.epoch
    }

    /// Get a short identifier for this snapshot (first 12 chars of the epoch).
    pub fn short_id(&self) -> &str {
        &self.epoch[..12.min(self.epoch.len())]
    }
}

impl ConfigSummary {
    pub fn from_configs(policy: &PolicyConfig, actions: &ActionSpaceConfig) -> Self {
        ConfigSummary {
            strategy: policy.strategy.name().to_string(),
            confidence_threshold: policy.confidence_threshold,
            exploration_cap_hours: policy.exploration_cap_hours,
            opt_in_cap_hours: policy.opt_in_cap_hours,
            lambda_tox: policy.lambda_tox,
            context_dimension: policy.context_dimension,
            learning_scope: policy.learning_scope.to_string(),
            n_bins: actions.n_bins,
            bin_width_hours: actions.bin_width_hours,
            drugs: actions.drug_names(),
        }
    }
}

/// Policy epoch: SHA-256 over the canonical policy and action-space JSON.
///
/// Checkpoints carry this value and are only accepted by a policy instance
/// with the same epoch.
pub fn epoch_hash(policy: &PolicyConfig, actions: &ActionSpaceConfig) -> String {
    let combined = format!("{}\n{}", policy.canonical_json(), actions.canonical_json());
    hash_content(&combined)
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"{
        "schema_version": "1.0.0",
        "strategy": { "kind": "ucb", "alpha": 1.0 },
        "confidence_threshold": 0.8,
        "exploration_cap_hours": 4.0,
        "opt_in_cap_hours": 8.0,
        "lambda_tox": 1.0,
        "regularization": 1.0,
        "seed": 42,
        "context_dimension": 8,
        "pending_timeout_hours": 72.0
    }"#;

    const ACTIONS: &str = r#"{
        "schema_version": "1.0.0",
        "first_bin_start_hour": 0.0,
        "bin_width_hours": 2.0,
        "n_bins": 12,
        "clinic": { "open_hour": 7.0, "close_hour": 19.0 },
        "drugs": [ { "name": "platinum", "standard_of_care_hour": 8.0 } ]
    }"#;

    fn load() -> (PolicyConfig, ActionSpaceConfig) {
        (
            PolicyConfig::parse_json(POLICY).unwrap(),
            ActionSpaceConfig::parse_json(ACTIONS).unwrap(),
        )
    }

    #[test]
    fn epoch_ignores_formatting() {
        let (p, a) = load();
        let compact: String = POLICY.split_whitespace().collect();
        let p2 = PolicyConfig::parse_json(&compact).unwrap();
        assert_eq!(epoch_hash(&p, &a), epoch_hash(&p2, &a));
    }

    #[test]
    fn epoch_changes_with_values() {
        let (p, a) = load();
        let mut p2 = p.clone();
        p2.confidence_threshold = 0.9;
        assert_ne!(epoch_hash(&p, &a), epoch_hash(&p2, &a));

        let mut a2 = a.clone();
        a2.clinic.close_hour = 18.0;
        assert_ne!(epoch_hash(&p, &a), epoch_hash(&p, &a2));
    }

    #[test]
    fn snapshot_summary_and_short_id() {
        let (p, a) = load();
        let snap = ConfigSnapshot::new(&p, &a, &ConfigPaths::default(), POLICY, ACTIONS);
        assert_eq!(snap.epoch.len(), 64);
        assert_eq!(snap.short_id().len(), 12);
        assert_eq!(snap.summary.strategy, "ucb");
        assert_eq!(snap.summary.drugs, vec!["platinum".to_string()]);
        assert_eq!(snap.policy_source, "missing");
        assert!(snap.matches(&snap.clone()));
    }
}
