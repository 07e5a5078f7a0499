//! Chronotherapy configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for policy.json and actions.json
//! - Config resolution (CLI → env → XDG → /etc)
//! - Semantic validation
//! - Config snapshots and policy epoch hashes

pub mod actions;
pub mod policy;
pub mod resolve;
pub mod snapshot;
pub mod validate;

use std::path::Path;

pub use actions::{ActionSpaceConfig, ClinicHours, DrugProfile};
pub use policy::{LearningScope, PolicyConfig, RewardBounds, StrategyConfig};
pub use resolve::{resolve_config, ConfigPaths, ConfigSource};
pub use snapshot::{epoch_hash, ConfigSnapshot};
pub use validate::{validate_action_space, validate_policy, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = ct_common::SCHEMA_VERSION;

/// Both configuration documents, validated, with their provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub policy: PolicyConfig,
    pub actions: ActionSpaceConfig,
    pub paths: ConfigPaths,
    pub snapshot: ConfigSnapshot,
}

/// Resolve, parse, and validate policy.json and actions.json.
///
/// There are no built-in defaults: a file that cannot be found is an error.
pub fn load_config(
    cli_policy: Option<&Path>,
    cli_actions: Option<&Path>,
) -> ValidationResult<LoadedConfig> {
    let paths = resolve_config(cli_policy, cli_actions);

    let policy_path = paths
        .policy
        .as_deref()
        .ok_or_else(|| ValidationError::NotFound("policy.json".to_string()))?;
    let actions_path = paths
        .actions
        .as_deref()
        .ok_or_else(|| ValidationError::NotFound("actions.json".to_string()))?;

    let policy_json = validate::read_file(policy_path)?;
    let actions_json = validate::read_file(actions_path)?;

    let policy = PolicyConfig::parse_json(&policy_json)?;
    let actions = ActionSpaceConfig::parse_json(&actions_json)?;
    validate_policy(&policy)?;
    validate_action_space(&actions)?;

    let snapshot = ConfigSnapshot::new(&policy, &actions, &paths, &policy_json, &actions_json);
    Ok(LoadedConfig {
        policy,
        actions,
        paths,
        snapshot,
    })
}
