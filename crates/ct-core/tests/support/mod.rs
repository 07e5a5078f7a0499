//! Shared helpers for ct-core integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use ct_config::{
    ActionSpaceConfig, ClinicHours, DrugProfile, LearningScope, PolicyConfig, RewardBounds,
    StrategyConfig,
};

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn fixture_policy() -> PolicyConfig {
    PolicyConfig::from_file(&fixture("policy.json")).expect("policy fixture should load")
}

pub fn fixture_thompson_policy() -> PolicyConfig {
    PolicyConfig::from_file(&fixture("thompson_policy.json")).expect("thompson fixture should load")
}

pub fn fixture_actions() -> ActionSpaceConfig {
    ActionSpaceConfig::from_file(&fixture("actions.json")).expect("actions fixture should load")
}

/// Four 2-hour bins 08:00-16:00, one drug with standard of care at 12:00.
///
/// With a 4-hour cap every bin is eligible.
pub fn four_bin_actions() -> ActionSpaceConfig {
    ActionSpaceConfig {
        schema_version: ct_common::SCHEMA_VERSION.to_string(),
        first_bin_start_hour: 8.0,
        bin_width_hours: 2.0,
        n_bins: 4,
        clinic: ClinicHours {
            open_hour: 7.0,
            close_hour: 19.0,
        },
        drugs: vec![DrugProfile {
            name: "platinum".to_string(),
            standard_of_care_hour: 12.0,
            earliest_hour: None,
            latest_hour: None,
        }],
    }
}

pub fn policy(strategy: StrategyConfig, dim: usize, threshold: f64) -> PolicyConfig {
    PolicyConfig {
        schema_version: ct_common::SCHEMA_VERSION.to_string(),
        policy_id: Some("integration".to_string()),
        description: None,
        strategy,
        confidence_threshold: threshold,
        exploration_cap_hours: 4.0,
        opt_in_cap_hours: 8.0,
        lambda_tox: 1.0,
        reward_bounds: RewardBounds::default(),
        regularization: 1.0,
        seed: 42,
        context_dimension: dim,
        learning_scope: LearningScope::PerPatient,
        pending_timeout_hours: 720.0,
        refactor_interval: 256,
        notes: None,
    }
}

pub fn ucb(dim: usize, alpha: f64, threshold: f64) -> PolicyConfig {
    policy(StrategyConfig::Ucb { alpha }, dim, threshold)
}

pub fn thompson(dim: usize, noise_variance: f64, threshold: f64) -> PolicyConfig {
    policy(
        StrategyConfig::Thompson {
            prior_variance: 1.0,
            noise_variance,
        },
        dim,
        threshold,
    )
}

/// Arm 1 beats every other arm by at least 0.3 on `[1, u, v]`, `|u|, |v| <= 1`.
pub fn dominant_arm_theta() -> Vec<Vec<f64>> {
    vec![
        vec![0.2, 0.1, 0.1],
        vec![0.7, 0.1, -0.1],
        vec![0.3, 0.1, -0.1],
        vec![0.1, 0.0, 0.1],
    ]
}
