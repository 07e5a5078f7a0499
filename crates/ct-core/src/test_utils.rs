//! Test utilities for ct-core.
//!
//! This module provides shared fixtures:
//! - Policy and action-space builders matching the config crate's fixtures
//! - Encoded contexts for the reference patient
//! - Common assertions

use ct_config::{
    ActionSpaceConfig, ClinicHours, DrugProfile, LearningScope, PolicyConfig, RewardBounds,
    StrategyConfig,
};

use crate::context::{Context, ContextEncoder, PatientProfile};

/// Assert that two floating point numbers are approximately equal.
#[macro_export]
macro_rules! assert_approx_eq {
    ($a:expr, $b:expr) => {
        $crate::assert_approx_eq!($a, $b, 1e-9_f64)
    };
    ($a:expr, $b:expr, $epsilon:expr) => {{
        let a: f64 = $a;
        let b: f64 = $b;
        let eps: f64 = $epsilon;
        let diff = (a - b).abs();
        if diff > eps {
            panic!(
                "assertion failed: `(left ~= right)` (left: `{}`, right: `{}`, diff: `{}`, epsilon: `{}`)",
                a, b, diff, eps
            );
        }
    }};
}

// ============================================================================
// Configuration fixtures
// ============================================================================

/// Twelve 2-hour bins from midnight, clinic 07:00-19:00, three drugs.
pub fn action_space_config() -> ActionSpaceConfig {
    ActionSpaceConfig {
        schema_version: ct_common::SCHEMA_VERSION.to_string(),
        first_bin_start_hour: 0.0,
        bin_width_hours: 2.0,
        n_bins: 12,
        clinic: ClinicHours {
            open_hour: 7.0,
            close_hour: 19.0,
        },
        drugs: vec![
            DrugProfile {
                name: "platinum".to_string(),
                standard_of_care_hour: 8.0,
                earliest_hour: None,
                latest_hour: None,
            },
            DrugProfile {
                name: "taxane".to_string(),
                standard_of_care_hour: 10.0,
                earliest_hour: Some(8.0),
                latest_hour: Some(16.0),
            },
            DrugProfile {
                name: "anthracycline".to_string(),
                standard_of_care_hour: 12.0,
                earliest_hour: None,
                latest_hour: None,
            },
        ],
    }
}

fn base_policy(strategy: StrategyConfig, dim: usize) -> PolicyConfig {
    PolicyConfig {
        schema_version: ct_common::SCHEMA_VERSION.to_string(),
        policy_id: Some("test".to_string()),
        description: None,
        strategy,
        confidence_threshold: 0.6,
        exploration_cap_hours: 4.0,
        opt_in_cap_hours: 8.0,
        lambda_tox: 1.0,
        reward_bounds: RewardBounds::default(),
        regularization: 1.0,
        seed: 42,
        context_dimension: dim,
        learning_scope: LearningScope::Population,
        pending_timeout_hours: 720.0,
        refactor_interval: 256,
        notes: None,
    }
}

/// The UCB policy the config fixtures describe (d = 10).
pub fn fixture_policy() -> PolicyConfig {
    base_policy(StrategyConfig::Ucb { alpha: 1.0 }, 10)
}

pub fn ucb_policy(dim: usize, alpha: f64) -> PolicyConfig {
    base_policy(StrategyConfig::Ucb { alpha }, dim)
}

pub fn thompson_policy(dim: usize, prior_variance: f64, noise_variance: f64) -> PolicyConfig {
    base_policy(
        StrategyConfig::Thompson {
            prior_variance,
            noise_variance,
        },
        dim,
    )
}

// ============================================================================
// Contexts
// ============================================================================

/// Reference patient: midpoint 03:00, 7.5h sleep, ECOG 1.
pub fn reference_profile(drug: &str) -> PatientProfile {
    PatientProfile {
        sleep_midpoint_hour: 3.0,
        sleep_duration_hours: 7.5,
        activity_amplitude: 30.0,
        hrv_rmssd_ms: 45.0,
        ecog: 1,
        drug: drug.to_string(),
    }
}

/// Encoded reference patient for the fixture action space.
pub fn context_for(drug: &str) -> Context {
    let encoder = ContextEncoder::new(action_space_config().drug_names());
    match encoder.encode(&reference_profile(drug)) {
        Ok(ctx) => ctx,
        Err(e) => panic!("fixture context for {}: {}", drug, e),
    }
}
