//! Convergence and regret on a stationary linear environment.

mod support;

use ct_common::ArmId;
use ct_core::simulate::{run_linear_simulation, LinearEnvironment, SimulationConfig};
use ct_core::PolicyEngine;
use ct_config::PolicyConfig;
use support::{dominant_arm_theta, four_bin_actions, thompson, ucb};

const BEST: ArmId = ArmId(1);
// Never gate: these tests measure the bandit, not the fallback.
const NO_GATE: f64 = 1e9;

fn run(policy: PolicyConfig, rounds: u64) -> ct_core::simulate::SimulationReport {
    let env = LinearEnvironment::new(dominant_arm_theta(), 0.05).unwrap();
    let mut engine = PolicyEngine::new(policy, &four_bin_actions()).unwrap();
    let cfg = SimulationConfig {
        rounds,
        seed: 11,
        clinician_opt_in: false,
        trajectory_stride: 100,
    };
    run_linear_simulation(&mut engine, &env, "platinum", &cfg).unwrap()
}

fn best_arm_share_of_tail(actions: &[ArmId]) -> f64 {
    let tail = &actions[actions.len() - actions.len() / 10..];
    tail.iter().filter(|&&a| a == BEST).count() as f64 / tail.len() as f64
}

#[test]
fn ucb_converges_to_best_arm() {
    let report = run(ucb(3, 0.5, NO_GATE), 3000);
    assert_eq!(report.decisions, 3000);
    assert_eq!(report.fallbacks, 0);
    let share = best_arm_share_of_tail(&report.actions);
    assert!(share >= 0.95, "best arm share in final 10%: {}", share);
}

#[test]
fn thompson_converges_to_best_arm() {
    let report = run(thompson(3, 0.01, NO_GATE), 3000);
    let share = best_arm_share_of_tail(&report.actions);
    assert!(share >= 0.95, "best arm share in final 10%: {}", share);
}

#[test]
fn regret_grows_sublinearly() {
    // Same seed, so the shorter run is a prefix of the longer one.
    let short = run(ucb(3, 0.5, NO_GATE), 1500)
        .summary
        .cumulative_pseudo_regret
        .unwrap();
    let long = run(ucb(3, 0.5, NO_GATE), 3000)
        .summary
        .cumulative_pseudo_regret
        .unwrap();
    assert!(short > 0.0);
    assert!(long >= short - 1e-9);
    assert!(
        long - short < short,
        "second-half regret {} should be below first-half regret {}",
        long - short,
        short
    );
}

#[test]
fn overrides_never_count_as_exploration() {
    // With a tight threshold the early rounds fall back to standard of care
    // (arm 2, 12:00-14:00); the bandit's choice is still recorded.
    let report = run(ucb(3, 0.5, 0.3), 400);
    assert!(report.summary.overrides > 0);
    assert_eq!(
        report.summary.arm_counts.iter().sum::<u64>(),
        report.summary.rounds_resolved
    );
}
