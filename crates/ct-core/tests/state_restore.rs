//! Checkpoint, determinism, and reward-rejection scenarios.

mod support;

use ct_common::{ArmId, Error, RoundId};
use ct_core::simulate::LinearEnvironment;
use ct_core::{ArmStats, Context, PolicyEngine, PolicyState};
use ct_math::Cholesky;
use ct_config::PolicyConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use support::{dominant_arm_theta, four_bin_actions, thompson, ucb};
use tempfile::tempdir;

/// Drive `rounds` select/observe cycles with a seeded linear environment.
fn drive(engine: &mut PolicyEngine, rounds: usize, seed: u64) -> Vec<ArmId> {
    let env = LinearEnvironment::new(dominant_arm_theta(), 0.05).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut arms = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let ctx = env.sample_context(&mut rng).unwrap();
        let d = engine.select_action(&ctx, "platinum", false).unwrap();
        let r = env
            .sample_reward(d.arm, ctx.as_slice(), &mut rng)
            .unwrap()
            .clamp(-1.0, 1.0);
        engine.observe_reward(d.round_id, r).unwrap();
        arms.push(d.arm);
    }
    arms
}

fn engine(policy: PolicyConfig) -> PolicyEngine {
    PolicyEngine::new(policy, &four_bin_actions()).unwrap()
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn fixed_seed_reproduces_actions_and_statistics_ucb() {
    let mut a = engine(ucb(3, 0.5, 1e9));
    let mut b = engine(ucb(3, 0.5, 1e9));
    assert_eq!(drive(&mut a, 300, 5), drive(&mut b, 300, 5));
    assert_eq!(a.store().snapshot().unwrap(), b.store().snapshot().unwrap());
}

#[test]
fn fixed_seed_reproduces_actions_and_statistics_thompson() {
    let mut a = engine(thompson(3, 0.05, 1e9));
    let mut b = engine(thompson(3, 0.05, 1e9));
    assert_eq!(drive(&mut a, 300, 5), drive(&mut b, 300, 5));
    assert_eq!(a.store().snapshot().unwrap(), b.store().snapshot().unwrap());
}

#[test]
fn thompson_seed_changes_exploration() {
    let mut p = thompson(3, 0.05, 1e9);
    let mut a = engine(p.clone());
    p.seed = 43;
    let mut b = engine(p);
    assert_ne!(drive(&mut a, 50, 5), drive(&mut b, 50, 5));
}

// ============================================================================
// Restore idempotence
// ============================================================================

fn assert_restore_idempotent(policy: PolicyConfig) {
    let mut original = engine(policy.clone());
    drive(&mut original, 200, 3);
    let state = original.get_policy_state().unwrap();

    let mut restored = engine(policy);
    restored.load_policy_state(state.clone()).unwrap();
    assert_eq!(restored.rounds_issued(), original.rounds_issued());
    assert_eq!(restored.get_policy_state().unwrap().arms, state.arms);

    assert_eq!(drive(&mut original, 100, 9), drive(&mut restored, 100, 9));
}

#[test]
fn restore_is_idempotent_ucb() {
    assert_restore_idempotent(ucb(3, 0.5, 1e9));
}

#[test]
fn restore_is_idempotent_thompson() {
    assert_restore_idempotent(thompson(3, 0.05, 1e9));
}

#[test]
fn checkpoint_survives_the_filesystem() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut e = engine(ucb(3, 0.5, 1e9));
    drive(&mut e, 50, 1);
    let state = e.get_policy_state().unwrap();
    state.write_file(&path).unwrap();

    let loaded = PolicyState::from_file(&path).unwrap();
    assert_eq!(loaded.arms, state.arms);
    assert_eq!(loaded.total_updates(), 50);

    let mut fresh = engine(ucb(3, 0.5, 1e9));
    fresh.load_policy_state(loaded).unwrap();
    assert_eq!(fresh.rounds_issued(), 50);
}

#[test]
fn truncated_checkpoint_is_corrupted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{\"schema_version\": \"1.0.0\", \"epoch\": ").unwrap();
    assert!(matches!(
        PolicyState::from_file(&path),
        Err(Error::StateCorrupted(_))
    ));
}

#[test]
fn checkpoint_from_other_strategy_is_rejected() {
    let mut u = engine(ucb(3, 0.5, 1e9));
    drive(&mut u, 10, 1);
    let state = u.get_policy_state().unwrap();
    let mut t = engine(thompson(3, 0.05, 1e9));
    assert!(matches!(
        t.load_policy_state(state),
        Err(Error::StateMismatch(_))
    ));
}

#[test]
fn checkpoint_with_tampered_factor_is_corrupted() {
    let mut e = engine(ucb(3, 1.0, 1e9));
    let mut state = e.get_policy_state().unwrap();
    let ArmStats::Ridge(ref mut arm0) = state.arms[0] else {
        panic!("expected ridge stats");
    };
    // A stays I; a factor of 1e6·I would shrink arm 0's bonus.
    arm0.factor = Cholesky::scaled_identity(3, 1e6).unwrap();

    let err = e.load_policy_state(state).unwrap_err();
    assert!(
        matches!(err, Error::StateCorrupted(ref m) if m.contains("arm 0")),
        "unexpected error: {}",
        err
    );

    // The engine keeps its own statistics, so the tie still goes to arm 0.
    let ctx = Context::new(vec![1.0, 0.5, -0.5], 3).unwrap();
    let d = e.select_action(&ctx, "platinum", false).unwrap();
    assert_eq!(d.arm, ArmId(0));
}

#[test]
fn drifted_checkpoint_still_restores() {
    // Over a full refactor interval the rank-one factor stays within tolerance.
    let mut original = engine(thompson(3, 0.05, 1e9));
    drive(&mut original, 400, 4);
    let state = original.get_policy_state().unwrap();
    let mut restored = engine(thompson(3, 0.05, 1e9));
    restored.load_policy_state(state).unwrap();
    assert_eq!(drive(&mut original, 50, 6), drive(&mut restored, 50, 6));
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn first_selection_with_zero_statistics_picks_lowest_index() {
    // d=5, 4 arms, λ=1, α=1, seed 42.
    let mut e = engine(ucb(5, 1.0, 1e9));
    let x = vec![1.0, 0.5, -0.5, 0.25, 0.0];
    let ctx = Context::new(x.clone(), 5).unwrap();
    let d = e.select_action(&ctx, "platinum", false).unwrap();

    // A = I and b = 0, so every score is α·‖x‖.
    let expected = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert_eq!(d.arm, ArmId(0));
    assert_eq!(d.round_id, RoundId(0));
    assert_eq!(d.scores.len(), 4);
    for s in &d.scores {
        assert!((s.score - expected).abs() < 1e-12);
        assert!(s.estimate.abs() < 1e-12);
    }
    assert!(d.predicted_reward.abs() < 1e-12);
    assert!((d.confidence - expected).abs() < 1e-12);

    let mut again = engine(ucb(5, 1.0, 1e9));
    assert_eq!(again.select_action(&ctx, "platinum", false).unwrap(), d);
}

#[test]
fn out_of_bounds_reward_leaves_statistics_bit_identical() {
    let mut e = engine(ucb(3, 0.5, 1e9));
    drive(&mut e, 20, 2);
    let before = serde_json::to_string(&e.store().snapshot().unwrap()).unwrap();

    let ctx = Context::new(vec![1.0, 0.2, -0.3], 3).unwrap();
    let d = e.select_action(&ctx, "platinum", false).unwrap();
    let err = e.observe_reward(d.round_id, 1.5).unwrap_err();
    assert!(matches!(err, Error::InvalidReward { value, .. } if value == 1.5));

    let after = serde_json::to_string(&e.store().snapshot().unwrap()).unwrap();
    assert_eq!(before, after);
    assert_eq!(e.pending_count(), 0);
}

#[test]
fn out_of_range_outcome_is_rejected() {
    let mut e = engine(ucb(3, 0.5, 1e9));
    let ctx = Context::new(vec![1.0, 0.0, 0.0], 3).unwrap();
    let d = e.select_action(&ctx, "platinum", false).unwrap();
    assert!(matches!(
        e.observe_outcome(d.round_id, 1.2, 0.1),
        Err(Error::InvalidReward { .. })
    ));
}
