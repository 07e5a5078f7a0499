//! Criterion benchmarks for the per-round hot path.
//!
//! `select_action` (snapshot, filter, score, gate) and `observe_reward`
//! (rank-one factor update) at several context dimensions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ct_config::{
    ActionSpaceConfig, ClinicHours, DrugProfile, LearningScope, PolicyConfig, RewardBounds,
    StrategyConfig,
};
use ct_core::{Context, PolicyEngine};

fn actions() -> ActionSpaceConfig {
    ActionSpaceConfig {
        schema_version: ct_common::SCHEMA_VERSION.to_string(),
        first_bin_start_hour: 0.0,
        bin_width_hours: 1.0,
        n_bins: 24,
        clinic: ClinicHours {
            open_hour: 6.0,
            close_hour: 22.0,
        },
        drugs: vec![DrugProfile {
            name: "platinum".to_string(),
            standard_of_care_hour: 12.0,
            earliest_hour: None,
            latest_hour: None,
        }],
    }
}

fn policy(strategy: StrategyConfig, dim: usize) -> PolicyConfig {
    PolicyConfig {
        schema_version: ct_common::SCHEMA_VERSION.to_string(),
        policy_id: None,
        description: None,
        strategy,
        confidence_threshold: 1e9,
        exploration_cap_hours: 6.0,
        opt_in_cap_hours: 6.0,
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

fn context(dim: usize) -> Context {
    let x = (0..dim).map(|i| if i == 0 { 1.0 } else { 0.1 * i as f64 }).collect();
    Context::new(x, dim).expect("context should match dimension")
}

fn bench_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_update");
    let strategies = [
        ("ucb", StrategyConfig::Ucb { alpha: 1.0 }),
        (
            "thompson",
            StrategyConfig::Thompson {
                prior_variance: 1.0,
                noise_variance: 0.1,
            },
        ),
    ];

    for (name, strategy) in strategies {
        for dim in [8usize, 16, 32] {
            let ctx = context(dim);
            let mut engine =
                PolicyEngine::new(policy(strategy, dim), &actions()).expect("engine should build");
            group.bench_with_input(BenchmarkId::new(name, dim), &ctx, |b, ctx| {
                b.iter(|| {
                    let d = engine
                        .select_action(black_box(ctx), "platinum", false)
                        .expect("selection should succeed");
                    engine
                        .observe_reward(d.round_id, black_box(0.25))
                        .expect("update should succeed");
                    black_box(d.arm);
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_round);
criterion_main!(benches);
