//! Synthetic environments and the closed-loop simulation driver.
//!
//! [`CircadianEnvironment`] draws patients and outcomes from a circadian
//! efficacy/toxicity model; [`LinearEnvironment`] is a plain linear bandit
//! (`r = θ*_a·x + noise`) used for regret and convergence checks. Both are
//! driven from a seeded `StdRng`, so a run is reproducible end to end.

use ct_common::{ArmId, Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextEncoder, PatientProfile};
use crate::engine::PolicyEngine;
use crate::evaluator::{EvaluationSummary, OnlineEvaluator, OracleValues};
use crate::log_event;
use crate::logging::{event_names, Stage};
use crate::reward::Outcome;

/// Shortest distance between two clock hours.
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(24.0);
    d.min(24.0 - d)
}

fn normal(mean: f64, sd: f64) -> Result<Normal<f64>> {
    Normal::new(mean, sd)
        .map_err(|e| Error::Config(format!("normal(mean={}, sd={}): {}", mean, sd, e)))
}

// ── Circadian cohort ────────────────────────────────────────────────────

// Cumulative P(ECOG = 0), P(ECOG <= 1) for weights (0.4, 0.4, 0.2).
const ECOG_CDF: [f64; 2] = [0.4, 0.8];
const OPTIMAL_OFFSET_HOURS: f64 = 5.0;
const VULNERABLE_OFFSET_HOURS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct CircadianEnvironment {
    drugs: Vec<String>,
    noise_sd: f64,
}

impl CircadianEnvironment {
    pub fn new(drugs: Vec<String>) -> Result<Self> {
        if drugs.is_empty() {
            return Err(Error::Config("simulation needs at least one drug".into()));
        }
        Ok(Self {
            drugs,
            noise_sd: 0.1,
        })
    }

    /// Outcome noise standard deviation (default 0.1).
    pub fn with_noise_sd(mut self, sd: f64) -> Self {
        self.noise_sd = sd;
        self
    }

    pub fn drugs(&self) -> &[String] {
        &self.drugs
    }

    pub fn sample_patient<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PatientProfile> {
        let midpoint = normal(3.0, 1.5)?.sample(rng).rem_euclid(24.0);
        let duration = normal(7.5, 1.0)?.sample(rng).clamp(5.0, 10.0);
        let amplitude = normal(30.0, 8.0)?.sample(rng).max(0.0);
        let hrv = normal(45.0, 15.0)?.sample(rng).max(5.0);

        let u: f64 = rng.random();
        let ecog = if u < ECOG_CDF[0] {
            0
        } else if u < ECOG_CDF[1] {
            1
        } else {
            2
        };

        let drug = self.drugs[rng.random_range(0..self.drugs.len())].clone();
        Ok(PatientProfile {
            sleep_midpoint_hour: midpoint,
            sleep_duration_hours: duration,
            activity_amplitude: amplitude,
            hrv_rmssd_ms: hrv,
            ecog,
            drug,
        })
    }

    /// Noise-free outcome of administering at `hour`.
    pub fn expected_outcome(&self, profile: &PatientProfile, hour: f64) -> Outcome {
        let optimal = (profile.sleep_midpoint_hour + OPTIMAL_OFFSET_HOURS).rem_euclid(24.0);
        let vulnerable = (profile.sleep_midpoint_hour + VULNERABLE_OFFSET_HOURS).rem_euclid(24.0);
        let efficacy = 0.5 + 0.3 * (1.0 - circular_distance(hour, optimal) / 6.0).max(0.0);
        let toxicity = 0.3 + 0.4 * (1.0 - circular_distance(hour, vulnerable) / 4.0).max(0.0);
        Outcome {
            efficacy: efficacy.clamp(0.0, 1.0),
            toxicity: toxicity.clamp(0.0, 1.0),
        }
    }

    pub fn sample_outcome<R: Rng + ?Sized>(
        &self,
        profile: &PatientProfile,
        hour: f64,
        rng: &mut R,
    ) -> Result<Outcome> {
        let mean = self.expected_outcome(profile, hour);
        let noise = normal(0.0, self.noise_sd)?;
        Ok(Outcome {
            efficacy: (mean.efficacy + noise.sample(rng)).clamp(0.0, 1.0),
            toxicity: (mean.toxicity + noise.sample(rng)).clamp(0.0, 1.0),
        })
    }
}

// ── Linear bandit ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LinearEnvironment {
    theta: Vec<Vec<f64>>,
    noise_sd: f64,
}

impl LinearEnvironment {
    /// One true parameter vector per arm, all the same dimension.
    pub fn new(theta: Vec<Vec<f64>>, noise_sd: f64) -> Result<Self> {
        let dim = theta.first().map(Vec::len).unwrap_or(0);
        if dim == 0 || theta.iter().any(|t| t.len() != dim) {
            return Err(Error::Config(
                "linear environment needs equal-length, non-empty arm parameters".into(),
            ));
        }
        normal(0.0, noise_sd)?;
        Ok(Self { theta, noise_sd })
    }

    pub fn dim(&self) -> usize {
        self.theta[0].len()
    }

    pub fn n_arms(&self) -> usize {
        self.theta.len()
    }

    /// Context `[1, u_1, ..., u_{d-1}]` with `u_i ~ U(-1, 1)`.
    pub fn sample_context<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Context> {
        let mut x = Vec::with_capacity(self.dim());
        x.push(1.0);
        for _ in 1..self.dim() {
            x.push(rng.random_range(-1.0..1.0));
        }
        Context::new(x, self.dim())
    }

    pub fn expected_reward(&self, arm: ArmId, x: &[f64]) -> f64 {
        self.theta
            .get(arm.index())
            .map(|t| ct_math::dot(t, x))
            .unwrap_or(f64::NEG_INFINITY)
    }

    pub fn sample_reward<R: Rng + ?Sized>(&self, arm: ArmId, x: &[f64], rng: &mut R) -> Result<f64> {
        Ok(self.expected_reward(arm, x) + normal(0.0, self.noise_sd)?.sample(rng))
    }

    /// Best arm among `candidates` and its expected reward. Lowest index wins ties.
    pub fn best_arm(&self, x: &[f64], candidates: &[ArmId]) -> Option<(ArmId, f64)> {
        let mut best: Option<(ArmId, f64)> = None;
        for &arm in candidates {
            let v = self.expected_reward(arm, x);
            if best.is_none_or(|(_, b)| v > b) {
                best = Some((arm, v));
            }
        }
        best
    }
}

// ── Driver ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub rounds: u64,
    pub seed: u64,
    pub clinician_opt_in: bool,
    /// Keep one trajectory point every this many resolved rounds.
    pub trajectory_stride: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: 1000,
            seed: 42,
            clinician_opt_in: false,
            trajectory_stride: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub strategy: String,
    pub epoch: String,
    pub rounds_requested: u64,
    /// Rounds that produced a decision.
    pub decisions: u64,
    /// Rounds with no eligible bin; the patient got standard of care.
    pub fallbacks: u64,
    /// Arm chosen per decision, in order.
    pub actions: Vec<ArmId>,
    pub summary: EvaluationSummary,
}

/// Run `cfg.rounds` patients from the circadian cohort through `engine`.
///
/// Each patient is encoded, a bin is selected, and the outcome is sampled
/// at the bin midpoint and fed back before the next patient arrives.
pub fn run_simulation(
    engine: &mut PolicyEngine,
    encoder: &ContextEncoder,
    env: &CircadianEnvironment,
    cfg: &SimulationConfig,
) -> Result<SimulationReport> {
    if encoder.dimension() != engine.policy().context_dimension {
        return Err(Error::InvalidPolicy(format!(
            "context_dimension is {} but {} drugs encode to {} features",
            engine.policy().context_dimension,
            encoder.drugs().len(),
            encoder.dimension()
        )));
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut evaluator =
        OnlineEvaluator::new(engine.action_space().len()).with_trajectory_stride(cfg.trajectory_stride);
    let assembler = engine.reward_assembler();
    let mut fallbacks = 0u64;
    let mut actions = Vec::new();

    for _ in 0..cfg.rounds {
        let profile = env.sample_patient(&mut rng)?;
        let context = encoder.encode(&profile)?;
        let decision = match engine.select_action(&context, &profile.drug, cfg.clinician_opt_in) {
            Ok(d) => d,
            Err(Error::NoEligibleAction { .. }) => {
                fallbacks += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let candidates = &decision.eligible.eligible;
        let expected = |arm: ArmId| -> f64 {
            engine
                .action_space()
                .arm(arm)
                .map(|a| assembler.composite(&env.expected_outcome(&profile, a.midpoint_hour())))
                .unwrap_or(f64::NEG_INFINITY)
        };
        let best = candidates
            .iter()
            .copied()
            .map(expected)
            .fold(f64::NEG_INFINITY, f64::max);
        let oracle = OracleValues {
            best,
            administered: expected(decision.arm),
        };

        let outcome = env.sample_outcome(&profile, decision.administration_hour, &mut rng)?;
        let record = engine.observe_outcome(decision.round_id, outcome.efficacy, outcome.toxicity)?;
        evaluator.observe(&record, Some(oracle));
        actions.push(decision.arm);
    }

    Ok(finish(engine, evaluator, cfg, fallbacks, actions))
}

/// Run `cfg.rounds` linear-bandit rounds for `drug` through `engine`.
///
/// Sampled rewards are clipped to the policy's reward bounds.
pub fn run_linear_simulation(
    engine: &mut PolicyEngine,
    env: &LinearEnvironment,
    drug: &str,
    cfg: &SimulationConfig,
) -> Result<SimulationReport> {
    if env.dim() != engine.policy().context_dimension || env.n_arms() != engine.action_space().len() {
        return Err(Error::Config(format!(
            "environment is {} arms x d={}, engine is {} arms x d={}",
            env.n_arms(),
            env.dim(),
            engine.action_space().len(),
            engine.policy().context_dimension
        )));
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut evaluator =
        OnlineEvaluator::new(env.n_arms()).with_trajectory_stride(cfg.trajectory_stride);
    let bounds = engine.reward_assembler().bounds();
    let mut fallbacks = 0u64;
    let mut actions = Vec::new();

    for _ in 0..cfg.rounds {
        let context = env.sample_context(&mut rng)?;
        let x = context.as_slice();
        let decision = match engine.select_action(&context, drug, cfg.clinician_opt_in) {
            Ok(d) => d,
            Err(Error::NoEligibleAction { .. }) => {
                fallbacks += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let candidates = &decision.eligible.eligible;
        let best = env
            .best_arm(x, candidates)
            .map(|(_, v)| v)
            .unwrap_or(f64::NEG_INFINITY);
        let oracle = OracleValues {
            best,
            administered: env.expected_reward(decision.arm, x),
        };

        let reward = bounds.clip(env.sample_reward(decision.arm, x, &mut rng)?);
        let record = engine.observe_reward(decision.round_id, reward)?;
        evaluator.observe(&record, Some(oracle));
        actions.push(decision.arm);
    }

    Ok(finish(engine, evaluator, cfg, fallbacks, actions))
}

fn finish(
    engine: &PolicyEngine,
    evaluator: OnlineEvaluator,
    cfg: &SimulationConfig,
    fallbacks: u64,
    actions: Vec<ArmId>,
) -> SimulationReport {
    let summary = evaluator.summary();
    log_event!(
        engine.log_context(),
        INFO,
        event_names::EVAL_SUMMARY,
        Stage::Evaluate,
        "simulation finished",
        rounds = cfg.rounds,
        resolved = summary.rounds_resolved,
        fallbacks = fallbacks,
        mean_reward = summary.mean_reward,
        regret = summary.cumulative_regret.unwrap_or(0.0)
    );
    SimulationReport {
        strategy: engine.strategy().to_string(),
        epoch: engine.epoch().to_string(),
        rounds_requested: cfg.rounds,
        decisions: actions.len() as u64,
        fallbacks,
        actions,
        summary,
    }
}
