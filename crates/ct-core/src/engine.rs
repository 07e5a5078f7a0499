//! Policy engine: one patient stream end to end.
//!
//! Per round: dimension check → safety filter → bandit selection on a
//! snapshot of the arm statistics → uncertainty gate → pending round. When
//! the outcome arrives: reward assembly → atomic update of the administered
//! arm → closed round record.
//!
//! A `SingularUpdate` (or non-finite statistics) halts the engine. Every
//! later selection or observation fails with `PolicyHalted` until a
//! checkpoint is loaded.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ct_common::{ArmId, Error, Result, RoundId, StreamId};
use ct_config::{epoch_hash, validate_policy, ActionSpaceConfig, PolicyConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::actions::ActionSpace;
use crate::context::Context;
use crate::gate::{GateDecision, UncertaintyGate};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::policy::{build_policy, ArmScore, BanditPolicy};
use crate::reward::{Outcome, RewardAssembler};
use crate::round::{PendingRound, RoundLedger, RoundRecord, RoundStatus};
use crate::safety::{EligibleSet, SafetyGuard};
use crate::stats::{ArmStats, ArmStore};

// ── Decision ────────────────────────────────────────────────────────────

/// Result of `select_action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    pub round_id: RoundId,
    /// Arm to administer (after gating).
    pub arm: ArmId,
    pub start_hour: f64,
    pub width_hours: f64,
    /// Bin midpoint, the hour to administer at.
    pub administration_hour: f64,
    pub predicted_reward: f64,
    pub confidence: f64,
    pub was_override: bool,
    pub needs_review: bool,
    pub gate: GateDecision,
    pub eligible: EligibleSet,
    pub scores: Vec<ArmScore>,
}

// ── Checkpoint ──────────────────────────────────────────────────────────

/// Serializable checkpoint of an engine's learned state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyState {
    pub schema_version: String,
    /// Content hash of the policy and action-space configuration.
    pub epoch: String,
    pub strategy: String,
    pub dimension: usize,
    pub n_arms: usize,
    pub rounds_issued: u64,
    pub stream_salt: u64,
    pub arms: Vec<ArmStats>,
    pub saved_at: DateTime<Utc>,
}

impl PolicyState {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::StateCorrupted(format!("policy state: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn total_updates(&self) -> u64 {
        self.arms.iter().map(ArmStats::n_updates).sum()
    }
}

// ── Engine ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PolicyEngine {
    policy: PolicyConfig,
    actions: ActionSpace,
    guard: SafetyGuard,
    gate: UncertaintyGate,
    assembler: RewardAssembler,
    bandit: Box<dyn BanditPolicy>,
    store: Arc<ArmStore>,
    ledger: RoundLedger,
    rounds_issued: u64,
    epoch: String,
    stream_salt: u64,
    halted: Option<String>,
    log: LogContext,
}

impl PolicyEngine {
    /// Validate both configurations and build an engine with its own store.
    pub fn new(policy: PolicyConfig, actions: &ActionSpaceConfig) -> Result<Self> {
        validate_policy(&policy)?;
        let space = ActionSpace::from_config(actions)?;
        let store = Arc::new(ArmStore::new(&policy, space.len())?);
        Ok(Self::assemble(policy, actions, space, store, 0))
    }

    /// Build an engine over an existing (possibly shared) store.
    pub fn with_store(
        policy: PolicyConfig,
        actions: &ActionSpaceConfig,
        store: Arc<ArmStore>,
        stream_salt: u64,
    ) -> Result<Self> {
        validate_policy(&policy)?;
        let space = ActionSpace::from_config(actions)?;
        if store.len() != space.len() || store.dim() != policy.context_dimension {
            return Err(Error::StateMismatch(format!(
                "store is {} arms x d={}, policy needs {} arms x d={}",
                store.len(),
                store.dim(),
                space.len(),
                policy.context_dimension
            )));
        }
        Ok(Self::assemble(policy, actions, space, store, stream_salt))
    }

    fn assemble(
        policy: PolicyConfig,
        actions: &ActionSpaceConfig,
        space: ActionSpace,
        store: Arc<ArmStore>,
        stream_salt: u64,
    ) -> Self {
        let log = LogContext::for_current_run().with_stream_id(StreamId::new().0);
        let engine = Self {
            guard: SafetyGuard::from_policy(&policy),
            gate: UncertaintyGate::new(policy.confidence_threshold),
            assembler: RewardAssembler::from_policy(&policy),
            bandit: build_policy(&policy, stream_salt),
            epoch: epoch_hash(&policy, actions),
            actions: space,
            store,
            ledger: RoundLedger::new(),
            rounds_issued: 0,
            stream_salt,
            halted: None,
            log,
            policy,
        };
        log_event!(
            engine.log,
            INFO,
            event_names::ENGINE_CREATED,
            Stage::Init,
            "policy engine created",
            strategy = engine.bandit.name(),
            n_arms = engine.actions.len() as u64,
            dimension = engine.policy.context_dimension as u64,
            epoch = engine.epoch.as_str()
        );
        engine
    }

    /// Replace the logging correlation context.
    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    // ── Selection ───────────────────────────────────────────────────────

    pub fn select_action(
        &mut self,
        context: &Context,
        drug: &str,
        clinician_opt_in: bool,
    ) -> Result<Decision> {
        self.select_action_at(context, drug, clinician_opt_in, Utc::now())
    }

    /// Same as [`PolicyEngine::select_action`] with an explicit clock.
    pub fn select_action_at(
        &mut self,
        context: &Context,
        drug: &str,
        clinician_opt_in: bool,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        self.ensure_running()?;
        if context.dim() != self.policy.context_dimension {
            return Err(Error::DimensionMismatch {
                expected: self.policy.context_dimension,
                actual: context.dim(),
            });
        }

        let eligible = match self.guard.filter(&self.actions, drug, clinician_opt_in) {
            Ok(set) => set,
            Err(e) => {
                if matches!(e, Error::NoEligibleAction { .. }) {
                    log_event!(
                        self.log,
                        WARN,
                        event_names::FILTER_NO_ELIGIBLE,
                        Stage::Filter,
                        "no eligible administration time; standard of care applies",
                        drug = drug,
                        opt_in = clinician_opt_in
                    );
                }
                return Err(e);
            }
        };
        let standard_of_care = self.actions.standard_of_care_arm(drug)?;

        let round_id = RoundId(self.rounds_issued);
        let snapshot = self.store.snapshot()?;
        let selection = match self
            .bandit
            .select(&snapshot, &eligible.eligible, context, round_id)
        {
            Ok(s) => s,
            Err(e) => {
                if let Error::NumericalInstability(detail) = &e {
                    self.halt(detail.clone(), Stage::Select);
                }
                return Err(e);
            }
        };
        let gate = self.gate.decide(&selection, standard_of_care);
        let administered = gate.administered();
        if !eligible.contains(administered) {
            log_event!(
                self.log,
                WARN,
                event_names::FILTER_NO_ELIGIBLE,
                Stage::Gate,
                "standard-of-care bin is not eligible; override refused",
                drug = drug,
                opt_in = clinician_opt_in,
                arm = administered.index() as u64
            );
            return Err(Error::NoEligibleAction {
                drug: drug.to_string(),
                opt_in: clinician_opt_in,
            });
        }
        let arm = self
            .actions
            .arm(administered)
            .copied()
            .ok_or_else(|| Error::StateCorrupted(format!("arm {} not in action space", administered)))?;
        self.rounds_issued += 1;

        if let GateDecision::Overridden { original, reason, .. } = &gate {
            log_event!(
                self.log,
                INFO,
                event_names::ROUND_OVERRIDDEN,
                Stage::Gate,
                format!("fallback to standard of care: {}", reason),
                round_id = round_id.0,
                arm = administered.index() as u64,
                original = original.index() as u64,
                confidence = selection.confidence
            );
        }
        log_event!(
            self.log,
            DEBUG,
            event_names::ROUND_SELECTED,
            Stage::Select,
            "administration time selected",
            round_id = round_id.0,
            arm = administered.index() as u64,
            drug = drug,
            eligible = eligible.len() as u64,
            predicted_reward = selection.predicted_reward,
            confidence = selection.confidence
        );

        self.ledger.insert_pending(PendingRound {
            round_id,
            context: context.clone(),
            drug: drug.to_string(),
            clinician_opt_in,
            eligible: eligible.eligible.clone(),
            gate: gate.clone(),
            predicted_reward: selection.predicted_reward,
            confidence: selection.confidence,
            issued_at: now,
        });

        Ok(Decision {
            round_id,
            arm: administered,
            start_hour: arm.start_hour,
            width_hours: arm.width_hours,
            administration_hour: arm.midpoint_hour(),
            predicted_reward: selection.predicted_reward,
            confidence: selection.confidence,
            was_override: gate.was_override(),
            needs_review: gate.needs_review(),
            gate,
            eligible,
            scores: selection.scores,
        })
    }

    // ── Observation ─────────────────────────────────────────────────────

    /// Resolve a pending round from raw efficacy/toxicity.
    pub fn observe_outcome(
        &mut self,
        round_id: RoundId,
        efficacy: f64,
        toxicity: f64,
    ) -> Result<RoundRecord> {
        self.observe_outcome_at(round_id, efficacy, toxicity, Utc::now())
    }

    pub fn observe_outcome_at(
        &mut self,
        round_id: RoundId,
        efficacy: f64,
        toxicity: f64,
        now: DateTime<Utc>,
    ) -> Result<RoundRecord> {
        let outcome = Outcome { efficacy, toxicity };
        let assembler = self.assembler;
        self.resolve(round_id, now, || {
            assembler.assemble(&outcome).map(|r| (Some(outcome), r))
        })
    }

    /// Resolve a pending round from a pre-assembled reward.
    pub fn observe_reward(&mut self, round_id: RoundId, reward: f64) -> Result<RoundRecord> {
        self.observe_reward_at(round_id, reward, Utc::now())
    }

    pub fn observe_reward_at(
        &mut self,
        round_id: RoundId,
        reward: f64,
        now: DateTime<Utc>,
    ) -> Result<RoundRecord> {
        let assembler = self.assembler;
        self.resolve(round_id, now, || assembler.check_raw(reward).map(|r| (None, r)))
    }

    fn resolve<F>(&mut self, round_id: RoundId, now: DateTime<Utc>, reward: F) -> Result<RoundRecord>
    where
        F: FnOnce() -> Result<(Option<Outcome>, f64)>,
    {
        self.ensure_running()?;
        let pending = match self.ledger.take_pending(round_id) {
            Ok(p) => p,
            Err(e) => {
                log_event!(
                    self.log,
                    WARN,
                    event_names::OUTCOME_UNKNOWN_ROUND,
                    Stage::Observe,
                    "outcome for a round that is not pending; ignored",
                    round_id = round_id.0
                );
                return Err(e);
            }
        };
        let arm = pending.administered();

        let (outcome, r) = match reward() {
            Ok(v) => v,
            Err(e) => {
                log_event!(
                    self.log,
                    WARN,
                    event_names::OUTCOME_REJECTED,
                    Stage::Observe,
                    format!("outcome rejected: {}", e),
                    round_id = round_id.0,
                    arm = arm.index() as u64
                );
                self.ledger.push(RoundRecord::closed(
                    pending,
                    RoundStatus::Discarded,
                    e.to_string(),
                    now,
                ));
                return Err(e);
            }
        };

        if let Err(e) = self.store.update(
            arm,
            pending.context.as_slice(),
            r,
            self.policy.refactor_interval,
        ) {
            if matches!(
                e,
                Error::SingularUpdate { .. } | Error::NumericalInstability(_)
            ) {
                self.halt(e.to_string(), Stage::Update);
            }
            self.ledger.push(RoundRecord::closed(
                pending,
                RoundStatus::Discarded,
                e.to_string(),
                now,
            ));
            return Err(e);
        }

        log_event!(
            self.log,
            DEBUG,
            event_names::OUTCOME_APPLIED,
            Stage::Update,
            "reward applied",
            round_id = round_id.0,
            arm = arm.index() as u64,
            reward = r
        );
        Ok(self
            .ledger
            .push(RoundRecord::resolved(pending, outcome, r, now))
            .clone())
    }

    /// Close pending rounds older than the configured timeout. Their
    /// outcomes are never applied.
    pub fn expire_pending(&mut self, now: DateTime<Utc>) -> Vec<RoundRecord> {
        // Capped at ~30 years.
        let timeout_ms = (self.policy.pending_timeout_hours * 3_600_000.0).min(1e12);
        let timeout = Duration::milliseconds(timeout_ms as i64);
        let expired = self.ledger.expire(now, timeout);
        for record in &expired {
            log_event!(
                self.log,
                INFO,
                event_names::ROUND_EXPIRED,
                Stage::Observe,
                "pending round expired",
                round_id = record.round_id.0,
                arm = record.administered.index() as u64
            );
        }
        expired
    }

    // ── Checkpoint ──────────────────────────────────────────────────────

    pub fn get_policy_state(&self) -> Result<PolicyState> {
        let state = PolicyState {
            schema_version: ct_common::SCHEMA_VERSION.to_string(),
            epoch: self.epoch.clone(),
            strategy: self.bandit.name().to_string(),
            dimension: self.policy.context_dimension,
            n_arms: self.actions.len(),
            rounds_issued: self.rounds_issued,
            stream_salt: self.stream_salt,
            arms: self.store.snapshot()?,
            saved_at: Utc::now(),
        };
        log_event!(
            self.log,
            DEBUG,
            event_names::STATE_EXPORTED,
            Stage::Checkpoint,
            "policy state exported",
            rounds_issued = state.rounds_issued,
            updates = state.total_updates()
        );
        Ok(state)
    }

    /// Restore statistics and the round counter from a checkpoint.
    ///
    /// Pending rounds are discarded and a halt is cleared. In population
    /// scope this replaces, in one step, the statistics every sharing engine reads.
    pub fn load_policy_state(&mut self, state: PolicyState) -> Result<()> {
        if let Err(e) = self.check_state(&state) {
            log_event!(
                self.log,
                WARN,
                event_names::STATE_REJECTED,
                Stage::Checkpoint,
                format!("checkpoint rejected: {}", e)
            );
            return Err(e);
        }

        let rounds_issued = state.rounds_issued;
        self.store.replace_all(state.arms)?;
        self.rounds_issued = rounds_issued;
        if self.stream_salt != state.stream_salt {
            self.stream_salt = state.stream_salt;
            self.bandit = build_policy(&self.policy, self.stream_salt);
        }
        let discarded = self.ledger.discard_all("policy state reloaded", Utc::now());
        self.halted = None;

        log_event!(
            self.log,
            INFO,
            event_names::STATE_LOADED,
            Stage::Checkpoint,
            "policy state loaded",
            rounds_issued = rounds_issued,
            discarded_pending = discarded.len() as u64
        );
        Ok(())
    }

    fn check_state(&self, state: &PolicyState) -> Result<()> {
        if !ct_common::schema::is_compatible(&state.schema_version) {
            return Err(Error::StateMismatch(format!(
                "schema version {} is incompatible with {}",
                state.schema_version,
                ct_common::SCHEMA_VERSION
            )));
        }
        if state.epoch != self.epoch {
            return Err(Error::StateMismatch(format!(
                "epoch {} does not match configuration epoch {}",
                short(&state.epoch),
                short(&self.epoch)
            )));
        }
        if state.strategy != self.bandit.name() {
            return Err(Error::StateMismatch(format!(
                "strategy '{}' != '{}'",
                state.strategy,
                self.bandit.name()
            )));
        }
        if state.dimension != self.policy.context_dimension || state.n_arms != self.actions.len() {
            return Err(Error::StateMismatch(format!(
                "shape {} arms x d={} != {} arms x d={}",
                state.n_arms,
                state.dimension,
                self.actions.len(),
                self.policy.context_dimension
            )));
        }
        if state.arms.len() != state.n_arms {
            return Err(Error::StateCorrupted(format!(
                "header says {} arms, body has {}",
                state.n_arms,
                state.arms.len()
            )));
        }
        for (i, arm) in state.arms.iter().enumerate() {
            if arm.strategy() != state.strategy {
                return Err(Error::StateCorrupted(format!(
                    "arm {} holds {} statistics",
                    i,
                    arm.strategy()
                )));
            }
            arm.validate(state.dimension)
                .map_err(|detail| Error::StateCorrupted(format!("arm {}: {}", i, detail)))?;
        }
        Ok(())
    }

    // ── Halting ─────────────────────────────────────────────────────────

    fn ensure_running(&self) -> Result<()> {
        match &self.halted {
            Some(reason) => Err(Error::PolicyHalted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn halt(&mut self, reason: String, stage: Stage) {
        log_event!(
            self.log,
            ERROR,
            event_names::POLICY_HALTED,
            stage,
            format!("policy halted: {}", reason)
        );
        self.halted = Some(reason);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.actions
    }

    pub fn strategy(&self) -> &'static str {
        self.bandit.name()
    }

    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    pub fn stream_salt(&self) -> u64 {
        self.stream_salt
    }

    pub fn store(&self) -> &Arc<ArmStore> {
        &self.store
    }

    pub fn rounds_issued(&self) -> u64 {
        self.rounds_issued
    }

    pub fn reward_assembler(&self) -> RewardAssembler {
        self.assembler
    }

    pub fn log_context(&self) -> &LogContext {
        &self.log
    }

    /// Closed rounds, oldest first.
    pub fn records(&self) -> &[RoundRecord] {
        self.ledger.records()
    }

    /// Rounds awaiting an outcome, in id order.
    pub fn pending(&self) -> impl Iterator<Item = &PendingRound> {
        self.ledger.pending()
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.pending_count()
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
