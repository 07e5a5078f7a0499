//! Round ledger: pending rounds awaiting outcomes plus the append-only
//! record of closed rounds.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use ct_common::{ArmId, Error, Result, RoundId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::gate::GateDecision;
use crate::reward::Outcome;

/// Resolution status of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Awaiting an outcome.
    Pending,
    /// Outcome applied to the administered arm.
    Resolved,
    /// Timed out; never applied.
    Expired,
    /// Closed without an update (invalid outcome, halt, or state reload).
    Discarded,
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoundStatus::Pending => "pending",
            RoundStatus::Resolved => "resolved",
            RoundStatus::Expired => "expired",
            RoundStatus::Discarded => "discarded",
        };
        write!(f, "{}", s)
    }
}

/// A round issued by `select_action` whose outcome has not arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PendingRound {
    pub round_id: RoundId,
    pub context: Context,
    pub drug: String,
    pub clinician_opt_in: bool,
    pub eligible: Vec<ArmId>,
    pub gate: GateDecision,
    pub predicted_reward: f64,
    pub confidence: f64,
    pub issued_at: DateTime<Utc>,
}

impl PendingRound {
    pub fn administered(&self) -> ArmId {
        self.gate.administered()
    }
}

/// Immutable audit record of a closed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoundRecord {
    pub round_id: RoundId,
    pub context: Context,
    pub drug: String,
    pub eligible: Vec<ArmId>,
    /// Bandit choice before gating.
    pub recommended: ArmId,
    /// Arm actually administered.
    pub administered: ArmId,
    pub predicted_reward: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficacy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toxicity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    pub was_override: bool,
    pub needs_review: bool,
    pub status: RoundStatus,
    pub issued_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RoundRecord {
    fn from_pending(pending: PendingRound, status: RoundStatus, closed_at: DateTime<Utc>) -> Self {
        RoundRecord {
            round_id: pending.round_id,
            recommended: pending.gate.recommended(),
            administered: pending.gate.administered(),
            was_override: pending.gate.was_override(),
            needs_review: pending.gate.needs_review(),
            context: pending.context,
            drug: pending.drug,
            eligible: pending.eligible,
            predicted_reward: pending.predicted_reward,
            confidence: pending.confidence,
            efficacy: None,
            toxicity: None,
            reward: None,
            status,
            issued_at: pending.issued_at,
            closed_at,
            note: None,
        }
    }

    /// Record for a round whose reward was applied.
    pub fn resolved(
        pending: PendingRound,
        outcome: Option<Outcome>,
        reward: f64,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::from_pending(pending, RoundStatus::Resolved, closed_at);
        record.efficacy = outcome.map(|o| o.efficacy);
        record.toxicity = outcome.map(|o| o.toxicity);
        record.reward = Some(reward);
        record
    }

    /// Record for a round closed without an update.
    pub fn closed(
        pending: PendingRound,
        status: RoundStatus,
        note: impl Into<String>,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::from_pending(pending, status, closed_at);
        record.note = Some(note.into());
        record
    }
}

/// Pending rounds keyed by id plus the closed-round log.
#[derive(Debug, Clone, Default)]
pub struct RoundLedger {
    pending: BTreeMap<RoundId, PendingRound>,
    records: Vec<RoundRecord>,
}

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pending(&mut self, round: PendingRound) {
        self.pending.insert(round.round_id, round);
    }

    pub fn get_pending(&self, round_id: RoundId) -> Option<&PendingRound> {
        self.pending.get(&round_id)
    }

    /// Remove a pending round for resolution.
    pub fn take_pending(&mut self, round_id: RoundId) -> Result<PendingRound> {
        self.pending
            .remove(&round_id)
            .ok_or(Error::UnknownRound { round_id })
    }

    pub fn push(&mut self, record: RoundRecord) -> &RoundRecord {
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Move every pending round issued more than `timeout` before `now` into
    /// the log as expired. Returns the new records.
    pub fn expire(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<RoundRecord> {
        let stale: Vec<RoundId> = self
            .pending
            .values()
            .filter(|p| now - p.issued_at > timeout)
            .map(|p| p.round_id)
            .collect();
        self.close_all(stale, RoundStatus::Expired, "pending timeout elapsed", now)
    }

    /// Close every pending round as discarded.
    pub fn discard_all(&mut self, note: &str, now: DateTime<Utc>) -> Vec<RoundRecord> {
        let ids: Vec<RoundId> = self.pending.keys().copied().collect();
        self.close_all(ids, RoundStatus::Discarded, note, now)
    }

    fn close_all(
        &mut self,
        ids: Vec<RoundId>,
        status: RoundStatus,
        note: &str,
        now: DateTime<Utc>,
    ) -> Vec<RoundRecord> {
        let mut closed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.pending.remove(&id) {
                let record = RoundRecord::closed(p, status, note, now);
                self.records.push(record.clone());
                closed.push(record);
            }
        }
        closed
    }

    /// Pending rounds in id order.
    pub fn pending(&self) -> impl Iterator<Item = &PendingRound> {
        self.pending.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: u64, issued_at: DateTime<Utc>) -> PendingRound {
        PendingRound {
            round_id: RoundId(id),
            context: Context::new(vec![1.0, 0.0], 2).unwrap(),
            drug: "platinum".to_string(),
            clinician_opt_in: false,
            eligible: vec![ArmId(4), ArmId(5)],
            gate: GateDecision::Recommended { arm: ArmId(5) },
            predicted_reward: 0.1,
            confidence: 0.2,
            issued_at,
        }
    }

    #[test]
    fn take_pending_once() {
        let now = Utc::now();
        let mut ledger = RoundLedger::new();
        ledger.insert_pending(pending(0, now));
        assert!(ledger.take_pending(RoundId(0)).is_ok());
        let err = ledger.take_pending(RoundId(0)).unwrap_err();
        assert!(matches!(err, Error::UnknownRound { round_id } if round_id == RoundId(0)));
    }

    #[test]
    fn expire_only_stale_rounds() {
        let now = Utc::now();
        let mut ledger = RoundLedger::new();
        ledger.insert_pending(pending(0, now - Duration::hours(50)));
        ledger.insert_pending(pending(1, now - Duration::hours(10)));

        let expired = ledger.expire(now, Duration::hours(24));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].round_id, RoundId(0));
        assert_eq!(expired[0].status, RoundStatus::Expired);
        assert_eq!(expired[0].reward, None);
        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn resolved_record_carries_gate_flags() {
        let now = Utc::now();
        let mut p = pending(3, now);
        p.gate = GateDecision::Overridden {
            arm: ArmId(4),
            original: ArmId(5),
            reason: crate::gate::OverrideReason::LowConfidence {
                confidence: 0.9,
                threshold: 0.5,
            },
        };
        let outcome = Outcome {
            efficacy: 0.7,
            toxicity: 0.2,
        };
        let r = RoundRecord::resolved(p, Some(outcome), 0.5, now);
        assert_eq!(r.administered, ArmId(4));
        assert_eq!(r.recommended, ArmId(5));
        assert!(r.was_override && r.needs_review);
        assert_eq!(r.efficacy, Some(0.7));
        assert_eq!(r.status, RoundStatus::Resolved);
    }

    #[test]
    fn discard_all_empties_pending() {
        let now = Utc::now();
        let mut ledger = RoundLedger::new();
        for i in 0..3 {
            ledger.insert_pending(pending(i, now));
        }
        let closed = ledger.discard_all("state reloaded", now);
        assert_eq!(closed.len(), 3);
        assert!(closed.iter().all(|r| r.status == RoundStatus::Discarded));
        assert_eq!(ledger.pending().count(), 0);
    }
}
