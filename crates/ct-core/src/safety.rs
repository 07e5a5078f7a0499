//! Clinical safety filter over the action space.
//!
//! An arm is eligible only when the whole bin satisfies every constraint:
//! clinic operating hours, the exploration cap around the drug's
//! standard-of-care hour (circular), and the drug's own timing window.
//! Excluded arms keep their reasons for the audit trail.

use ct_common::{ArmId, Error, Result};
use ct_config::PolicyConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::actions::{ActionSpace, Arm};

/// Slack for comparisons on hour boundaries.
const HOUR_EPS: f64 = 1e-9;

/// Why an arm was excluded for a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The bin is not fully inside clinic opening hours.
    OutsideClinicHours { open_hour: f64, close_hour: f64 },
    /// The bin reaches further than the cap from standard of care.
    OutsideExplorationCap {
        standard_of_care_hour: f64,
        cap_hours: f64,
    },
    /// The bin violates the drug's earliest/latest window.
    OutsideDrugWindow {
        earliest_hour: Option<f64>,
        latest_hour: Option<f64>,
    },
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::OutsideClinicHours {
                open_hour,
                close_hour,
            } => write!(f, "outside clinic hours {}-{}", open_hour, close_hour),
            ExclusionReason::OutsideExplorationCap {
                standard_of_care_hour,
                cap_hours,
            } => write!(
                f,
                "more than {}h from standard of care at {}",
                cap_hours, standard_of_care_hour
            ),
            ExclusionReason::OutsideDrugWindow {
                earliest_hour,
                latest_hour,
            } => write!(
                f,
                "outside drug window [{}, {}]",
                earliest_hour.map_or("-".to_string(), |h| h.to_string()),
                latest_hour.map_or("-".to_string(), |h| h.to_string())
            ),
        }
    }
}

/// An excluded arm with every reason that applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Exclusion {
    pub arm: ArmId,
    pub reasons: Vec<ExclusionReason>,
}

/// Result of filtering: eligible arms in ascending order plus the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EligibleSet {
    pub drug: String,
    pub clinician_opt_in: bool,
    pub cap_hours: f64,
    pub eligible: Vec<ArmId>,
    pub excluded: Vec<Exclusion>,
}

impl EligibleSet {
    pub fn contains(&self, arm: ArmId) -> bool {
        self.eligible.binary_search(&arm).is_ok()
    }

    pub fn len(&self) -> usize {
        self.eligible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }
}

/// Per-round eligibility filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyGuard {
    exploration_cap_hours: f64,
    opt_in_cap_hours: f64,
}

impl SafetyGuard {
    pub fn new(exploration_cap_hours: f64, opt_in_cap_hours: f64) -> Self {
        Self {
            exploration_cap_hours,
            opt_in_cap_hours,
        }
    }

    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self::new(policy.exploration_cap_hours, policy.opt_in_cap_hours)
    }

    /// Opt-in may widen the cap, never narrow it.
    pub fn effective_cap(&self, clinician_opt_in: bool) -> f64 {
        if clinician_opt_in {
            self.exploration_cap_hours.max(self.opt_in_cap_hours)
        } else {
            self.exploration_cap_hours
        }
    }

    /// Filter the action space for one round.
    ///
    /// Fails with `UnknownDrug` for a drug without a profile and with
    /// `NoEligibleAction` when nothing survives; the caller then falls back
    /// to standard of care outside the bandit.
    pub fn filter(
        &self,
        space: &ActionSpace,
        drug: &str,
        clinician_opt_in: bool,
    ) -> Result<EligibleSet> {
        let profile = space.drug(drug)?;
        let cap = self.effective_cap(clinician_opt_in);
        let clinic = space.clinic();

        let mut eligible = Vec::new();
        let mut excluded = Vec::new();
        for arm in space.arms() {
            let mut reasons = Vec::new();

            if !within_clinic(arm, clinic.open_hour, clinic.close_hour) {
                reasons.push(ExclusionReason::OutsideClinicHours {
                    open_hour: clinic.open_hour,
                    close_hour: clinic.close_hour,
                });
            }
            if !within_cap(arm, profile.standard_of_care_hour, cap) {
                reasons.push(ExclusionReason::OutsideExplorationCap {
                    standard_of_care_hour: profile.standard_of_care_hour,
                    cap_hours: cap,
                });
            }
            if !within_window(arm, profile.earliest_hour, profile.latest_hour) {
                reasons.push(ExclusionReason::OutsideDrugWindow {
                    earliest_hour: profile.earliest_hour,
                    latest_hour: profile.latest_hour,
                });
            }

            if reasons.is_empty() {
                eligible.push(arm.id);
            } else {
                excluded.push(Exclusion {
                    arm: arm.id,
                    reasons,
                });
            }
        }

        if eligible.is_empty() {
            return Err(Error::NoEligibleAction {
                drug: drug.to_string(),
                opt_in: clinician_opt_in,
            });
        }

        Ok(EligibleSet {
            drug: drug.to_string(),
            clinician_opt_in,
            cap_hours: cap,
            eligible,
            excluded,
        })
    }
}

fn within_clinic(arm: &Arm, open: f64, close: f64) -> bool {
    arm.start_hour >= open - HOUR_EPS && arm.end_hour() <= close + HOUR_EPS
}

/// Whole bin within `[soc - cap, soc + cap]` on the 24h circle.
fn within_cap(arm: &Arm, soc: f64, cap: f64) -> bool {
    let start_offset = (arm.start_hour - soc + 12.0).rem_euclid(24.0) - 12.0;
    start_offset >= -cap - HOUR_EPS && start_offset + arm.width_hours <= cap + HOUR_EPS
}

fn within_window(arm: &Arm, earliest: Option<f64>, latest: Option<f64>) -> bool {
    let after_earliest = earliest.is_none_or(|h| arm.start_hour >= h - HOUR_EPS);
    let before_latest = latest.is_none_or(|h| arm.end_hour() <= h + HOUR_EPS);
    after_earliest && before_latest
}
