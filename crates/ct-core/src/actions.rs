//! Discrete administration-time action space.
//!
//! Arms are the time bins of a validated [`ActionSpaceConfig`], indexed
//! densely by [`ArmId`]. The set is fixed for the lifetime of an engine.

use ct_common::{ArmId, Error, Result};
use ct_config::{validate_action_space, ActionSpaceConfig, ClinicHours, DrugProfile};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One candidate administration-time bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Arm {
    pub id: ArmId,
    /// Clock hour the bin opens, `[0, 24)`.
    pub start_hour: f64,
    pub width_hours: f64,
}

impl Arm {
    /// End of the bin. May exceed 24 for a bin that crosses midnight.
    pub fn end_hour(&self) -> f64 {
        self.start_hour + self.width_hours
    }

    /// Administration hour used when the bin is chosen.
    pub fn midpoint_hour(&self) -> f64 {
        (self.start_hour + self.width_hours / 2.0).rem_euclid(24.0)
    }

    /// `HH:MM-HH:MM` label for reports.
    pub fn label(&self) -> String {
        format!(
            "{}-{}",
            clock(self.start_hour),
            clock(self.end_hour().rem_euclid(24.0))
        )
    }
}

fn clock(hour: f64) -> String {
    let minutes = (hour * 60.0).round() as i64;
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

/// The full, validated action space.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpace {
    arms: Vec<Arm>,
    clinic: ClinicHours,
    drugs: Vec<DrugProfile>,
}

impl ActionSpace {
    pub fn from_config(config: &ActionSpaceConfig) -> Result<Self> {
        validate_action_space(config)?;
        let arms = (0..config.n_bins)
            .map(|i| Arm {
                id: ArmId(i),
                start_hour: config.bin_start_hour(i),
                width_hours: config.bin_width_hours,
            })
            .collect();
        Ok(Self {
            arms,
            clinic: config.clinic,
            drugs: config.drugs.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }

    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    pub fn arm(&self, id: ArmId) -> Option<&Arm> {
        self.arms.get(id.index())
    }

    pub fn clinic(&self) -> ClinicHours {
        self.clinic
    }

    pub fn drug(&self, name: &str) -> Result<&DrugProfile> {
        self.drugs
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::UnknownDrug {
                drug: name.to_string(),
            })
    }

    pub fn drug_names(&self) -> Vec<String> {
        self.drugs.iter().map(|d| d.name.clone()).collect()
    }

    /// The bin containing the drug's standard-of-care hour.
    pub fn standard_of_care_arm(&self, drug: &str) -> Result<ArmId> {
        let profile = self.drug(drug)?;
        let hour = profile.standard_of_care_hour;
        self.arms
            .iter()
            .find(|arm| (hour - arm.start_hour).rem_euclid(24.0) < arm.width_hours)
            .map(|arm| arm.id)
            .ok_or_else(|| {
                Error::InvalidActionSpace(format!(
                    "standard-of-care hour {} for '{}' is not covered by any bin",
                    hour, drug
                ))
            })
    }
}
