//! Action space configuration: time-bin layout, clinic hours, drug profiles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationResult};

/// Layout of the administration-time bins and the clinical metadata around them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionSpaceConfig {
    pub schema_version: String,

    /// Start hour of bin 0, in `[0, 24)`.
    pub first_bin_start_hour: f64,

    pub bin_width_hours: f64,

    pub n_bins: usize,

    pub clinic: ClinicHours,

    pub drugs: Vec<DrugProfile>,
}

/// Clinic operating window within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClinicHours {
    pub open_hour: f64,
    pub close_hour: f64,
}

/// Per-drug timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DrugProfile {
    pub name: String,

    /// Conventional administration hour, in `[0, 24)`.
    pub standard_of_care_hour: f64,

    /// Bins may not start before this hour.
    #[serde(default)]
    pub earliest_hour: Option<f64>,

    /// Bins may not end after this hour.
    #[serde(default)]
    pub latest_hour: Option<f64>,
}

impl ActionSpaceConfig {
    /// Load an action space from a JSON file.
    pub fn from_file(path: &std::path::Path) -> ValidationResult<Self> {
        let content = crate::validate::read_file(path)?;
        Self::parse_json(&content)
    }

    /// Parse an action space from a JSON string.
    pub fn parse_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("actions.json: {}", e)))
    }

    /// Canonical JSON used for hashing.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Start hour of bin `index`, wrapped into `[0, 24)`.
    pub fn bin_start_hour(&self, index: usize) -> f64 {
        (self.first_bin_start_hour + index as f64 * self.bin_width_hours).rem_euclid(24.0)
    }

    /// Index of the bin containing `hour`, if any.
    pub fn bin_containing(&self, hour: f64) -> Option<usize> {
        (0..self.n_bins).find(|&i| {
            let offset = (hour - self.bin_start_hour(i)).rem_euclid(24.0);
            offset < self.bin_width_hours
        })
    }

    pub fn drug(&self, name: &str) -> Option<&DrugProfile> {
        self.drugs.iter().find(|d| d.name == name)
    }

    pub fn drug_names(&self) -> Vec<String> {
        self.drugs.iter().map(|d| d.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_hour_day() -> ActionSpaceConfig {
        ActionSpaceConfig {
            schema_version: "1.0.0".to_string(),
            first_bin_start_hour: 0.0,
            bin_width_hours: 2.0,
            n_bins: 12,
            clinic: ClinicHours {
                open_hour: 7.0,
                close_hour: 19.0,
            },
            drugs: vec![DrugProfile {
                name: "platinum".to_string(),
                standard_of_care_hour: 8.0,
                earliest_hour: None,
                latest_hour: None,
            }],
        }
    }

    #[test]
    fn bins_wrap_around_midnight() {
        let mut cfg = two_hour_day();
        cfg.first_bin_start_hour = 22.0;
        assert_eq!(cfg.bin_start_hour(0), 22.0);
        assert_eq!(cfg.bin_start_hour(1), 0.0);
        assert_eq!(cfg.bin_containing(23.5), Some(0));
        assert_eq!(cfg.bin_containing(0.5), Some(1));
    }

    #[test]
    fn bin_containing_uses_half_open_bins() {
        let cfg = two_hour_day();
        assert_eq!(cfg.bin_containing(8.0), Some(4));
        assert_eq!(cfg.bin_containing(9.99), Some(4));
        assert_eq!(cfg.bin_containing(10.0), Some(5));
    }

    #[test]
    fn partial_day_leaves_gaps() {
        let mut cfg = two_hour_day();
        cfg.first_bin_start_hour = 8.0;
        cfg.n_bins = 4;
        assert_eq!(cfg.bin_containing(7.0), None);
        assert_eq!(cfg.bin_containing(15.5), Some(3));
        assert_eq!(cfg.bin_containing(16.0), None);
    }

    #[test]
    fn drug_lookup() {
        let cfg = two_hour_day();
        assert!(cfg.drug("platinum").is_some());
        assert!(cfg.drug("taxane").is_none());
        assert_eq!(cfg.drug_names(), vec!["platinum".to_string()]);
    }
}
