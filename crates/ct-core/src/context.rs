//! Context encoding.
//!
//! Turns a patient/episode description into the fixed-length feature vector
//! the bandit scores against. Layout, in order:
//!
//! | index | feature                                   |
//! |-------|-------------------------------------------|
//! | 0     | bias (always 1)                           |
//! | 1, 2  | sin / cos of the sleep midpoint (24h)     |
//! | 3     | sleep duration, standardized              |
//! | 4     | rest-activity amplitude, standardized     |
//! | 5     | HRV (RMSSD), standardized                 |
//! | 6     | ECOG performance status / 4               |
//! | 7..   | one-hot drug indicator, action-space order |
//!
//! Standardized features are clamped to `[-3, 3]`.

use std::f64::consts::TAU;

use ct_common::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Number of features before the drug one-hot block.
pub const BASE_FEATURES: usize = 7;

const STANDARDIZED_CLAMP: f64 = 3.0;
const MAX_ECOG: u8 = 4;

// Population reference values used for standardization.
const SLEEP_DURATION_MEAN: f64 = 7.5;
const SLEEP_DURATION_SCALE: f64 = 1.5;
const ACTIVITY_AMPLITUDE_MEAN: f64 = 30.0;
const ACTIVITY_AMPLITUDE_SCALE: f64 = 10.0;
const HRV_MEAN: f64 = 45.0;
const HRV_SCALE: f64 = 15.0;

/// Raw patient description for one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatientProfile {
    /// Clock hour of the sleep midpoint, `[0, 24)`.
    pub sleep_midpoint_hour: f64,
    pub sleep_duration_hours: f64,
    /// Rest-activity rhythm amplitude (actigraphy counts).
    pub activity_amplitude: f64,
    /// Heart-rate variability, RMSSD in milliseconds.
    pub hrv_rmssd_ms: f64,
    /// ECOG performance status, 0..=4.
    pub ecog: u8,
    /// Drug name; must be present in the action space.
    pub drug: String,
}

/// An immutable, validated feature vector.
///
/// Deserialization goes through [`TryFrom<Vec<f64>>`], so a decoded context
/// is non-empty and finite; its dimension is checked by whoever consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Context(Vec<f64>);

impl Context {
    /// Wrap a caller-built vector. Never pads or truncates.
    pub fn new(values: Vec<f64>, expected_dim: usize) -> Result<Self> {
        if values.len() != expected_dim {
            return Err(Error::DimensionMismatch {
                expected: expected_dim,
                actual: values.len(),
            });
        }
        Context::try_from(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }
}

impl TryFrom<Vec<f64>> for Context {
    type Error = Error;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InvalidContext("context is empty".to_string()));
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidContext(format!(
                "feature {} is not finite ({})",
                idx, values[idx]
            )));
        }
        Ok(Context(values))
    }
}

impl From<Context> for Vec<f64> {
    fn from(context: Context) -> Self {
        context.0
    }
}

/// Stateless encoder from [`PatientProfile`] to [`Context`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEncoder {
    drugs: Vec<String>,
}

impl ContextEncoder {
    pub fn new(drugs: Vec<String>) -> Self {
        Self { drugs }
    }

    /// Output dimension: base features plus one indicator per drug.
    pub fn dimension(&self) -> usize {
        BASE_FEATURES + self.drugs.len()
    }

    pub fn drugs(&self) -> &[String] {
        &self.drugs
    }

    pub fn encode(&self, profile: &PatientProfile) -> Result<Context> {
        let drug_idx = self
            .drugs
            .iter()
            .position(|d| d == &profile.drug)
            .ok_or_else(|| Error::UnknownDrug {
                drug: profile.drug.clone(),
            })?;
        if profile.ecog > MAX_ECOG {
            return Err(Error::InvalidContext(format!(
                "ECOG must be 0..={}, got {}",
                MAX_ECOG, profile.ecog
            )));
        }
        for (name, value) in [
            ("sleep_midpoint_hour", profile.sleep_midpoint_hour),
            ("sleep_duration_hours", profile.sleep_duration_hours),
            ("activity_amplitude", profile.activity_amplitude),
            ("hrv_rmssd_ms", profile.hrv_rmssd_ms),
        ] {
            if !value.is_finite() {
                return Err(Error::InvalidContext(format!("{} is not finite", name)));
            }
        }

        let phase = TAU * profile.sleep_midpoint_hour.rem_euclid(24.0) / 24.0;
        let mut x = Vec::with_capacity(self.dimension());
        x.push(1.0);
        x.push(phase.sin());
        x.push(phase.cos());
        x.push(standardize(
            profile.sleep_duration_hours,
            SLEEP_DURATION_MEAN,
            SLEEP_DURATION_SCALE,
        ));
        x.push(standardize(
            profile.activity_amplitude,
            ACTIVITY_AMPLITUDE_MEAN,
            ACTIVITY_AMPLITUDE_SCALE,
        ));
        x.push(standardize(profile.hrv_rmssd_ms, HRV_MEAN, HRV_SCALE));
        x.push(f64::from(profile.ecog) / f64::from(MAX_ECOG));
        x.extend((0..self.drugs.len()).map(|i| if i == drug_idx { 1.0 } else { 0.0 }));

        Context::new(x, self.dimension())
    }
}

fn standardize(value: f64, mean: f64, scale: f64) -> f64 {
    ((value - mean) / scale).clamp(-STANDARDIZED_CLAMP, STANDARDIZED_CLAMP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> ContextEncoder {
        ContextEncoder::new(vec![
            "platinum".to_string(),
            "taxane".to_string(),
            "anthracycline".to_string(),
        ])
    }

    fn profile() -> PatientProfile {
        PatientProfile {
            sleep_midpoint_hour: 3.0,
            sleep_duration_hours: 7.5,
            activity_amplitude: 30.0,
            hrv_rmssd_ms: 45.0,
            ecog: 1,
            drug: "taxane".to_string(),
        }
    }

    #[test]
    fn encodes_reference_profile() {
        let ctx = encoder().encode(&profile()).unwrap();
        let x = ctx.as_slice();
        assert_eq!(ctx.dim(), 10);
        assert_eq!(x[0], 1.0);
        assert!((x[1] - (TAU * 3.0 / 24.0).sin()).abs() < 1e-12);
        assert!((x[2] - (TAU * 3.0 / 24.0).cos()).abs() < 1e-12);
        assert_eq!(x[3], 0.0);
        assert_eq!(x[4], 0.0);
        assert_eq!(x[5], 0.0);
        assert_eq!(x[6], 0.25);
        assert_eq!(&x[7..], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn midpoint_wraps_around_midnight() {
        let enc = encoder();
        let mut a = profile();
        a.sleep_midpoint_hour = 23.5;
        let mut b = profile();
        b.sleep_midpoint_hour = -0.5;
        assert_eq!(enc.encode(&a).unwrap(), enc.encode(&b).unwrap());
    }

    #[test]
    fn standardized_features_are_clamped() {
        let mut p = profile();
        p.hrv_rmssd_ms = 1_000.0;
        let ctx = encoder().encode(&p).unwrap();
        assert_eq!(ctx.as_slice()[5], STANDARDIZED_CLAMP);
    }

    #[test]
    fn unknown_drug_is_rejected() {
        let mut p = profile();
        p.drug = "antimetabolite".to_string();
        let err = encoder().encode(&p).unwrap_err();
        assert!(matches!(err, Error::UnknownDrug { .. }));
    }

    #[test]
    fn bad_ecog_and_nan_are_rejected() {
        let mut p = profile();
        p.ecog = 5;
        assert!(matches!(
            encoder().encode(&p).unwrap_err(),
            Error::InvalidContext(_)
        ));
        let mut p = profile();
        p.sleep_duration_hours = f64::NAN;
        assert!(matches!(
            encoder().encode(&p).unwrap_err(),
            Error::InvalidContext(_)
        ));
    }

    #[test]
    fn context_dimension_is_never_padded() {
        let err = Context::new(vec![1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(Context::new(vec![1.0, f64::INFINITY], 2).is_err());
    }

    #[test]
    fn deserialized_context_is_validated() {
        let ctx: Context = serde_json::from_value(serde_json::json!([1.0, 0.5])).unwrap();
        assert_eq!(ctx.as_slice(), &[1.0, 0.5]);
        assert_eq!(serde_json::to_value(&ctx).unwrap(), serde_json::json!([1.0, 0.5]));

        let err = serde_json::from_value::<Context>(serde_json::json!([])).unwrap_err();
        assert!(err.to_string().contains("empty"), "{}", err);
        assert!(Context::try_from(vec![1.0, f64::NAN]).is_err());
    }
}
