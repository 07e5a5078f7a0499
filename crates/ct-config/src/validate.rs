//! Configuration validation errors and semantic validation.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::actions::{ActionSpaceConfig, DrugProfile};
use crate::policy::{PolicyConfig, StrategyConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest exploration half-width that still means "around" standard-of-care.
pub const MAX_CAP_HOURS: f64 = 12.0;

/// Slack for comparisons on hour boundaries.
const HOUR_EPS: f64 = 1e-9;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::NotFound(_) => 62,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

impl From<ValidationError> for ct_common::Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::ParseError(_) | ValidationError::VersionMismatch { .. } => {
                ct_common::Error::SchemaValidation(err.to_string())
            }
            _ => ct_common::Error::Config(err.to_string()),
        }
    }
}

pub(crate) fn read_file(path: &Path) -> ValidationResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
    })
}

fn check_version(actual: &str) -> ValidationResult<()> {
    if !ct_common::schema::is_compatible(actual) {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn positive(field: &str, value: f64) -> ValidationResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be positive and finite, got {}", value),
        });
    }
    Ok(())
}

fn hour_of_day(field: &str, value: f64) -> ValidationResult<()> {
    if !(value.is_finite() && (0.0..24.0).contains(&value)) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be an hour in [0, 24), got {}", value),
        });
    }
    Ok(())
}

/// Validate policy configuration semantically.
pub fn validate_policy(policy: &PolicyConfig) -> ValidationResult<()> {
    check_version(&policy.schema_version)?;

    match policy.strategy {
        StrategyConfig::Ucb { alpha } => positive("strategy.alpha", alpha)?,
        StrategyConfig::Thompson {
            prior_variance,
            noise_variance,
        } => {
            positive("strategy.prior_variance", prior_variance)?;
            positive("strategy.noise_variance", noise_variance)?;
        }
    }

    positive("confidence_threshold", policy.confidence_threshold)?;

    let cap = policy.exploration_cap_hours;
    if !(cap.is_finite() && cap > 0.0 && cap <= MAX_CAP_HOURS) {
        return Err(ValidationError::InvalidValue {
            field: "exploration_cap_hours".to_string(),
            message: format!("Must be in (0, {}], got {}", MAX_CAP_HOURS, cap),
        });
    }
    let opt_in = policy.opt_in_cap_hours;
    if !(opt_in.is_finite() && opt_in >= cap && opt_in <= MAX_CAP_HOURS) {
        return Err(ValidationError::InvalidValue {
            field: "opt_in_cap_hours".to_string(),
            message: format!(
                "Must be in [exploration_cap_hours={}, {}], got {}",
                cap, MAX_CAP_HOURS, opt_in
            ),
        });
    }

    if !(policy.lambda_tox.is_finite() && policy.lambda_tox >= 0.0) {
        return Err(ValidationError::InvalidValue {
            field: "lambda_tox".to_string(),
            message: format!("Must be non-negative, got {}", policy.lambda_tox),
        });
    }

    let bounds = policy.reward_bounds;
    if !(bounds.min.is_finite() && bounds.max.is_finite() && bounds.min < bounds.max) {
        return Err(ValidationError::InvalidValue {
            field: "reward_bounds".to_string(),
            message: format!("Need finite min < max, got [{}, {}]", bounds.min, bounds.max),
        });
    }

    positive("regularization", policy.regularization)?;
    positive("pending_timeout_hours", policy.pending_timeout_hours)?;

    if policy.context_dimension == 0 {
        return Err(ValidationError::InvalidValue {
            field: "context_dimension".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }
    if policy.refactor_interval == 0 {
        return Err(ValidationError::InvalidValue {
            field: "refactor_interval".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    Ok(())
}

/// Validate action space configuration semantically.
pub fn validate_action_space(actions: &ActionSpaceConfig) -> ValidationResult<()> {
    check_version(&actions.schema_version)?;

    hour_of_day("first_bin_start_hour", actions.first_bin_start_hour)?;
    positive("bin_width_hours", actions.bin_width_hours)?;
    if actions.n_bins == 0 {
        return Err(ValidationError::InvalidValue {
            field: "n_bins".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }
    let span = actions.n_bins as f64 * actions.bin_width_hours;
    if span > 24.0 + 1e-9 {
        return Err(ValidationError::SemanticError(format!(
            "Bins cover {} hours ({} x {}), more than one day",
            span, actions.n_bins, actions.bin_width_hours
        )));
    }

    let clinic = actions.clinic;
    if !(clinic.open_hour.is_finite()
        && clinic.close_hour.is_finite()
        && clinic.open_hour >= 0.0
        && clinic.close_hour <= 24.0
        && clinic.open_hour < clinic.close_hour)
    {
        return Err(ValidationError::InvalidValue {
            field: "clinic".to_string(),
            message: format!(
                "Need 0 <= open < close <= 24, got {}-{}",
                clinic.open_hour, clinic.close_hour
            ),
        });
    }

    if actions.drugs.is_empty() {
        return Err(ValidationError::SemanticError(
            "At least one drug profile is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for drug in &actions.drugs {
        let prefix = format!("drugs.{}", drug.name);
        if drug.name.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "drugs.name".to_string(),
                message: "Must not be empty".to_string(),
            });
        }
        if !seen.insert(drug.name.as_str()) {
            return Err(ValidationError::SemanticError(format!(
                "Duplicate drug profile '{}'",
                drug.name
            )));
        }
        hour_of_day(
            &format!("{}.standard_of_care_hour", prefix),
            drug.standard_of_care_hour,
        )?;
        let Some(soc_bin) = actions.bin_containing(drug.standard_of_care_hour) else {
            return Err(ValidationError::SemanticError(format!(
                "Standard-of-care hour {} for '{}' is not covered by any bin",
                drug.standard_of_care_hour, drug.name
            )));
        };
        for (name, bound) in [("earliest_hour", drug.earliest_hour), ("latest_hour", drug.latest_hour)] {
            if let Some(h) = bound {
                if !(h.is_finite() && (0.0..=24.0).contains(&h)) {
                    return Err(ValidationError::InvalidValue {
                        field: format!("{}.{}", prefix, name),
                        message: format!("Must be an hour in [0, 24], got {}", h),
                    });
                }
            }
        }
        if let (Some(lo), Some(hi)) = (drug.earliest_hour, drug.latest_hour) {
            if lo >= hi {
                return Err(ValidationError::InvalidValue {
                    field: prefix,
                    message: format!("earliest_hour {} must precede latest_hour {}", lo, hi),
                });
            }
        }
        check_standard_of_care_bin(actions, drug, soc_bin)?;
    }

    Ok(())
}

/// The standard-of-care bin is the uncertainty fallback, so it must pass
/// the same clinic and drug-window checks as any eligible bin.
fn check_standard_of_care_bin(
    actions: &ActionSpaceConfig,
    drug: &DrugProfile,
    bin: usize,
) -> ValidationResult<()> {
    let start = actions.bin_start_hour(bin);
    let end = start + actions.bin_width_hours;
    let clinic = actions.clinic;
    if start < clinic.open_hour - HOUR_EPS || end > clinic.close_hour + HOUR_EPS {
        return Err(ValidationError::SemanticError(format!(
            "Standard-of-care bin {}-{} for '{}' lies outside clinic hours {}-{}",
            start, end, drug.name, clinic.open_hour, clinic.close_hour
        )));
    }
    let after_earliest = drug.earliest_hour.is_none_or(|h| start >= h - HOUR_EPS);
    let before_latest = drug.latest_hour.is_none_or(|h| end <= h + HOUR_EPS);
    if !(after_earliest && before_latest) {
        return Err(ValidationError::SemanticError(format!(
            "Standard-of-care bin {}-{} for '{}' lies outside its drug window",
            start, end, drug.name
        )));
    }
    Ok(())
}
