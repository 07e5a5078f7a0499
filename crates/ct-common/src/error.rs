//! Error types for the chronotherapy policy core.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ No Eligible Action
//!   Reason: no eligible administration time for drug 'platinum' (opt-in: false)
//!   Fix: Administer at the standard-of-care time; the bandit cannot choose for this round.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 30,
//!   "category": "observation",
//!   "message": "invalid reward: reward=1.5 outside [-1, 1]",
//!   "recoverable": false,
//!   "suggested_action": "discard",
//!   "context": { "field": "reward", "value": 1.5 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::id::RoundId;

/// Result type alias for policy-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Policy or action-space configuration errors.
    Config,
    /// Clinical safety filtering errors.
    Safety,
    /// Outcome/round bookkeeping errors.
    Observation,
    /// Numerical failures in the statistics store.
    Numerical,
    /// Checkpoint and shared-state errors.
    State,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Safety => write!(f, "safety"),
            ErrorCategory::Observation => write!(f, "observation"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::State => write!(f, "state"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for callers to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation.
    Retry,
    /// Fix the configuration and rebuild the policy.
    FixConfig,
    /// Run the config validation command.
    RunCheck,
    /// Administer the standard-of-care time outside the bandit.
    FallbackStandardOfCare,
    /// Drop the offending round/outcome and continue.
    Discard,
    /// Stop using the policy until investigated.
    Halt,
    /// Load a compatible checkpoint.
    ReloadState,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::FixConfig => write!(f, "fix_config"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::FallbackStandardOfCare => write!(f, "fallback_standard_of_care"),
            SuggestedAction::Discard => write!(f, "discard"),
            SuggestedAction::Halt => write!(f, "halt"),
            SuggestedAction::ReloadState => write!(f, "reload_state"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for the policy core.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid policy configuration: {0}")]
    InvalidPolicy(String),

    #[error("invalid action space: {0}")]
    InvalidActionSpace(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    // Safety errors (20-29)
    #[error("no eligible administration time for drug '{drug}' (opt-in: {opt_in})")]
    NoEligibleAction { drug: String, opt_in: bool },

    #[error("unknown drug '{drug}'")]
    UnknownDrug { drug: String },

    // Observation errors (30-39)
    #[error("invalid reward: {field}={value} outside [{min}, {max}]")]
    InvalidReward {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("round {round_id} is not pending")]
    UnknownRound { round_id: RoundId },

    #[error("context dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid context: {0}")]
    InvalidContext(String),

    // Numerical errors (40-49)
    #[error("singular update for arm {arm}: {detail}")]
    SingularUpdate { arm: usize, detail: String },

    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("policy halted: {reason}")]
    PolicyHalted { reason: String },

    // State errors (50-59)
    #[error("checkpoint does not match this policy: {0}")]
    StateMismatch(String),

    #[error("policy state corrupted: {0}")]
    StateCorrupted(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Safety errors
    /// - 30-39: Observation errors
    /// - 40-49: Numerical errors
    /// - 50-59: State errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidPolicy(_) => 11,
            Error::InvalidActionSpace(_) => 12,
            Error::SchemaValidation(_) => 13,
            Error::NoEligibleAction { .. } => 20,
            Error::UnknownDrug { .. } => 21,
            Error::InvalidReward { .. } => 30,
            Error::UnknownRound { .. } => 31,
            Error::DimensionMismatch { .. } => 32,
            Error::InvalidContext(_) => 33,
            Error::SingularUpdate { .. } => 40,
            Error::NumericalInstability(_) => 41,
            Error::PolicyHalted { .. } => 42,
            Error::StateMismatch(_) => 50,
            Error::StateCorrupted(_) => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::InvalidPolicy(_)
            | Error::InvalidActionSpace(_)
            | Error::SchemaValidation(_) => ErrorCategory::Config,

            Error::NoEligibleAction { .. } | Error::UnknownDrug { .. } => ErrorCategory::Safety,

            Error::InvalidReward { .. }
            | Error::UnknownRound { .. }
            | Error::DimensionMismatch { .. }
            | Error::InvalidContext(_) => ErrorCategory::Observation,

            Error::SingularUpdate { .. }
            | Error::NumericalInstability(_)
            | Error::PolicyHalted { .. } => ErrorCategory::Numerical,

            Error::StateMismatch(_) | Error::StateCorrupted(_) => ErrorCategory::State,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether the policy can keep operating after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Fatal at construction; fixing the file is the remedy.
            Error::Config(_) => true,
            Error::InvalidPolicy(_) => true,
            Error::InvalidActionSpace(_) => true,
            Error::SchemaValidation(_) => true,

            // The episode continues on standard-of-care.
            Error::NoEligibleAction { .. } => true,
            Error::UnknownDrug { .. } => false,

            // The round is dropped; statistics are untouched.
            Error::InvalidReward { .. } => false,
            Error::UnknownRound { .. } => false,
            Error::DimensionMismatch { .. } => false,
            Error::InvalidContext(_) => false,

            // Indicates a configuration bug; the policy must stop.
            Error::SingularUpdate { .. } => false,
            Error::NumericalInstability(_) => false,
            Error::PolicyHalted { .. } => false,

            Error::StateMismatch(_) => true,
            Error::StateCorrupted(_) => false,

            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns the suggested action for callers.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::InvalidPolicy(_) => SuggestedAction::FixConfig,
            Error::InvalidActionSpace(_) => SuggestedAction::FixConfig,
            Error::SchemaValidation(_) => SuggestedAction::RunCheck,

            Error::NoEligibleAction { .. } => SuggestedAction::FallbackStandardOfCare,
            Error::UnknownDrug { .. } => SuggestedAction::FixConfig,

            Error::InvalidReward { .. } => SuggestedAction::Discard,
            Error::UnknownRound { .. } => SuggestedAction::Discard,
            Error::DimensionMismatch { .. } => SuggestedAction::Discard,
            Error::InvalidContext(_) => SuggestedAction::Discard,

            Error::SingularUpdate { .. } => SuggestedAction::Halt,
            Error::NumericalInstability(_) => SuggestedAction::Halt,
            Error::PolicyHalted { .. } => SuggestedAction::ReloadState,

            Error::StateMismatch(_) => SuggestedAction::ReloadState,
            Error::StateCorrupted(_) => SuggestedAction::ManualIntervention,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'ct-core config validate' to check policy.json and actions.json."
            }
            Error::InvalidPolicy(_) => {
                "Fix the offending field in policy.json; every policy parameter is required."
            }
            Error::InvalidActionSpace(_) => {
                "Fix actions.json: bins must fit in 24h and clinic hours must satisfy open < close."
            }
            Error::SchemaValidation(_) => {
                "Regenerate the file against 'ct-core config schema' and retry."
            }

            Error::NoEligibleAction { .. } => {
                "Administer at the standard-of-care time; the bandit cannot choose for this round."
            }
            Error::UnknownDrug { .. } => {
                "Add a drug profile for this drug to actions.json before requesting recommendations."
            }

            Error::InvalidReward { .. } => {
                "Check the outcome pipeline: efficacy and toxicity must be normalized to [0, 1]."
            }
            Error::UnknownRound { .. } => {
                "The round was never issued, already resolved, or expired. The outcome was ignored."
            }
            Error::DimensionMismatch { .. } => {
                "The context encoder and policy disagree on feature dimension; check policy.json."
            }
            Error::InvalidContext(_) => {
                "Context features must be finite numbers; check the encoder inputs."
            }

            Error::SingularUpdate { .. } => {
                "Numerical solve failed despite regularization. Stop the policy and investigate the configuration."
            }
            Error::NumericalInstability(_) => {
                "Non-finite statistics detected. Stop the policy and inspect the last checkpoint."
            }
            Error::PolicyHalted { .. } => {
                "The policy halted after a fatal numerical error. Load a known-good checkpoint to resume."
            }

            Error::StateMismatch(_) => {
                "The checkpoint belongs to another policy epoch, strategy, or shape. Load a matching checkpoint."
            }
            Error::StateCorrupted(_) => {
                "Shared statistics are unusable. Restart from the last checkpoint."
            }

            Error::Io(_) => "Check disk space and permissions, then retry the operation.",
            Error::Json(_) => {
                "Invalid JSON. Check syntax with 'jq . <file>' or restore the file from backup."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidPolicy(_) => "Invalid Policy Configuration",
            Error::InvalidActionSpace(_) => "Invalid Action Space",
            Error::SchemaValidation(_) => "Schema Validation Failed",

            Error::NoEligibleAction { .. } => "No Eligible Action",
            Error::UnknownDrug { .. } => "Unknown Drug",

            Error::InvalidReward { .. } => "Invalid Reward",
            Error::UnknownRound { .. } => "Unknown Round",
            Error::DimensionMismatch { .. } => "Context Dimension Mismatch",
            Error::InvalidContext(_) => "Invalid Context",

            Error::SingularUpdate { .. } => "Singular Update",
            Error::NumericalInstability(_) => "Numerical Instability",
            Error::PolicyHalted { .. } => "Policy Halted",

            Error::StateMismatch(_) => "Checkpoint Mismatch",
            Error::StateCorrupted(_) => "Policy State Corrupted",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for callers.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., round id, arm).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::NoEligibleAction { drug, opt_in } => {
                context.insert("drug".to_string(), serde_json::json!(drug));
                context.insert("opt_in".to_string(), serde_json::json!(opt_in));
            }
            Error::UnknownDrug { drug } => {
                context.insert("drug".to_string(), serde_json::json!(drug));
            }
            Error::InvalidReward { field, value, .. } => {
                context.insert("field".to_string(), serde_json::json!(field));
                context.insert("value".to_string(), serde_json::json!(value));
            }
            Error::UnknownRound { round_id } => {
                context.insert("round_id".to_string(), serde_json::json!(round_id));
            }
            Error::SingularUpdate { arm, .. } => {
                context.insert("arm".to_string(), serde_json::json!(arm));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("test".into()).code(), 10);
        assert_eq!(
            Error::NoEligibleAction {
                drug: "taxane".into(),
                opt_in: false
            }
            .code(),
            20
        );
        assert_eq!(Error::UnknownRound { round_id: RoundId(3) }.code(), 31);
        assert_eq!(
            Error::SingularUpdate {
                arm: 1,
                detail: "pivot".into()
            }
            .code(),
            40
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::Config("test".into()).category(), ErrorCategory::Config);
        assert_eq!(
            Error::UnknownDrug { drug: "x".into() }.category(),
            ErrorCategory::Safety
        );
        assert_eq!(
            Error::StateMismatch("epoch".into()).category(),
            ErrorCategory::State
        );
    }

    #[test]
    fn test_singular_update_is_fatal() {
        let err = Error::SingularUpdate {
            arm: 0,
            detail: "not positive definite".into(),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.suggested_action(), SuggestedAction::Halt);
    }

    #[test]
    fn test_no_eligible_action_falls_back() {
        let err = Error::NoEligibleAction {
            drug: "platinum".into(),
            opt_in: false,
        };
        assert!(err.is_recoverable());
        assert_eq!(
            err.suggested_action(),
            SuggestedAction::FallbackStandardOfCare
        );
    }

    #[test]
    fn test_structured_error_from_invalid_reward() {
        let err = Error::InvalidReward {
            field: "reward".into(),
            value: 1.5,
            min: -1.0,
            max: 1.0,
        };
        let structured = StructuredError::from(&err);

        assert_eq!(structured.code, 30);
        assert_eq!(structured.category, ErrorCategory::Observation);
        assert!(!structured.recoverable);
        assert_eq!(structured.suggested_action, SuggestedAction::Discard);
        assert_eq!(structured.context.get("value"), Some(&serde_json::json!(1.5)));
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::UnknownRound { round_id: RoundId(12) };
        let json = StructuredError::from(&err).to_json();

        assert!(json.contains(r#""code":31"#));
        assert!(json.contains(r#""category":"observation""#));
        assert!(json.contains(r#""suggested_action":"discard""#));
        assert!(json.contains(r#""round_id":12"#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::NoEligibleAction {
            drug: "platinum".into(),
            opt_in: false,
        };
        let formatted = format_error_human(&err, false);

        assert!(formatted.contains("No Eligible Action"));
        assert!(formatted.contains("drug 'platinum'"));
        assert!(formatted.contains("standard-of-care"));
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(ErrorCategory::Numerical.to_string(), "numerical");
        assert_eq!(
            SuggestedAction::FallbackStandardOfCare.to_string(),
            "fallback_standard_of_care"
        );
    }
}
