//! Exit codes for the ct-core CLI.
//!
//! Exit code ranges:
//! - 0-9: Operational outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use ct_common::Error;

/// Exit codes for ct-core operations. Stable for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-9)
    // ========================================================================
    /// Success
    Clean = 0,

    /// No eligible bin; the caller must use standard of care
    Fallback = 4,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Configuration failed to load or validate
    ConfigError = 11,

    /// Checkpoint incompatible or corrupted
    StateError = 12,

    /// Context, drug, outcome, or round id rejected
    InvalidInput = 13,

    /// Engine halted on a numerical failure
    Halted = 14,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Operational outcomes are not errors.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Error code name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Fallback => "OK_FALLBACK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::StateError => "ERR_STATE",
            ExitCode::InvalidInput => "ERR_INPUT",
            ExitCode::Halted => "ERR_HALTED",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_)
            | Error::InvalidPolicy(_)
            | Error::InvalidActionSpace(_)
            | Error::SchemaValidation(_) => ExitCode::ConfigError,
            Error::NoEligibleAction { .. } => ExitCode::Fallback,
            Error::UnknownDrug { .. }
            | Error::InvalidReward { .. }
            | Error::UnknownRound { .. }
            | Error::DimensionMismatch { .. }
            | Error::InvalidContext(_) => ExitCode::InvalidInput,
            Error::SingularUpdate { .. }
            | Error::NumericalInstability(_)
            | Error::PolicyHalted { .. } => ExitCode::Halted,
            Error::StateMismatch(_) | Error::StateCorrupted(_) => ExitCode::StateError,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InvalidInput,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
